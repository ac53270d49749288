//! Simulated RMT peripheral for host tests.
//!
//! Each `step` lets one channel send a threshold's worth of items (one half
//! of its memory), raising a threshold event, or stop at the first end
//! marker and raise a done event. Every transmission is recorded as a
//! [`Frame`].

#![allow(dead_code)]

use myrtio_clockless_rmt::{
    ChannelPool, ClockConfig, ColorOrder, ControllerId, Duration, EventKind, OrderedPixels,
    Pin, PoolConfig, PulseItem, PulseTemplates, Rgb, RmtChannel, RmtPeripheral, ShowReport,
    Timing,
};

pub const BLOCKS: usize = 8;

pub type TestPool = ChannelPool<MockRmt, 4, 16, 64>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub pin: Pin,
    pub items: Vec<PulseItem>,
    pub aborted: bool,
}

#[derive(Debug, Default)]
pub struct MockChannel {
    pub memory: Vec<PulseItem>,
    pub threshold: usize,
    pub divider: u8,
    pub configured: bool,
    pub pin: Option<Pin>,
    pub armed: bool,
    pub running: bool,
    pub threshold_events: usize,
    pub frames: Vec<Frame>,
    read: usize,
    current: Vec<PulseItem>,
    pending: Option<EventKind>,
}

impl MockChannel {
    fn finish(&mut self, aborted: bool) {
        self.running = false;
        let pin = self.pin.expect("channel started without a pin");
        self.frames.push(Frame {
            pin,
            items: std::mem::take(&mut self.current),
            aborted,
        });
    }
}

#[derive(Debug)]
pub struct MockRmt {
    pub now: u32,
    pub channels: Vec<MockChannel>,
    /// Every start in order: channel and pin
    pub starts: Vec<(RmtChannel, Pin)>,
}

impl MockRmt {
    pub fn new() -> Self {
        Self {
            now: 0,
            channels: (0..BLOCKS).map(|_| MockChannel::default()).collect(),
            starts: Vec::new(),
        }
    }

    pub fn channel(&self, channel: RmtChannel) -> &MockChannel {
        &self.channels[channel.0 as usize]
    }

    /// Let `channel` send one half buffer.
    ///
    /// Returns whether the channel is still running afterwards.
    pub fn step(&mut self, channel: RmtChannel) -> bool {
        let ch = &mut self.channels[channel.0 as usize];
        if !ch.running {
            return false;
        }
        let len = ch.memory.len();
        for _ in 0..ch.threshold {
            let item = ch.memory[ch.read];
            ch.read = (ch.read + 1) % len;
            if item.duration0() != 0 {
                ch.current.push(item);
            }
            if item.is_terminal() {
                ch.finish(false);
                if ch.armed {
                    ch.pending = Some(EventKind::Done);
                }
                return false;
            }
        }
        if ch.armed {
            ch.pending = Some(EventKind::Threshold);
            ch.threshold_events += 1;
        }
        true
    }

    /// Frames sent to `pin`, grouped by channel
    pub fn frames_for(&self, pin: Pin) -> Vec<Frame> {
        self.channels
            .iter()
            .flat_map(|ch| ch.frames.iter().cloned())
            .filter(|frame| frame.pin == pin)
            .collect()
    }
}

impl RmtPeripheral for MockRmt {
    const MEMORY_BLOCKS: usize = BLOCKS;

    fn configure(&mut self, channel: RmtChannel, divider: u8, mem_blocks: u8, threshold: usize) {
        let ch = &mut self.channels[channel.0 as usize];
        ch.memory = vec![PulseItem::END; Self::ITEMS_PER_BLOCK * mem_blocks as usize];
        ch.threshold = threshold;
        ch.divider = divider;
        ch.configured = true;
    }

    fn attach_pin(&mut self, channel: RmtChannel, pin: Pin) {
        self.channels[channel.0 as usize].pin = Some(pin);
    }

    fn write_items(&mut self, channel: RmtChannel, offset: usize, items: &[PulseItem]) {
        let ch = &mut self.channels[channel.0 as usize];
        ch.memory[offset..offset + items.len()].copy_from_slice(items);
    }

    fn set_interrupts(&mut self, channel: RmtChannel, enabled: bool) {
        self.channels[channel.0 as usize].armed = enabled;
    }

    fn start(&mut self, channel: RmtChannel) {
        let ch = &mut self.channels[channel.0 as usize];
        ch.running = true;
        ch.read = 0;
        ch.current.clear();
        ch.pending = None;
        let pin = ch.pin.expect("channel started without a pin");
        self.starts.push((channel, pin));
    }

    fn stop(&mut self, channel: RmtChannel) {
        let ch = &mut self.channels[channel.0 as usize];
        if ch.running {
            ch.finish(true);
        }
        ch.pending = None;
    }

    fn take_event(&mut self, channel: RmtChannel) -> Option<EventKind> {
        self.channels[channel.0 as usize].pending.take()
    }

    fn cycles(&self) -> u32 {
        self.now
    }
}

pub fn config(channels: usize) -> PoolConfig {
    PoolConfig {
        max_channels: Some(channels),
        min_show_interval: Duration::from_ticks(0),
        ..PoolConfig::default()
    }
}

pub fn pool(channels: usize) -> TestPool {
    TestPool::new(MockRmt::new(), config(channels)).expect("valid test config")
}

pub fn templates() -> PulseTemplates {
    PulseTemplates::new(Timing::WS2812, &ClockConfig::default()).expect("valid timing")
}

/// Deterministic test pattern of `count` pixels
pub fn pattern(count: usize, seed: u8) -> Vec<Rgb> {
    (0..count)
        .map(|i| {
            let i = i as u8;
            Rgb::new(
                i.wrapping_mul(7).wrapping_add(seed),
                i.wrapping_mul(13) ^ seed,
                0xA5 ^ i.wrapping_add(seed),
            )
        })
        .collect()
}

/// Wire bytes of `pixels` in RGB order
pub fn wire_bytes(pixels: &[Rgb]) -> Vec<u8> {
    pixels.iter().flat_map(|p| [p.r, p.g, p.b]).collect()
}

pub fn register_loaded(pool: &TestPool, pin: u8, pixels: &[Rgb]) -> ControllerId {
    let id = pool.register(Pin(pin), Timing::WS2812).expect("register");
    pool.load(id, &mut OrderedPixels::new(pixels, ColorOrder::Rgb))
        .expect("load");
    id
}

/// One round of the simulated hardware: every slot sends one half buffer,
/// the clock advances by `tick` cycles per slot and the interrupt handler
/// runs after each.
pub fn step_round(pool: &TestPool, tick: u32) {
    for slot in 0..pool.channel_count() {
        let channel = pool.slot_channel(slot);
        pool.with_hardware(|hw| {
            hw.now = hw.now.wrapping_add(tick);
            hw.step(channel);
        });
        pool.on_interrupt();
    }
}

/// Drive the hardware until the current show reports completion.
pub fn run_show(pool: &TestPool, tick: u32) -> ShowReport {
    for _ in 0..10_000 {
        if let Some(report) = pool.try_report() {
            return report;
        }
        step_round(pool, tick);
    }
    panic!("show never finished");
}

/// Decode a recorded frame into bytes, checking it ends in exactly one latch.
pub fn decode(frame: &Frame, templates: &PulseTemplates) -> Vec<u8> {
    let (last, data) = frame.items.split_last().expect("empty frame");
    assert_eq!(*last, templates.latch, "frame must end with the latch");
    assert!(data.len() % 8 == 0, "partial byte in frame");
    data.chunks(8)
        .map(|bits| {
            bits.iter().fold(0u8, |byte, item| {
                let bit = templates.decode(*item).expect("data item is not a bit");
                (byte << 1) | u8::from(bit)
            })
        })
        .collect()
}
