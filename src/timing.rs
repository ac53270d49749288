//! Clock and protocol constants.
//!
//! Pixel timings are given in nanoseconds and converted into two units:
//! RMT ticks for pulse durations and CPU cycles for refill deadlines, since
//! the stall check compares against the free-running CPU cycle counter.

use embassy_time::Duration;

/// Clock feeding the RMT peripheral (APB clock).
pub const RMT_SOURCE_HZ: u32 = 80_000_000;

/// Default RMT clock divider.
///
/// Only needs to keep pulse durations inside the 15-bit item field;
/// 4 and 8 still work but timings become marginal.
pub const DEFAULT_DIVIDER: u8 = 2;

/// Default CPU frequency of the cycle counter used for stall detection.
pub const DEFAULT_CPU_HZ: u32 = 240_000_000;

/// Pulse items held by one RMT memory block.
pub const ITEMS_PER_BLOCK: usize = 64;

/// Default memory blocks lent to each channel.
///
/// More blocks mean fewer usable channels but more tolerance to
/// interrupt jitter (Wi-Fi in particular).
pub const DEFAULT_MEM_BLOCKS: u8 = 2;

/// Suggested `CONTROLLERS` capacity for a [`ChannelPool`](crate::ChannelPool).
pub const MAX_CONTROLLERS: usize = 32;

/// Low time that tells a strip to latch the received frame.
pub const RESET_NS: u32 = 50_000;

/// Minimum gap between the end of one show and the start of the next.
pub const MIN_SHOW_INTERVAL: Duration = Duration::from_micros(55);

/// Largest value the 15-bit duration field of a pulse item can hold.
pub const MAX_DURATION: u32 = 0x7FFF;

/// Clock tree relevant to pulse generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockConfig {
    /// Frequency of the counter returned by `RmtPeripheral::cycles`
    pub cpu_hz: u32,
    /// RMT source clock before the divider
    pub source_hz: u32,
    /// RMT clock divider
    pub divider: u8,
}

impl ClockConfig {
    pub const fn new(cpu_hz: u32, source_hz: u32, divider: u8) -> Self {
        Self {
            cpu_hz,
            source_hz,
            divider,
        }
    }

    /// RMT ticks per second after the divider
    pub const fn ticks_per_second(&self) -> u32 {
        self.source_hz / self.divider as u32
    }

    /// Convert nanoseconds to RMT ticks (rounded down)
    pub const fn ns_to_ticks(&self, ns: u32) -> u32 {
        (ns as u64 * self.ticks_per_second() as u64 / 1_000_000_000) as u32
    }

    /// Convert nanoseconds to CPU cycles (rounded down)
    pub const fn ns_to_cycles(&self, ns: u32) -> u32 {
        (ns as u64 * self.cpu_hz as u64 / 1_000_000_000) as u32
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self::new(DEFAULT_CPU_HZ, RMT_SOURCE_HZ, DEFAULT_DIVIDER)
    }
}

/// Three-phase bit timing of a clockless LED protocol, in nanoseconds.
///
/// * `t1` - high time of a zero bit
/// * `t2` - extra high time of a one bit
/// * `t3` - low time of a one bit
///
/// A zero bit is `t1` high then `t2 + t3` low, a one bit is `t1 + t2` high
/// then `t3` low, so every bit lasts `t1 + t2 + t3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub t1: u32,
    pub t2: u32,
    pub t3: u32,
}

impl Timing {
    pub const WS2812: Self = Self::new(250, 625, 375);
    pub const WS2811: Self = Self::new(320, 320, 640);
    pub const SK6812: Self = Self::new(300, 600, 300);

    pub const fn new(t1: u32, t2: u32, t3: u32) -> Self {
        Self { t1, t2, t3 }
    }

    /// Duration of one encoded bit
    pub const fn bit_ns(&self) -> u64 {
        self.t1 as u64 + self.t2 as u64 + self.t3 as u64
    }

    /// Expected CPU cycles between two refills of the same channel
    pub const fn cycles_per_fill(&self, clock: &ClockConfig, pulses_per_fill: usize) -> u32 {
        let ns = self.bit_ns().saturating_mul(pulses_per_fill as u64);
        let cycles = ns.saturating_mul(clock.cpu_hz as u64) / 1_000_000_000;
        if cycles > u32::MAX as u64 {
            u32::MAX
        } else {
            cycles as u32
        }
    }

    /// Refill deadline: 1.75 times the expected interval
    pub const fn max_cycles_per_fill(&self, clock: &ClockConfig, pulses_per_fill: usize) -> u32 {
        let cycles = self.cycles_per_fill(clock, pulses_per_fill);
        cycles.saturating_add((cycles as u64 * 3 / 4) as u32)
    }

    /// Deadline for a channel holding its last items to reach the end
    /// marker: both halves plus the latch, counted from the last fill.
    pub const fn max_cycles_to_drain(&self, clock: &ClockConfig, pulses_per_fill: usize) -> u32 {
        self.max_cycles_per_fill(clock, pulses_per_fill)
            .saturating_mul(2)
            .saturating_add(clock.ns_to_cycles(RESET_NS))
    }
}
