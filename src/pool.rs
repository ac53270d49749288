//! Channel scheduling pool.
//!
//! Maps any number of registered controllers onto the few hardware
//! channels. A show starts the first controllers directly and queues the
//! rest; every end-of-transmission event frees a slot and starts the next
//! queued controller on it, so the caller only waits for the batch as a
//! whole.

use core::cell::RefCell;

use critical_section::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Instant, Timer};
use heapless::{Deque, Vec};

#[cfg(feature = "esp32-log")]
use esp_println::println;

use crate::controller::{Controller, ControllerId, ControllerState, Outcome};
use crate::driver::ChannelDriver;
use crate::error::{ConfigError, Error};
use crate::events::{ChannelEvent, EventKind, Receiver};
use crate::peripheral::{Pin, RmtChannel, RmtPeripheral};
use crate::pixels::PixelSource;
use crate::timing::{ClockConfig, DEFAULT_MEM_BLOCKS, MIN_SHOW_INTERVAL, Timing};

/// Pool configuration
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    /// Channels to use; `None` takes as many as memory and the slot table allow
    pub max_channels: Option<usize>,
    /// Memory blocks lent to each channel
    pub mem_blocks: u8,
    pub clock: ClockConfig,
    /// Minimum gap between consecutive shows
    pub min_show_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_channels: None,
            mem_blocks: DEFAULT_MEM_BLOCKS,
            clock: ClockConfig::default(),
            min_show_interval: MIN_SHOW_INTERVAL,
        }
    }
}

/// Channel layout resolved from a [`PoolConfig`]
#[derive(Debug, Clone, Copy)]
struct Layout {
    channels: usize,
    mem_blocks: u8,
    pulses_per_fill: usize,
}

impl Layout {
    fn resolve<H: RmtPeripheral, const CHANNELS: usize>(
        config: &PoolConfig,
    ) -> Result<Self, ConfigError> {
        if config.mem_blocks == 0 {
            return Err(ConfigError::MemoryBlocks);
        }
        if config.clock.divider == 0 {
            return Err(ConfigError::Divider);
        }
        let blocks = usize::from(config.mem_blocks);
        let channels = config
            .max_channels
            .unwrap_or_else(|| CHANNELS.min(H::MEMORY_BLOCKS / blocks));
        if channels == 0 || channels > CHANNELS {
            return Err(ConfigError::ChannelCount);
        }
        if channels * blocks > H::MEMORY_BLOCKS || channels * blocks > usize::from(u8::MAX) {
            return Err(ConfigError::MemoryExhausted);
        }
        let pulses_per_fill = H::ITEMS_PER_BLOCK * blocks / 2;
        if pulses_per_fill == 0 || pulses_per_fill % 32 != 0 {
            return Err(ConfigError::FillSize);
        }
        Ok(Self {
            channels,
            mem_blocks: config.mem_blocks,
            pulses_per_fill,
        })
    }

    /// Hardware channel of a slot; a channel with several memory blocks
    /// also occupies the blocks of the channels that follow it.
    const fn channel(self, slot: usize) -> RmtChannel {
        RmtChannel(slot as u8 * self.mem_blocks)
    }

    fn slot(self, channel: RmtChannel) -> Option<usize> {
        if channel.0 % self.mem_blocks != 0 {
            return None;
        }
        let slot = usize::from(channel.0 / self.mem_blocks);
        (slot < self.channels).then_some(slot)
    }
}

/// Enforces the minimum interval between shows.
#[derive(Debug, Clone, Copy)]
pub struct ShowGuard {
    interval: Duration,
    last: Option<Instant>,
}

impl ShowGuard {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// Time left before the next show may start
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let ready = self.last? + self.interval;
        ready
            .checked_duration_since(now)
            .filter(|wait| wait.as_ticks() > 0)
    }

    /// Record the end of a show
    pub fn mark(&mut self, now: Instant) {
        self.last = Some(now);
    }
}

/// Summary of one show
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShowReport {
    /// Controllers transmitted in this show
    pub controllers: usize,
    /// Controllers left out because they hold no valid frame
    pub skipped: usize,
    /// Controllers cut short by a missed refill deadline
    pub aborted: usize,
    /// Longest interval between two refills of one channel, in CPU cycles
    pub worst_fill_cycles: u32,
}

#[derive(Debug, Clone, Default)]
enum Slot {
    #[default]
    Idle,
    Bound(ChannelDriver),
}

struct State<H, const CHANNELS: usize, const CONTROLLERS: usize, const WORDS: usize> {
    hardware: H,
    controllers: Vec<Controller<WORDS>, CONTROLLERS>,
    slots: [Slot; CHANNELS],
    queue: Deque<usize, CONTROLLERS>,
    /// Controllers of the current show not yet done
    pending: usize,
    report: ShowReport,
    guard: ShowGuard,
}

impl<H, const CHANNELS: usize, const CONTROLLERS: usize, const WORDS: usize>
    State<H, CHANNELS, CONTROLLERS, WORDS>
where
    H: RmtPeripheral,
{
    /// Start the head of the wait queue on `slot`
    fn start_next(&mut self, slot: usize, layout: Layout) -> bool {
        let Some(index) = self.queue.pop_front() else {
            return false;
        };
        let (Some(controller), Some(target)) =
            (self.controllers.get_mut(index), self.slots.get_mut(slot))
        else {
            return false;
        };
        let driver = ChannelDriver::start_on_channel(
            &mut self.hardware,
            index,
            controller,
            layout.channel(slot),
            layout.pulses_per_fill,
        );
        *target = Slot::Bound(driver);
        true
    }

    fn handle_event(&mut self, slot: usize, kind: EventKind, layout: Layout) -> Option<ShowReport> {
        let Some(Slot::Bound(driver)) = self.slots.get_mut(slot) else {
            #[cfg(feature = "esp32-log")]
            println!("[rmt] stale {:?} event on idle slot {}", kind, slot);
            return None;
        };
        let controller = self.controllers.get_mut(driver.controller())?;
        let finished = match kind {
            EventKind::Threshold => {
                !driver.on_threshold(&mut self.hardware, controller, layout.pulses_per_fill)
            }
            EventKind::Done => {
                driver.finish(&mut self.hardware, controller);
                true
            }
        };
        if finished {
            self.done_on_channel(slot, layout)
        } else {
            None
        }
    }

    /// Unbind the controller that just finished on `slot`
    fn done_on_channel(&mut self, slot: usize, layout: Layout) -> Option<ShowReport> {
        let Slot::Bound(driver) = core::mem::take(self.slots.get_mut(slot)?) else {
            return None;
        };
        self.report.worst_fill_cycles = self.report.worst_fill_cycles.max(driver.worst_fill());
        if let Some(controller) = self.controllers.get(driver.controller()) {
            if matches!(controller.state(), ControllerState::Done(Outcome::Aborted(_))) {
                self.report.aborted += 1;
            }
        }
        self.advance(slot, layout)
    }

    /// Count one controller done and hand the freed slot to the next in line.
    ///
    /// Returns the report once the last controller of the show is done.
    fn advance(&mut self, slot: usize, layout: Layout) -> Option<ShowReport> {
        self.pending = self.pending.saturating_sub(1);
        if self.pending == 0 {
            self.guard.mark(Instant::now());
            #[cfg(feature = "esp32-log")]
            println!(
                "[rmt] show done: {} sent, {} aborted, worst fill {} cycles",
                self.report.controllers, self.report.aborted, self.report.worst_fill_cycles
            );
            return Some(self.report);
        }
        self.start_next(slot, layout);
        None
    }
}

/// Scheduler multiplexing controllers over hardware channels.
///
/// * `CHANNELS` - slot table capacity
/// * `CONTROLLERS` - maximum registered controllers
/// * `WORDS` - packed frame capacity of each controller, in 32-bit words
///
/// All mutable state sits behind one critical section, so the pool can be
/// shared between the task calling [`show_all`](Self::show_all) and the
/// interrupt handler calling [`on_interrupt`](Self::on_interrupt).
pub struct ChannelPool<H, const CHANNELS: usize, const CONTROLLERS: usize, const WORDS: usize> {
    state: Mutex<RefCell<State<H, CHANNELS, CONTROLLERS, WORDS>>>,
    done: Signal<CriticalSectionRawMutex, ShowReport>,
    layout: Layout,
    clock: ClockConfig,
}

impl<H, const CHANNELS: usize, const CONTROLLERS: usize, const WORDS: usize>
    ChannelPool<H, CHANNELS, CONTROLLERS, WORDS>
where
    H: RmtPeripheral,
{
    /// Validate `config` and configure every channel the pool will use.
    pub fn new(mut hardware: H, config: PoolConfig) -> Result<Self, Error> {
        let layout = Layout::resolve::<H, CHANNELS>(&config)?;
        for slot in 0..layout.channels {
            hardware.configure(
                layout.channel(slot),
                config.clock.divider,
                layout.mem_blocks,
                layout.pulses_per_fill,
            );
        }

        #[cfg(feature = "esp32-log")]
        println!(
            "[rmt] {} channels, {} blocks each, {} items per fill",
            layout.channels, layout.mem_blocks, layout.pulses_per_fill
        );

        Ok(Self {
            state: Mutex::new(RefCell::new(State {
                hardware,
                controllers: Vec::new(),
                slots: core::array::from_fn(|_| Slot::Idle),
                queue: Deque::new(),
                pending: 0,
                report: ShowReport::default(),
                guard: ShowGuard::new(config.min_show_interval),
            })),
            done: Signal::new(),
            layout,
            clock: config.clock,
        })
    }

    /// Register a strip. Pin and timing are fixed for its lifetime.
    pub fn register(&self, pin: Pin, timing: Timing) -> Result<ControllerId, Error> {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            let index = state.controllers.len();
            if index >= CONTROLLERS || index > usize::from(u8::MAX) {
                return Err(Error::TooManyControllers);
            }
            let controller = Controller::new(pin, timing, &self.clock, self.layout.pulses_per_fill)?;
            state
                .controllers
                .push(controller)
                .map_err(|_| Error::TooManyControllers)?;
            Ok(ControllerId(index as u8))
        })
    }

    /// Pack the next frame of a controller.
    ///
    /// Fails with [`Error::Busy`] while a show is in flight; a failed load
    /// leaves the controller out of the next show.
    pub fn load<S>(&self, id: ControllerId, source: &mut S) -> Result<(), Error>
    where
        S: PixelSource + ?Sized,
    {
        critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            if state.pending > 0 {
                return Err(Error::Busy);
            }
            state
                .controllers
                .get_mut(id.index())
                .ok_or(Error::UnknownController)?
                .load(source)
        })
    }

    pub fn state(&self, id: ControllerId) -> Result<ControllerState, Error> {
        self.with_controller(id, Controller::state)
    }

    /// Refill budget of a controller in CPU cycles
    pub fn max_cycles_per_fill(&self, id: ControllerId) -> Result<u32, Error> {
        self.with_controller(id, Controller::max_cycles_per_fill)
    }

    fn with_controller<R>(
        &self,
        id: ControllerId,
        f: impl FnOnce(&Controller<WORDS>) -> R,
    ) -> Result<R, Error> {
        critical_section::with(|cs| {
            let state = self.state.borrow(cs).borrow();
            state
                .controllers
                .get(id.index())
                .map(f)
                .ok_or(Error::UnknownController)
        })
    }

    pub fn controller_count(&self) -> usize {
        critical_section::with(|cs| self.state.borrow(cs).borrow().controllers.len())
    }

    /// Hardware channels in use
    pub const fn channel_count(&self) -> usize {
        self.layout.channels
    }

    /// Items written per refill
    pub const fn pulses_per_fill(&self) -> usize {
        self.layout.pulses_per_fill
    }

    /// Hardware channel backing `slot`
    pub const fn slot_channel(&self, slot: usize) -> RmtChannel {
        self.layout.channel(slot)
    }

    pub fn is_busy(&self) -> bool {
        critical_section::with(|cs| self.state.borrow(cs).borrow().pending > 0)
    }

    /// Scoped access to the peripheral
    pub fn with_hardware<R>(&self, f: impl FnOnce(&mut H) -> R) -> R {
        critical_section::with(|cs| f(&mut self.state.borrow(cs).borrow_mut().hardware))
    }

    /// Send one frame on every loaded controller and wait for all of them.
    ///
    /// Controllers are served in registration order; the first ones start
    /// right away, the others as channels free up.
    pub async fn show_all(&self) -> Result<ShowReport, Error> {
        let remaining = critical_section::with(|cs| {
            self.state.borrow(cs).borrow().guard.remaining(Instant::now())
        });
        if let Some(wait) = remaining {
            Timer::after(wait).await;
        }

        self.begin_show()?;
        Ok(self.done.wait().await)
    }

    /// Start a show without waiting for it.
    ///
    /// Returns the number of controllers in the show. Completion is
    /// reported through [`try_report`](Self::try_report). Fails with
    /// [`Error::Busy`] while a show is in flight or the minimum interval
    /// since the end of the last one has not passed yet.
    pub fn begin_show(&self) -> Result<usize, Error> {
        let layout = self.layout;
        let ready = critical_section::with(|cs| {
            let state = self.state.borrow(cs).borrow();
            state.pending == 0 && state.guard.remaining(Instant::now()).is_none()
        });
        if !ready {
            return Err(Error::Busy);
        }
        // Must happen before the first channel starts
        self.done.reset();

        let outcome = critical_section::with(|cs| {
            let mut guard = self.state.borrow(cs).borrow_mut();
            let state = &mut *guard;
            if state.pending > 0 || state.guard.remaining(Instant::now()).is_some() {
                return Err(Error::Busy);
            }

            state.queue.clear();
            state.report = ShowReport::default();
            for (index, controller) in state.controllers.iter_mut().enumerate() {
                if controller.is_loaded() {
                    controller.set_state(ControllerState::Idle);
                    // The queue is as deep as the controller table
                    let _ = state.queue.push_back(index);
                } else {
                    state.report.skipped += 1;
                }
            }

            let count = state.queue.len();
            state.report.controllers = count;
            state.pending = count;
            if count == 0 {
                state.guard.mark(Instant::now());
            }
            for slot in 0..count.min(layout.channels) {
                state.start_next(slot, layout);
            }
            Ok((count, state.report))
        });

        let (count, report) = outcome?;
        if count == 0 {
            self.done.signal(report);
        }
        Ok(count)
    }

    /// Report of the last finished show, if not taken yet
    pub fn try_report(&self) -> Option<ShowReport> {
        self.done.try_take()
    }

    /// Interrupt entry point: service the pending event of every bound channel.
    pub fn on_interrupt(&self) {
        let layout = self.layout;
        let completed = critical_section::with(|cs| {
            let mut state = self.state.borrow(cs).borrow_mut();
            let mut completed = None;
            for slot in 0..layout.channels {
                if !matches!(state.slots.get(slot), Some(Slot::Bound(_))) {
                    continue;
                }
                let Some(kind) = state.hardware.take_event(layout.channel(slot)) else {
                    continue;
                };
                if let Some(report) = state.handle_event(slot, kind, layout) {
                    completed = Some(report);
                }
            }
            completed
        });
        if let Some(report) = completed {
            self.done.signal(report);
        }
    }

    /// Service one event decoded by the caller.
    pub fn handle_event(&self, event: ChannelEvent) {
        let layout = self.layout;
        let Some(slot) = layout.slot(event.channel) else {
            #[cfg(feature = "esp32-log")]
            println!("[rmt] event for unused channel {}", event.channel.0);
            return;
        };
        let completed = critical_section::with(|cs| {
            self.state
                .borrow(cs)
                .borrow_mut()
                .handle_event(slot, event.kind, layout)
        });
        if let Some(report) = completed {
            self.done.signal(report);
        }
    }

    /// Service every event queued by an interrupt handler.
    pub fn drain<const SIZE: usize>(&self, events: &Receiver<'_, SIZE>) {
        while let Ok(event) = events.try_receive() {
            self.handle_event(event);
        }
    }

    /// Abort every channel whose refill deadline passed without an event.
    ///
    /// Covers channels that never raised their first threshold event.
    /// Returns the number of channels aborted.
    pub fn check_stalls(&self) -> usize {
        let layout = self.layout;
        let (aborted, completed) = critical_section::with(|cs| {
            let mut guard = self.state.borrow(cs).borrow_mut();
            let state = &mut *guard;
            let mut aborted = 0;
            let mut completed = None;
            for slot in 0..layout.channels {
                let Some(Slot::Bound(driver)) = state.slots.get_mut(slot) else {
                    continue;
                };
                let Some(controller) = state.controllers.get_mut(driver.controller()) else {
                    continue;
                };
                if !driver.is_overdue(&state.hardware, controller) {
                    continue;
                }
                driver.abort(&mut state.hardware, controller);
                aborted += 1;
                if let Some(report) = state.done_on_channel(slot, layout) {
                    completed = Some(report);
                }
            }
            (aborted, completed)
        });
        if let Some(report) = completed {
            self.done.signal(report);
        }
        aborted
    }
}
