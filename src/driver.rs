//! Half-buffer refill protocol for one bound channel.
//!
//! Channel memory is split in two halves of `pulses_per_fill` items. Both
//! halves are primed before the channel starts; afterwards every threshold
//! event means one half has been sent and can be refilled while the
//! hardware works through the other one. A refill has to finish before the
//! hardware wraps back into the half being written, which gives each
//! channel a budget of `max_cycles_per_fill` CPU cycles between refills.

#[cfg(feature = "esp32-log")]
use esp_println::println;

use crate::controller::{Controller, ControllerState, Outcome, Stall};
use crate::peripheral::{RmtChannel, RmtPeripheral};
use crate::pulse::PulseItem;

/// Items encoded per packed word
const CHUNK: usize = 32;

/// Streaming state of the controller bound to a slot
#[derive(Debug, Clone)]
pub(crate) struct ChannelDriver {
    controller: usize,
    channel: RmtChannel,
    /// Bits already written to channel memory
    cursor: usize,
    /// Half to be written by the next fill
    half: usize,
    last_fill: u32,
    refills: u32,
    latched: bool,
    worst_fill: u32,
}

impl ChannelDriver {
    /// Bind `controller` to `channel`, prime both halves and start sending.
    pub(crate) fn start_on_channel<H, const WORDS: usize>(
        hardware: &mut H,
        index: usize,
        controller: &mut Controller<WORDS>,
        channel: RmtChannel,
        pulses_per_fill: usize,
    ) -> Self
    where
        H: RmtPeripheral,
    {
        controller.set_state(ControllerState::Starting);
        hardware.attach_pin(channel, controller.pin());

        let mut driver = Self {
            controller: index,
            channel,
            cursor: 0,
            half: 0,
            last_fill: 0,
            refills: 0,
            latched: false,
            worst_fill: 0,
        };
        driver.fill_next(hardware, controller, pulses_per_fill);
        driver.fill_next(hardware, controller, pulses_per_fill);

        hardware.set_interrupts(channel, true);
        hardware.start(channel);
        driver.last_fill = hardware.cycles();

        controller.set_state(if driver.latched {
            ControllerState::Latching
        } else {
            ControllerState::Streaming
        });
        driver
    }

    /// Refill the half that was just sent.
    ///
    /// Returns `false` when the refill came too late and the channel was
    /// aborted instead.
    pub(crate) fn on_threshold<H, const WORDS: usize>(
        &mut self,
        hardware: &mut H,
        controller: &mut Controller<WORDS>,
        pulses_per_fill: usize,
    ) -> bool
    where
        H: RmtPeripheral,
    {
        if !self.timing_ok(hardware, controller) {
            return false;
        }
        self.fill_next(hardware, controller, pulses_per_fill);
        self.refills += 1;
        true
    }

    /// Encode the next half buffer worth of bits into channel memory.
    ///
    /// Once the frame runs out a single latch item is written after the
    /// last bit; everything behind it is end markers.
    pub(crate) fn fill_next<H, const WORDS: usize>(
        &mut self,
        hardware: &mut H,
        controller: &mut Controller<WORDS>,
        pulses_per_fill: usize,
    ) where
        H: RmtPeripheral,
    {
        let mut chunk = [PulseItem::END; CHUNK];
        let base = self.half * pulses_per_fill;
        for offset in (0..pulses_per_fill).step_by(CHUNK) {
            self.encode_chunk(controller, &mut chunk);
            hardware.write_items(self.channel, base + offset, &chunk);
        }
        self.half ^= 1;
        self.last_fill = hardware.cycles();

        if self.latched && controller.state() == ControllerState::Streaming {
            controller.set_state(ControllerState::Latching);
        }
    }

    fn encode_chunk<const WORDS: usize>(
        &mut self,
        controller: &Controller<WORDS>,
        chunk: &mut [PulseItem; CHUNK],
    ) {
        chunk.fill(PulseItem::END);
        let templates = controller.templates();
        let remaining = controller.bits().saturating_sub(self.cursor);
        if remaining > 0 {
            let word = controller.word_at(self.cursor);
            let written = templates.encode_bits(word, remaining, chunk);
            self.cursor += written;
            if written < CHUNK {
                chunk[written] = templates.latch;
                self.latched = true;
            }
        } else if !self.latched {
            chunk[0] = templates.latch;
            self.latched = true;
        }
    }

    /// Check the refill deadline, aborting the channel when it was missed.
    ///
    /// The last refill is never checked: the hardware is already sending
    /// the tail of the frame and a late event there is harmless.
    pub(crate) fn timing_ok<H, const WORDS: usize>(
        &mut self,
        hardware: &mut H,
        controller: &mut Controller<WORDS>,
    ) -> bool
    where
        H: RmtPeripheral,
    {
        if self.cursor >= controller.bits() {
            return true;
        }
        let delta = hardware.cycles().wrapping_sub(self.last_fill);
        self.worst_fill = self.worst_fill.max(delta);
        if delta <= controller.max_cycles_per_fill() {
            return true;
        }

        #[cfg(feature = "esp32-log")]
        println!(
            "[rmt] channel {} late by {} cycles at bit {}/{}",
            self.channel.0,
            delta - controller.max_cycles_per_fill(),
            self.cursor,
            controller.bits()
        );

        self.abort(hardware, controller);
        false
    }

    /// Whether the deadline has passed without any event arriving.
    ///
    /// Once the whole frame is in channel memory the deadline is the time
    /// needed to send both halves and the latch.
    pub(crate) fn is_overdue<H, const WORDS: usize>(
        &self,
        hardware: &H,
        controller: &Controller<WORDS>,
    ) -> bool
    where
        H: RmtPeripheral,
    {
        if controller.state().is_done() {
            return false;
        }
        let delta = hardware.cycles().wrapping_sub(self.last_fill);
        if self.cursor < controller.bits() {
            delta > controller.max_cycles_per_fill()
        } else {
            delta > controller.max_cycles_to_drain()
        }
    }

    /// Stop the channel mid-frame.
    pub(crate) fn abort<H, const WORDS: usize>(
        &mut self,
        hardware: &mut H,
        controller: &mut Controller<WORDS>,
    ) where
        H: RmtPeripheral,
    {
        let stall = if self.refills == 0 {
            Stall::Startup
        } else {
            Stall::MidStream { bit: self.cursor }
        };

        #[cfg(feature = "esp32-log")]
        match stall {
            Stall::Startup => println!("[rmt] channel {} never refilled, aborting", self.channel.0),
            Stall::MidStream { bit } => {
                println!("[rmt] channel {} stalled at bit {}, aborting", self.channel.0, bit);
            }
        }

        self.cursor = controller.bits();
        self.latched = true;
        hardware.set_interrupts(self.channel, false);
        hardware.stop(self.channel);
        controller.set_state(ControllerState::Done(Outcome::Aborted(stall)));
    }

    /// Release the channel after the hardware reported the end marker.
    pub(crate) fn finish<H, const WORDS: usize>(
        &self,
        hardware: &mut H,
        controller: &mut Controller<WORDS>,
    ) where
        H: RmtPeripheral,
    {
        hardware.set_interrupts(self.channel, false);
        if !controller.state().is_done() {
            controller.set_state(ControllerState::Done(Outcome::Complete));
        }
    }

    pub(crate) const fn controller(&self) -> usize {
        self.controller
    }

    pub(crate) const fn worst_fill(&self) -> u32 {
        self.worst_fill
    }
}
