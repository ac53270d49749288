//! Logical LED strip controller.
//!
//! A controller is registered once with its pin and bit timing and keeps
//! its packed frame between shows. It never owns a hardware channel; the
//! pool binds it to a free slot for the duration of one transmission.

use heapless::Vec;

use crate::error::Error;
use crate::peripheral::Pin;
use crate::pixels::{PixelSource, pack};
use crate::pulse::PulseTemplates;
use crate::timing::{ClockConfig, Timing};

/// Handle returned by [`ChannelPool::register`](crate::ChannelPool::register)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ControllerId(pub(crate) u8);

impl ControllerId {
    /// Registration index
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Where a refill deadline was missed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stall {
    /// No half-buffer event was serviced since the channel was started
    Startup,
    /// Stream stalled after `bit` bits had been queued
    MidStream { bit: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// All bits and the latch were sent
    Complete,
    /// Transmission was cut short by a missed refill deadline
    Aborted(Stall),
}

/// Per-show lifecycle of a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ControllerState {
    #[default]
    Idle,
    /// Bound to a channel, priming both halves
    Starting,
    /// Refilling on every threshold event
    Streaming,
    /// Latch queued, waiting for the end of transmission
    Latching,
    Done(Outcome),
}

impl ControllerState {
    pub const fn is_done(self) -> bool {
        matches!(self, Self::Done(_))
    }
}

pub struct Controller<const WORDS: usize> {
    pin: Pin,
    timing: Timing,
    templates: PulseTemplates,
    max_cycles_per_fill: u32,
    max_cycles_to_drain: u32,
    pixels: Vec<u32, WORDS>,
    bits: usize,
    loaded: bool,
    state: ControllerState,
}

impl<const WORDS: usize> Controller<WORDS> {
    pub(crate) fn new(
        pin: Pin,
        timing: Timing,
        clock: &ClockConfig,
        pulses_per_fill: usize,
    ) -> Result<Self, Error> {
        let templates = PulseTemplates::new(timing, clock)?;
        Ok(Self {
            pin,
            timing,
            templates,
            max_cycles_per_fill: timing.max_cycles_per_fill(clock, pulses_per_fill),
            max_cycles_to_drain: timing.max_cycles_to_drain(clock, pulses_per_fill),
            pixels: Vec::new(),
            bits: 0,
            loaded: false,
            state: ControllerState::Idle,
        })
    }

    /// Pack a new frame.
    ///
    /// On failure the controller holds no frame and is left out of the
    /// next show.
    pub(crate) fn load<S>(&mut self, source: &mut S) -> Result<(), Error>
    where
        S: PixelSource + ?Sized,
    {
        self.loaded = false;
        self.bits = 0;
        self.state = ControllerState::Idle;
        self.bits = pack(source, &mut self.pixels)?;
        self.loaded = true;
        Ok(())
    }

    pub const fn pin(&self) -> Pin {
        self.pin
    }

    pub const fn timing(&self) -> Timing {
        self.timing
    }

    pub const fn templates(&self) -> &PulseTemplates {
        &self.templates
    }

    pub const fn max_cycles_per_fill(&self) -> u32 {
        self.max_cycles_per_fill
    }

    /// Budget for sending whatever is left in channel memory once the
    /// whole frame has been written
    pub const fn max_cycles_to_drain(&self) -> u32 {
        self.max_cycles_to_drain
    }

    /// Frame length in bits
    pub const fn bits(&self) -> usize {
        self.bits
    }

    pub const fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub const fn state(&self) -> ControllerState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: ControllerState) {
        self.state = state;
    }

    /// Packed word holding bit `bit` of the frame
    pub(crate) fn word_at(&self, bit: usize) -> u32 {
        self.pixels.get(bit / 32).copied().unwrap_or(0)
    }
}
