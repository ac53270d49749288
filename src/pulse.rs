//! Pulse items and bit encoding.

use crate::error::Error;
use crate::timing::{ClockConfig, MAX_DURATION, RESET_NS, Timing};

const DURATION0_MASK: u32 = 0x7FFF;
const LEVEL0_BIT: u32 = 1 << 15;
const DURATION1_SHIFT: u32 = 16;
const LEVEL1_BIT: u32 = 1 << 31;

/// One RMT item: two timed levels packed into 32 bits.
///
/// Layout matches the ESP32 channel memory: duration0 in bits 0..15,
/// level0 in bit 15, duration1 in bits 16..31, level1 in bit 31.
/// A zero duration makes the channel stop at that point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PulseItem(pub u32);

impl PulseItem {
    /// End marker
    pub const END: Self = Self(0);

    pub const fn new(level0: bool, duration0: u32, level1: bool, duration1: u32) -> Self {
        let mut raw = (duration0 & DURATION0_MASK) | ((duration1 & DURATION0_MASK) << DURATION1_SHIFT);
        if level0 {
            raw |= LEVEL0_BIT;
        }
        if level1 {
            raw |= LEVEL1_BIT;
        }
        Self(raw)
    }

    pub const fn level0(self) -> bool {
        self.0 & LEVEL0_BIT != 0
    }

    pub const fn duration0(self) -> u32 {
        self.0 & DURATION0_MASK
    }

    pub const fn level1(self) -> bool {
        self.0 & LEVEL1_BIT != 0
    }

    pub const fn duration1(self) -> u32 {
        (self.0 >> DURATION1_SHIFT) & DURATION0_MASK
    }

    /// Whether the channel stops while executing this item
    pub const fn is_terminal(self) -> bool {
        self.duration0() == 0 || self.duration1() == 0
    }
}

/// Precomputed items for a zero bit, a one bit and the latch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseTemplates {
    pub zero: PulseItem,
    pub one: PulseItem,
    pub latch: PulseItem,
}

impl PulseTemplates {
    /// Build templates for `timing` at the given clock.
    ///
    /// Fails when a phase rounds to zero ticks or overflows the item field.
    pub fn new(timing: Timing, clock: &ClockConfig) -> Result<Self, Error> {
        if clock.divider == 0 {
            return Err(Error::InvalidTiming);
        }
        let zero_low_ns = timing.t2.checked_add(timing.t3).ok_or(Error::InvalidTiming)?;
        let one_high_ns = timing.t1.checked_add(timing.t2).ok_or(Error::InvalidTiming)?;

        let zero_high = clock.ns_to_ticks(timing.t1);
        let zero_low = clock.ns_to_ticks(zero_low_ns);
        let one_high = clock.ns_to_ticks(one_high_ns);
        let one_low = clock.ns_to_ticks(timing.t3);

        for ticks in [zero_high, zero_low, one_high, one_low] {
            if ticks == 0 || ticks > MAX_DURATION {
                return Err(Error::InvalidTiming);
            }
        }

        let reset = clock.ns_to_ticks(RESET_NS).clamp(1, MAX_DURATION);

        Ok(Self {
            zero: PulseItem::new(true, zero_high, false, zero_low),
            one: PulseItem::new(true, one_high, false, one_low),
            latch: PulseItem::new(false, reset, false, 0),
        })
    }

    /// Encode the `count` most significant bits of `word`, MSB first.
    ///
    /// Returns the number of items written.
    pub fn encode_bits(&self, word: u32, count: usize, out: &mut [PulseItem]) -> usize {
        let count = count.min(32).min(out.len());
        let mut bits = word;
        for item in &mut out[..count] {
            *item = if bits & 0x8000_0000 != 0 {
                self.one
            } else {
                self.zero
            };
            bits <<= 1;
        }
        count
    }

    /// Decode a data item back into a bit.
    ///
    /// Returns `None` for anything that is not one of the two bit templates.
    pub fn decode(&self, item: PulseItem) -> Option<bool> {
        if item == self.one {
            Some(true)
        } else if item == self.zero {
            Some(false)
        } else {
            None
        }
    }
}
