//! Channel events and a bounded queue to hand them out of interrupt context.
//!
//! The queue is built on `critical-section` and `heapless::Deque` and is
//! safe to share between an interrupt handler and the foreground.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

use crate::peripheral::RmtChannel;

/// What the hardware reported for a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Half of the channel buffer has been sent
    Threshold,
    /// Transmission reached an end marker
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelEvent {
    pub channel: RmtChannel,
    pub kind: EventKind,
}

impl ChannelEvent {
    pub const fn threshold(channel: RmtChannel) -> Self {
        Self {
            channel,
            kind: EventKind::Threshold,
        }
    }

    pub const fn done(channel: RmtChannel) -> Self {
        Self {
            channel,
            kind: EventKind::Done,
        }
    }
}

/// Error returned when trying to post to a full queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrySendError(pub ChannelEvent);

/// Error returned when trying to receive from an empty queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TryReceiveError;

/// Bounded event queue.
pub struct EventQueue<const SIZE: usize> {
    inner: Mutex<RefCell<Deque<ChannelEvent, SIZE>>>,
}

impl<const SIZE: usize> EventQueue<SIZE> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    /// Handle for the interrupt side.
    pub const fn sender(&self) -> Sender<'_, SIZE> {
        Sender { queue: self }
    }

    /// Handle for the drain side.
    pub const fn receiver(&self) -> Receiver<'_, SIZE> {
        Receiver { queue: self }
    }

    pub fn try_send(&self, event: ChannelEvent) -> Result<(), TrySendError> {
        critical_section::with(|cs| {
            let mut queue = self.inner.borrow(cs).borrow_mut();
            queue.push_back(event).map_err(TrySendError)
        })
    }

    pub fn try_receive(&self) -> Result<ChannelEvent, TryReceiveError> {
        critical_section::with(|cs| {
            let mut queue = self.inner.borrow(cs).borrow_mut();
            queue.pop_front().ok_or(TryReceiveError)
        })
    }
}

impl<const SIZE: usize> Default for EventQueue<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy)]
pub struct Sender<'a, const SIZE: usize> {
    queue: &'a EventQueue<SIZE>,
}

impl<const SIZE: usize> Sender<'_, SIZE> {
    pub fn try_send(&self, event: ChannelEvent) -> Result<(), TrySendError> {
        self.queue.try_send(event)
    }
}

#[derive(Clone, Copy)]
pub struct Receiver<'a, const SIZE: usize> {
    queue: &'a EventQueue<SIZE>,
}

impl<const SIZE: usize> Receiver<'_, SIZE> {
    pub fn try_receive(&self) -> Result<ChannelEvent, TryReceiveError> {
        self.queue.try_receive()
    }
}
