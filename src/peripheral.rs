use crate::events::EventKind;
use crate::pulse::PulseItem;
use crate::timing::ITEMS_PER_BLOCK;

/// Hardware RMT channel index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RmtChannel(pub u8);

/// Output pin number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pin(pub u8);

/// Abstract pulse generator peripheral
///
/// Implement this trait to support different hardware platforms.
/// Every method may be called from interrupt context and must not block.
pub trait RmtPeripheral {
    /// Total memory blocks shared by all channels
    const MEMORY_BLOCKS: usize;

    /// Pulse items per memory block
    const ITEMS_PER_BLOCK: usize = ITEMS_PER_BLOCK;

    /// Set up a transmit channel: clock divider, memory blocks it owns and
    /// the item count after which a threshold event fires.
    fn configure(&mut self, channel: RmtChannel, divider: u8, mem_blocks: u8, threshold: usize);

    /// Route the channel output to `pin`
    fn attach_pin(&mut self, channel: RmtChannel, pin: Pin);

    /// Copy items into channel memory starting at `offset`
    fn write_items(&mut self, channel: RmtChannel, offset: usize, items: &[PulseItem]);

    /// Arm or disarm threshold and end-of-transmission events
    fn set_interrupts(&mut self, channel: RmtChannel, enabled: bool);

    /// Start transmitting from the beginning of channel memory
    fn start(&mut self, channel: RmtChannel);

    /// Halt transmission and discard pending events
    fn stop(&mut self, channel: RmtChannel);

    /// Take and clear the pending event of a channel
    fn take_event(&mut self, channel: RmtChannel) -> Option<EventKind>;

    /// Free-running CPU cycle counter
    fn cycles(&self) -> u32;
}
