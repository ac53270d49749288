#![no_std]

//! Clockless LED strip output over RMT pulse channels.
//!
//! Each registered strip is a [`Controller`](controller::Controller) with its
//! own pin, bit timing and packed frame. A [`ChannelPool`] streams frames
//! into the few hardware channels half a buffer at a time and starts queued
//! strips as channels free up.
//!
//! ```ignore
//! static POOL: StaticCell<ChannelPool<EspRmt, 4, MAX_CONTROLLERS, 256>> = StaticCell::new();
//! let pool = POOL.init(ChannelPool::new(EspRmt::new(peripherals.RMT), PoolConfig::default())?);
//! let strip = pool.register(Pin(15), Timing::WS2812)?;
//!
//! // RMT interrupt handler
//! pool.on_interrupt();
//!
//! // Render task
//! loop {
//!     pool.load(strip, &mut OrderedPixels::new(&frame, ColorOrder::Grb))?;
//!     pool.show_all().await?;
//! }
//! ```

pub mod controller;
mod driver;
pub mod error;
pub mod events;
pub mod peripheral;
pub mod pixels;
pub mod pool;
pub mod pulse;
pub mod timing;

pub use controller::{ControllerId, ControllerState, Outcome, Stall};
pub use error::{ConfigError, Error};
pub use events::{ChannelEvent, EventKind, EventQueue};
pub use peripheral::{Pin, RmtChannel, RmtPeripheral};
pub use pixels::{ColorOrder, OrderedPixels, PixelSource, Rgb};
pub use pool::{ChannelPool, PoolConfig, ShowGuard, ShowReport};
pub use pulse::{PulseItem, PulseTemplates};
pub use timing::{ClockConfig, MAX_CONTROLLERS, Timing};
pub use embassy_time::{Duration, Instant};
