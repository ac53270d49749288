use core::fmt;

/// Reasons a [`PoolConfig`](crate::PoolConfig) is rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// `max_channels` is zero or larger than the slot table
    ChannelCount,
    /// `mem_blocks` is zero
    MemoryBlocks,
    /// The requested channels need more memory blocks than the peripheral has
    MemoryExhausted,
    /// Half a channel buffer is not a whole number of 32-bit chunks
    FillSize,
    /// Clock divider is zero
    Divider,
}

/// Driver error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Pool configuration does not fit the peripheral
    InvalidConfig(ConfigError),
    /// Bit timing cannot be expressed with the configured clock
    InvalidTiming,
    /// Controller table is full
    TooManyControllers,
    /// Controller id was not issued by this pool
    UnknownController,
    /// Frame does not fit the controller's pixel buffer
    PixelBufferOverflow { bytes: usize, capacity: usize },
    /// A show is already in flight
    Busy,
}

impl From<ConfigError> for Error {
    fn from(value: ConfigError) -> Self {
        Self::InvalidConfig(value)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::ChannelCount => "channel count out of range",
            Self::MemoryBlocks => "memory blocks per channel must be non-zero",
            Self::MemoryExhausted => "not enough memory blocks for the requested channels",
            Self::FillSize => "half buffer is not a multiple of 32 items",
            Self::Divider => "clock divider must be non-zero",
        };
        f.write_str(reason)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(reason) => write!(f, "invalid pool config: {reason}"),
            Self::InvalidTiming => f.write_str("bit timing out of range for the RMT clock"),
            Self::TooManyControllers => f.write_str("controller table is full"),
            Self::UnknownController => f.write_str("unknown controller"),
            Self::PixelBufferOverflow { bytes, capacity } => {
                write!(f, "frame of {bytes} bytes exceeds pixel buffer of {capacity} bytes")
            }
            Self::Busy => f.write_str("show already in progress"),
        }
    }
}

impl core::error::Error for ConfigError {}

impl core::error::Error for Error {}
