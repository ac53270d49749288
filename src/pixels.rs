//! Pixel producer interface and packing into 32-bit words.

use heapless::Vec;
use smart_leds::RGB8;

use crate::error::Error;

pub type Rgb = RGB8;

/// Sequential source of scaled pixel bytes.
///
/// Scaling, dithering and color reordering happen before the bytes reach
/// the driver; `load` returns the three bytes of the current pixel exactly
/// as they go on the wire.
pub trait PixelSource {
    /// Number of pixels not yet consumed
    fn remaining(&self) -> usize;

    /// Bytes of the current pixel in wire order
    fn load(&mut self) -> [u8; 3];

    /// Move to the next pixel
    fn advance(&mut self);

    fn has_more(&self) -> bool {
        self.remaining() > 0
    }
}

/// Wire order of the three color channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ColorOrder {
    Rgb,
    Rbg,
    #[default]
    Grb,
    Gbr,
    Brg,
    Bgr,
}

impl ColorOrder {
    pub const fn apply(self, color: Rgb) -> [u8; 3] {
        let Rgb { r, g, b } = color;
        match self {
            Self::Rgb => [r, g, b],
            Self::Rbg => [r, b, g],
            Self::Grb => [g, r, b],
            Self::Gbr => [g, b, r],
            Self::Brg => [b, r, g],
            Self::Bgr => [b, g, r],
        }
    }
}

/// [`PixelSource`] over a slice of colors, reordered but otherwise untouched
#[derive(Debug, Clone)]
pub struct OrderedPixels<'a> {
    pixels: &'a [Rgb],
    order: ColorOrder,
    position: usize,
}

impl<'a> OrderedPixels<'a> {
    pub const fn new(pixels: &'a [Rgb], order: ColorOrder) -> Self {
        Self {
            pixels,
            order,
            position: 0,
        }
    }
}

impl PixelSource for OrderedPixels<'_> {
    fn remaining(&self) -> usize {
        self.pixels.len().saturating_sub(self.position)
    }

    fn load(&mut self) -> [u8; 3] {
        self.pixels
            .get(self.position)
            .map(|color| self.order.apply(*color))
            .unwrap_or_default()
    }

    fn advance(&mut self) {
        self.position += 1;
    }
}

/// Pack the whole source into `words`, four bytes per word, first byte in
/// the most significant position.
///
/// The buffer is cleared and resized in place. Returns the frame length in
/// bits.
pub(crate) fn pack<S, const WORDS: usize>(
    source: &mut S,
    words: &mut Vec<u32, WORDS>,
) -> Result<usize, Error>
where
    S: PixelSource + ?Sized,
{
    let bytes = source.remaining() * 3;
    let needed = bytes.div_ceil(4);
    if needed > WORDS {
        return Err(Error::PixelBufferOverflow {
            bytes,
            capacity: WORDS * 4,
        });
    }

    words.clear();
    words
        .resize(needed, 0)
        .map_err(|()| Error::PixelBufferOverflow {
            bytes,
            capacity: WORDS * 4,
        })?;

    let mut index = 0;
    while source.has_more() && index < bytes {
        for byte in source.load() {
            let shift = 24 - 8 * (index % 4);
            if let Some(word) = words.get_mut(index / 4) {
                *word |= u32::from(byte) << shift;
            }
            index += 1;
        }
        source.advance();
    }

    Ok(index * 8)
}
