//! Owned raster tile pixel buffers.

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coord::TILE_SIZE;

/// RGBA color of the placeholder tile shown while the real tile is pending
/// (light gray).
const PLACEHOLDER_COLOR: [u8; 4] = [0xd3, 0xd3, 0xd3, 0xff];

/// An owned RGBA8 pixel buffer with explicit dimensions.
///
/// Bitmaps move between the cache tiers as `Arc<Bitmap>`; the backing
/// allocation is freed when the last holder drops its handle. The type is
/// `serde`-serializable so the persistent tier can encode it with bincode.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

/// Error for a pixel buffer that does not match its declared dimensions.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("pixel buffer of {len} bytes does not match {width}x{height} RGBA")]
pub struct BitmapSizeError {
    /// Declared width in pixels.
    pub width: u32,
    /// Declared height in pixels.
    pub height: u32,
    /// Actual buffer length in bytes.
    pub len: usize,
}

impl Bitmap {
    /// Create a bitmap from an RGBA8 buffer.
    ///
    /// # Errors
    ///
    /// Returns [`BitmapSizeError`] unless `pixels.len() == width * height * 4`.
    pub fn from_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, BitmapSizeError> {
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(BitmapSizeError {
                width,
                height,
                len: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    /// Create a bitmap filled with a single RGBA color.
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for _ in 0..(width as usize * height as usize) {
            pixels.extend_from_slice(&color);
        }
        Self {
            width,
            height,
            pixels,
        }
    }

    /// The shared placeholder tile drawn while a real tile is missing or
    /// its decoded content is still in flight.
    ///
    /// Built once and shared; redraw cycles hand out clones of the same
    /// `Arc`.
    pub fn placeholder() -> Arc<Bitmap> {
        static PLACEHOLDER: OnceLock<Arc<Bitmap>> = OnceLock::new();
        Arc::clone(PLACEHOLDER.get_or_init(|| {
            Arc::new(Bitmap::solid(TILE_SIZE, TILE_SIZE, PLACEHOLDER_COLOR))
        }))
    }

    /// Width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The RGBA8 pixel data, row-major, 4 bytes per pixel.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rgba_accepts_matching_buffer() {
        let bitmap = Bitmap::from_rgba(2, 3, vec![0u8; 24]).unwrap();
        assert_eq!(bitmap.width(), 2);
        assert_eq!(bitmap.height(), 3);
        assert_eq!(bitmap.pixels().len(), 24);
    }

    #[test]
    fn test_from_rgba_rejects_short_buffer() {
        let result = Bitmap::from_rgba(2, 3, vec![0u8; 23]);
        assert!(result.is_err());
    }

    #[test]
    fn test_solid_fill() {
        let bitmap = Bitmap::solid(2, 2, [1, 2, 3, 4]);
        assert_eq!(bitmap.pixels(), &[1, 2, 3, 4, 1, 2, 3, 4, 1, 2, 3, 4, 1, 2, 3, 4]);
    }

    #[test]
    fn test_placeholder_is_tile_sized_and_shared() {
        let a = Bitmap::placeholder();
        let b = Bitmap::placeholder();

        assert_eq!(a.width(), TILE_SIZE);
        assert_eq!(a.height(), TILE_SIZE);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_bincode_roundtrip() {
        let bitmap = Bitmap::solid(4, 4, [9, 8, 7, 255]);
        let bytes = bincode::serialize(&bitmap).unwrap();
        let decoded: Bitmap = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, bitmap);
    }

    #[test]
    fn test_debug_omits_pixel_data() {
        let bitmap = Bitmap::solid(2, 2, [0, 0, 0, 255]);
        let debug = format!("{:?}", bitmap);
        assert!(debug.contains("bytes"));
        assert!(!debug.contains("[0, 0, 0, 255"));
    }
}
