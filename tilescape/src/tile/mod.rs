//! Tile value types and the rasterizer seam.

mod bitmap;
mod key;
mod renderer;

pub use bitmap::{Bitmap, BitmapSizeError};
pub use key::{RenderParams, SourceId, TileKey};
pub use renderer::{RenderError, TileRenderer};
