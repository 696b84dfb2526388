//! Procedural debug rasterizer.
//!
//! Stands in for a real map rasterizer: each tile gets a deterministic
//! test pattern derived from its grid position, so scrolling and cache
//! behavior are visible without any map data.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tiny_skia::{Color, Paint, Pixmap, Rect, Transform};

use tilescape::coord::TILE_SIZE;
use tilescape::{Bitmap, RenderError, SourceId, TileKey, TileRenderer};

/// Size of one checker cell in pixels.
const CHECKER: u32 = 32;

/// Renderer producing deterministic test-pattern tiles.
pub struct DebugRenderer {
    next_id: AtomicU64,
    open_sources: Mutex<HashSet<u64>>,
}

impl DebugRenderer {
    /// Create a renderer with no open sources.
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            open_sources: Mutex::new(HashSet::new()),
        }
    }

    /// Base color for a tile, derived from its grid position.
    fn base_color(key: &TileKey) -> (u8, u8, u8) {
        let coord = key.coord;
        let mix = coord
            .x
            .wrapping_mul(2654435761)
            .wrapping_add(coord.y.wrapping_mul(40503))
            .wrapping_add(u32::from(coord.zoom) << 8);
        (
            160 + (mix & 0x3f) as u8,
            160 + ((mix >> 6) & 0x3f) as u8,
            160 + ((mix >> 12) & 0x3f) as u8,
        )
    }
}

impl Default for DebugRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TileRenderer for DebugRenderer {
    fn open(&self, path: &Path) -> Result<SourceId, RenderError> {
        if path.as_os_str().is_empty() {
            return Err(RenderError::SourceOpen {
                path: path.to_path_buf(),
                reason: "empty source path".into(),
            });
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.open_sources.lock().insert(id);
        tracing::info!(path = %path.display(), id, "debug renderer source opened");
        Ok(SourceId::new(id))
    }

    fn render(&self, key: &TileKey) -> Result<Bitmap, RenderError> {
        if !self.open_sources.lock().contains(&key.source.raw()) {
            return Err(RenderError::UnknownSource(key.source));
        }

        let mut pixmap = Pixmap::new(TILE_SIZE, TILE_SIZE)
            .ok_or_else(|| RenderError::Rasterize("pixmap allocation failed".into()))?;

        let (r, g, b) = Self::base_color(key);
        pixmap.fill(Color::from_rgba8(r, g, b, 255));

        // Checkerboard overlay.
        let mut shade = Paint::default();
        shade.set_color_rgba8(
            r.saturating_sub(24),
            g.saturating_sub(24),
            b.saturating_sub(24),
            255,
        );
        for cy in 0..(TILE_SIZE / CHECKER) {
            for cx in 0..(TILE_SIZE / CHECKER) {
                if (cx + cy) % 2 == 0 {
                    continue;
                }
                let rect = Rect::from_xywh(
                    (cx * CHECKER) as f32,
                    (cy * CHECKER) as f32,
                    CHECKER as f32,
                    CHECKER as f32,
                )
                .ok_or_else(|| RenderError::Rasterize("invalid checker rect".into()))?;
                pixmap.fill_rect(rect, &shade, Transform::identity(), None);
            }
        }

        // Tile border, so the grid is visible in the snapshot.
        let mut border = Paint::default();
        border.set_color_rgba8(90, 90, 90, 255);
        let size = TILE_SIZE as f32;
        for edge in [
            Rect::from_xywh(0.0, 0.0, size, 1.0),
            Rect::from_xywh(0.0, 0.0, 1.0, size),
        ] {
            let rect = edge.ok_or_else(|| RenderError::Rasterize("invalid border rect".into()))?;
            pixmap.fill_rect(rect, &border, Transform::identity(), None);
        }

        // Fully opaque, so premultiplied data equals straight RGBA.
        Bitmap::from_rgba(TILE_SIZE, TILE_SIZE, pixmap.take())
            .map_err(|e| RenderError::Rasterize(e.to_string()))
    }
}
