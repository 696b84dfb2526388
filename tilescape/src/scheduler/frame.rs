//! Redraw output: what to draw where.

use std::sync::Arc;

use crate::coord::TileCoord;
use crate::tile::Bitmap;

use super::viewport::TileSpan;

/// How a tile in a frame was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Decoded bitmap served from the memory tier.
    Ready,
    /// Present in the persistent tier; the placeholder is drawn while the
    /// decoded content is promoted into the memory tier.
    Promoted,
    /// Missing from both tiers; the placeholder is drawn and (on a
    /// job-creating redraw) a render job was queued.
    Loading,
}

/// One tile blit: bitmap and canvas position.
#[derive(Debug, Clone)]
pub struct TileDraw {
    /// Grid position of the tile.
    pub coord: TileCoord,
    /// Canvas X of the tile's left edge, in pixels (may be negative).
    pub canvas_x: f64,
    /// Canvas Y of the tile's top edge, in pixels (may be negative).
    pub canvas_y: f64,
    /// Bitmap to draw.
    pub bitmap: Arc<Bitmap>,
    /// How the tile was resolved.
    pub state: TileState,
}

/// The draw list produced by one redraw cycle, in row-major tile order.
#[derive(Debug)]
pub struct Frame {
    /// Visible tile range of the cycle.
    pub span: TileSpan,
    /// Tiles to draw.
    pub tiles: Vec<TileDraw>,
}

impl Frame {
    /// Number of tiles not yet showing final content.
    pub fn pending_count(&self) -> usize {
        self.tiles
            .iter()
            .filter(|t| t.state != TileState::Ready)
            .count()
    }

    /// Whether every visible tile resolved from the memory tier.
    pub fn is_complete(&self) -> bool {
        self.pending_count() == 0
    }
}
