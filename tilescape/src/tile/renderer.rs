//! The rasterizer seam.
//!
//! Tile rasterization is an external collaborator: the engine hands a
//! [`TileKey`] to an opaque synchronous renderer and receives a finished
//! [`Bitmap`]. Implementations parse the map data format and draw vector
//! geometry; the engine only schedules them.

use std::path::{Path, PathBuf};

use thiserror::Error;

use super::{Bitmap, SourceId, TileKey};

/// Errors surfaced by a [`TileRenderer`].
#[derive(Debug, Error)]
pub enum RenderError {
    /// The backing map-data source could not be opened.
    #[error("failed to open map source {path}: {reason}")]
    SourceOpen {
        /// Path that was attempted.
        path: PathBuf,
        /// Renderer-specific failure description.
        reason: String,
    },

    /// A tile referenced a source the renderer does not have open.
    #[error("no open map source {0}")]
    UnknownSource(SourceId),

    /// Rasterization of a single tile failed.
    #[error("tile rasterization failed: {0}")]
    Rasterize(String),
}

/// Synchronous tile rasterizer.
///
/// `render` may be slow; the engine always invokes it from a blocking
/// worker context, never from the caller's redraw path. Implementations
/// must be callable concurrently from worker threads.
pub trait TileRenderer: Send + Sync {
    /// Open a map-data source and return its identity.
    ///
    /// # Errors
    ///
    /// An open failure is fatal to the load operation that requested it;
    /// the engine schedules no jobs against a source that failed to open.
    fn open(&self, path: &Path) -> Result<SourceId, RenderError>;

    /// Rasterize one tile.
    ///
    /// # Errors
    ///
    /// A failure is isolated to this tile; the execution loop logs it and
    /// proceeds to the next job.
    fn render(&self, key: &TileKey) -> Result<Bitmap, RenderError>;
}
