//! Visible-grid scheduling and job execution.
//!
//! A redraw cycle derives the visible tile range from the viewport
//! ([`TileSpan`]), resolves every tile through the cache tiers into a
//! [`Frame`], and — when requested — rebuilds the pending [`JobList`]
//! sorted nearest-to-center. The [`RenderLoop`] drains that list one job
//! at a time behind the pause gate.

mod executor;
mod frame;
mod jobs;
mod viewport;

pub use executor::{RenderLoop, DEFAULT_JOB_TIMEOUT};
pub use frame::{Frame, TileDraw, TileState};
pub use jobs::{JobList, RenderJob};
pub use viewport::{CanvasSize, TileSpan, Viewport};

/// Receiver for out-of-band repaint requests.
///
/// Background activity (a finished render job, a completed cache read)
/// announces that the picture on screen is stale by calling
/// [`request_redraw`](Self::request_redraw). Implementations are invoked
/// from worker tasks and must only *schedule* a redraw — typically by
/// notifying the UI loop — never perform drawing inline.
pub trait RedrawNotifier: Send + Sync {
    /// Schedule a repaint-only redraw (no new jobs).
    fn request_redraw(&self);
}
