//! Tilescape - tile caching and render scheduling for scrollable maps
//!
//! This library turns a viewport position into a grid of fixed-size raster
//! tiles and keeps that grid filled: each tile is served from a bounded
//! in-memory cache, from an on-disk cache behind asynchronous read/write
//! workers, or — failing both — from a render job executed
//! nearest-to-center first behind a pause gate.
//!
//! The actual rasterizer is an external collaborator plugged in through
//! the [`TileRenderer`] trait; drawing stays with the caller, which
//! receives a [`scheduler::Frame`] describing what to blit where.

pub mod cache;
pub mod config;
pub mod coord;
pub mod engine;
pub mod scheduler;
pub mod tile;

pub use engine::{EngineConfig, EngineError, TileEngine};
pub use scheduler::{CanvasSize, RedrawNotifier, Viewport};
pub use tile::{Bitmap, RenderError, RenderParams, SourceId, TileKey, TileRenderer};
