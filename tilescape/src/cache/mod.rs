//! Two-tier tile caching.
//!
//! The memory tier ([`MemoryCache`]) is a bounded mapping from [`TileKey`]
//! to decoded bitmaps with least-recently-fetched eviction. Evicted entries
//! spill into the persistent tier ([`DiskCache`]), which serializes tiles
//! to a backing directory through asynchronous write-behind and read-ahead
//! workers.
//!
//! ```text
//!  redraw path ──► MemoryCache ──(evict)──► DiskCache ──► writer worker ──► files
//!                      ▲                        │
//!                      └──(promote via          └──► reader worker ──► read-complete
//!                          read-complete)                              callback
//! ```
//!
//! [`TileKey`]: crate::tile::TileKey

mod disk;
mod memory;
mod stats;

pub use disk::{DiskCache, DiskCacheConfig, DEFAULT_FILE_SUFFIX, DEFAULT_READ_RETRY_BUDGET};
pub use memory::MemoryCache;
pub use stats::CacheStats;

use std::path::PathBuf;

use thiserror::Error;

/// Default fraction of capacity removed by one auto-clear eviction pass.
pub const DEFAULT_CLEAR_FACTOR: f64 = 0.15;

/// Errors surfaced by the cache tiers.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O failure against the backing directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The configured backing path exists but is not a directory.
    #[error("cache path {0} is not a directory")]
    NotADirectory(PathBuf),

    /// Capacity could not be freed: nothing left to evict, yet the tier is
    /// still over its limit.
    #[error("cannot free {needed} slot(s) within capacity {capacity}")]
    Exhausted {
        /// Slots the operation needed.
        needed: usize,
        /// Configured capacity at the time of the failure.
        capacity: usize,
    },

    /// Serializing a tile for persistence failed.
    #[error("tile encoding failed: {0}")]
    Encode(String),

    /// Deserializing a persisted tile failed.
    #[error("tile decoding failed: {0}")]
    Decode(String),

    /// A background task could not be joined.
    #[error("background cache task failed: {0}")]
    Worker(String),
}
