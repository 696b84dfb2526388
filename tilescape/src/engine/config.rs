//! Engine configuration.

use std::time::Duration;

use crate::cache::{DiskCacheConfig, DEFAULT_CLEAR_FACTOR};
use crate::scheduler::DEFAULT_JOB_TIMEOUT;
use crate::tile::RenderParams;

/// Default memory-tier capacity in tiles.
pub const DEFAULT_MEMORY_CAPACITY: usize = 500;

/// Configuration for a [`TileEngine`](super::TileEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Memory-tier capacity in tiles.
    pub memory_capacity: usize,

    /// Evict a batch of entries when the memory tier fills, instead of a
    /// single entry.
    pub auto_clear: bool,

    /// Fraction of memory capacity evicted per auto-clear pass.
    pub clear_factor: f64,

    /// Whether the persistent tier participates in lookups and receives
    /// spilled evictions.
    pub use_disk_cache: bool,

    /// Persistent-tier configuration; `None` runs the engine memory-only.
    pub disk: Option<DiskCacheConfig>,

    /// Render-parameter fingerprint stamped into every tile key.
    pub render_params: RenderParams,

    /// Bound on one rasterize-and-store round trip.
    pub job_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            auto_clear: true,
            clear_factor: DEFAULT_CLEAR_FACTOR,
            use_disk_cache: true,
            disk: None,
            render_params: RenderParams::default(),
            job_timeout: DEFAULT_JOB_TIMEOUT,
        }
    }
}

impl EngineConfig {
    /// Configuration with defaults and no persistent tier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the memory-tier capacity.
    pub fn with_memory_capacity(mut self, capacity: usize) -> Self {
        self.memory_capacity = capacity;
        self
    }

    /// Attach a persistent tier.
    pub fn with_disk(mut self, disk: DiskCacheConfig) -> Self {
        self.disk = Some(disk);
        self
    }

    /// Set the render-parameter fingerprint.
    pub fn with_render_params(mut self, params: RenderParams) -> Self {
        self.render_params = params;
        self
    }

    /// Set the job timeout.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.memory_capacity, DEFAULT_MEMORY_CAPACITY);
        assert!(config.auto_clear);
        assert!(config.use_disk_cache);
        assert!(config.disk.is_none());
        assert_eq!(config.job_timeout, DEFAULT_JOB_TIMEOUT);
    }

    #[test]
    fn test_builder_setters() {
        let config = EngineConfig::new()
            .with_memory_capacity(8)
            .with_job_timeout(Duration::from_secs(5));
        assert_eq!(config.memory_capacity, 8);
        assert_eq!(config.job_timeout, Duration::from_secs(5));
    }
}
