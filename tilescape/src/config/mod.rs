//! Configuration file handling.
//!
//! Settings load from an INI file:
//!
//! ```ini
//! [cache]
//! memory_capacity = 256
//! auto_clear = true
//! clear_factor = 0.15
//! use_disk_cache = true
//! directory = /home/user/.cache/tilescape
//! disk_capacity = 4096
//! file_suffix = .tile
//!
//! [render]
//! job_timeout_secs = 30
//! ```
//!
//! Every key is optional; absent keys take the defaults below. Validation
//! happens here, at the boundary: a negative capacity is a configuration
//! error reported synchronously, so the library setters can take `usize`.

use std::path::PathBuf;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::cache::{DiskCacheConfig, DEFAULT_CLEAR_FACTOR, DEFAULT_FILE_SUFFIX};
use crate::engine::{EngineConfig, DEFAULT_MEMORY_CAPACITY};

/// Default bound on one rasterize round trip, in seconds.
pub const DEFAULT_JOB_TIMEOUT_SECS: u64 = 30;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read or parsed as INI.
    #[error("failed to load config file: {0}")]
    Load(#[from] ini::Error),

    /// A capacity key held a negative value.
    #[error("{key} must not be negative: {value}")]
    NegativeCapacity {
        /// Offending key.
        key: String,
        /// Value found in the file.
        value: i64,
    },

    /// A key held a value of the wrong shape or range.
    #[error("invalid value for {key}: {value}")]
    Invalid {
        /// Offending key.
        key: String,
        /// Value found in the file.
        value: String,
    },
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSection {
    /// Memory-tier capacity in tiles.
    pub memory_capacity: usize,
    /// Batch-evict when the memory tier fills.
    pub auto_clear: bool,
    /// Fraction of memory capacity evicted per auto-clear pass.
    pub clear_factor: f64,
    /// Whether the persistent tier participates in lookups and spills.
    pub use_disk_cache: bool,
    /// Backing directory of the persistent tier.
    pub directory: PathBuf,
    /// Persistent-tier capacity in tiles.
    pub disk_capacity: usize,
    /// Suffix of persisted tile files.
    pub file_suffix: String,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            auto_clear: true,
            clear_factor: DEFAULT_CLEAR_FACTOR,
            use_disk_cache: true,
            directory: default_cache_directory(),
            disk_capacity: usize::MAX,
            file_suffix: DEFAULT_FILE_SUFFIX.to_string(),
        }
    }
}

/// `[render]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSection {
    /// Bound on one rasterize round trip, in seconds.
    pub job_timeout_secs: u64,
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            job_timeout_secs: DEFAULT_JOB_TIMEOUT_SECS,
        }
    }
}

/// Loaded and validated configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    /// Cache settings.
    pub cache: CacheSection,
    /// Render settings.
    pub render: RenderSection,
}

impl ConfigFile {
    /// Load and validate a configuration file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, is not valid INI, or holds an
    /// out-of-range value (negative capacities are rejected here).
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path)?;
        let mut config = Self::default();

        if let Some(value) = get(&ini, "cache", "memory_capacity") {
            config.cache.memory_capacity = parse_capacity("cache.memory_capacity", value)?;
        }
        if let Some(value) = get(&ini, "cache", "auto_clear") {
            config.cache.auto_clear = parse_bool("cache.auto_clear", value)?;
        }
        if let Some(value) = get(&ini, "cache", "clear_factor") {
            config.cache.clear_factor = parse_factor("cache.clear_factor", value)?;
        }
        if let Some(value) = get(&ini, "cache", "use_disk_cache") {
            config.cache.use_disk_cache = parse_bool("cache.use_disk_cache", value)?;
        }
        if let Some(value) = get(&ini, "cache", "directory") {
            config.cache.directory = PathBuf::from(value);
        }
        if let Some(value) = get(&ini, "cache", "disk_capacity") {
            config.cache.disk_capacity = parse_capacity("cache.disk_capacity", value)?;
        }
        if let Some(value) = get(&ini, "cache", "file_suffix") {
            config.cache.file_suffix = value.to_string();
        }
        if let Some(value) = get(&ini, "render", "job_timeout_secs") {
            config.render.job_timeout_secs = parse_u64("render.job_timeout_secs", value)?;
        }

        Ok(config)
    }

    /// Translate into an [`EngineConfig`] with an attached persistent
    /// tier.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            memory_capacity: self.cache.memory_capacity,
            auto_clear: self.cache.auto_clear,
            clear_factor: self.cache.clear_factor,
            use_disk_cache: self.cache.use_disk_cache,
            disk: Some(
                DiskCacheConfig::new(self.cache.directory.clone())
                    .with_capacity(self.cache.disk_capacity)
                    .with_file_suffix(self.cache.file_suffix.clone()),
            ),
            job_timeout: Duration::from_secs(self.render.job_timeout_secs),
            ..EngineConfig::default()
        }
    }
}

/// Default persistent-cache directory under the platform cache dir.
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("tilescape"))
        .unwrap_or_else(|| PathBuf::from(".tilescape-cache"))
}

fn get<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.get_from(Some(section), key).map(str::trim)
}

fn parse_capacity(key: &str, value: &str) -> Result<usize, ConfigError> {
    let parsed: i64 = value.parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })?;
    if parsed < 0 {
        return Err(ConfigError::NegativeCapacity {
            key: key.to_string(),
            value: parsed,
        });
    }
    Ok(parsed as usize)
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

fn parse_factor(key: &str, value: &str) -> Result<f64, ConfigError> {
    let parsed: f64 = value.parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })?;
    if !(parsed > 0.0 && parsed <= 1.0) {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(parsed)
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}
