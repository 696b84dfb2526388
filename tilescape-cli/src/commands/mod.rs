//! CLI command implementations.

pub mod cache;
pub mod snapshot;

use std::path::Path;

use tilescape::config::ConfigFile;

use crate::error::CliError;

/// Load the named configuration file, or defaults when none was given.
pub fn load_config(path: Option<&Path>) -> Result<ConfigFile, CliError> {
    match path {
        Some(path) => Ok(ConfigFile::load(path)?),
        None => Ok(ConfigFile::default()),
    }
}
