//! CLI error type.

use thiserror::Error;

/// Errors surfaced to the terminal.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration file problem.
    #[error("configuration error: {0}")]
    Config(#[from] tilescape::config::ConfigError),

    /// Engine failure.
    #[error(transparent)]
    Engine(#[from] tilescape::EngineError),

    /// The snapshot image could not be written.
    #[error("failed to write image: {0}")]
    Image(String),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
