//! Error types for the container.

use thiserror::Error;

/// Errors surfaced by barstack.
///
/// Render cycle failures never reach callers of the container; they are
/// logged and the next refresh tries again. These variants show up when
/// loading settings.
#[derive(Debug, Error)]
pub enum Error {
    /// A settings file could not be opened.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings could not be loaded.
    #[error("Failed to load settings: {0}")]
    Config(#[from] config::ConfigError),

    /// A duration string could not be parsed.
    #[error("Invalid duration: {0}")]
    Duration(String),
}

pub type Result<T> = std::result::Result<T, Error>;
