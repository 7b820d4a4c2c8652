//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from loading or validating [`ClientSettings`](crate::ClientSettings).
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("cannot read {}: {source}", path.display())]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not valid JSON, or its values have the wrong
    /// shape.
    #[error("bad settings in {}: {source}", path.display())]
    Parse {
        /// File that failed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// Serializing the built-in defaults failed.
    #[error("settings JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// A value was rejected by validation.
    #[error("invalid settings value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;
