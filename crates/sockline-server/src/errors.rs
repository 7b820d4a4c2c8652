//! Server error types.

use thiserror::Error;

/// Errors from the acceptance shim.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or accepting failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Envelope serialization failed.
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
    /// The connection's writer has stopped.
    #[error("connection {0} is closed")]
    ConnectionClosed(String),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
