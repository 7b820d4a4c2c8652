//! Client and transport error types.

use sockline_settings::SettingsError;
use thiserror::Error;

/// Errors from socket construction and writes.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The URL could not be turned into a connection request.
    #[error("invalid url '{url}': {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A header or subprotocol in the transport options is not valid.
    #[error("invalid transport option: {0}")]
    InvalidOption(String),

    /// Write attempted while the socket is not open.
    #[error("socket is not open")]
    NotOpen,

    /// The socket task has gone away.
    #[error("socket closed")]
    Closed,

    /// Construction refused by the transport.
    #[error("connection refused: {0}")]
    Refused(String),
}

/// Errors returned from [`Client`](crate::Client) calls.
///
/// Only call-time problems are reported this way. Everything that happens
/// on the connection afterwards surfaces as `error` / `disconnect` events.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Bad arguments; nothing was sent or registered.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Settings failed validation.
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// No response arrived in time.
    #[error("request '{event}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Request event name.
        event: String,
        /// How long we waited.
        timeout_ms: u64,
    },

    /// The request was dropped without a response: the client was not
    /// connected, the request expired, or the client shut down.
    #[error("request '{event}' was dropped before a response arrived")]
    RequestDropped {
        /// Request event name.
        event: String,
    },

    /// The connection actor has stopped.
    #[error("client has shut down")]
    Shutdown,
}

impl ClientError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::Settings(_) => "settings",
            Self::Timeout { .. } => "timeout",
            Self::RequestDropped { .. } => "request_dropped",
            Self::Shutdown => "shutdown",
        }
    }
}
