//! Codec error types.

use thiserror::Error;

/// Reasons an incoming frame is rejected before dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The frame is not valid JSON.
    #[error("malformed payload: {0}")]
    Malformed(String),
    /// The frame has no string `event` field.
    #[error("missing event")]
    MissingEvent,
    /// Nothing is registered for the frame's event.
    #[error("unhandled event: {0}")]
    UnhandledEvent(String),
    /// Serializing an outgoing envelope failed.
    #[error("failed to encode envelope: {0}")]
    Encode(String),
}

impl CodecError {
    /// Short classification string for logging.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed payload",
            Self::MissingEvent => "missing event",
            Self::UnhandledEvent(_) => "unhandled event",
            Self::Encode(_) => "encode failure",
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_strings() {
        assert_eq!(CodecError::Malformed("eof".into()).reason(), "malformed payload");
        assert_eq!(CodecError::MissingEvent.reason(), "missing event");
        assert_eq!(
            CodecError::UnhandledEvent("x".into()).reason(),
            "unhandled event"
        );
    }

    #[test]
    fn display_includes_event_name() {
        let err = CodecError::UnhandledEvent("chat.message".into());
        assert_eq!(err.to_string(), "unhandled event: chat.message");
    }
}
