//! Envelope encoding and incoming-frame validation.
//!
//! Outgoing: `(event, data, response_id?)` becomes an [`Envelope`], is
//! converted to a JSON value, passed through the matching mapper hook (the
//! request mapper when a `response_id` is present, the send mapper
//! otherwise) and serialized to text.
//!
//! Incoming validation runs in a fixed order and stops at the first failure:
//!
//! 1. the text must parse as JSON ([`CodecError::Malformed`])
//! 2. it must be an object with a string `event` ([`CodecError::MissingEvent`])
//! 3. someone must be listening for that event ([`CodecError::UnhandledEvent`])

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::envelope::{Envelope, EnvelopeKind, IncomingMessage};
use crate::errors::CodecError;

/// Envelope transform hook. Receives the envelope as JSON and returns the
/// value that goes on the wire.
pub type Mapper = Arc<dyn Fn(Value) -> Value + Send + Sync>;

/// Stateless encoder/validator with optional mapper hooks.
#[derive(Clone, Default)]
pub struct MessageCodec {
    send_mapper: Option<Mapper>,
    request_mapper: Option<Mapper>,
}

impl MessageCodec {
    /// Codec with identity mappers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transform applied to every `send` envelope.
    #[must_use]
    pub fn with_send_mapper(mut self, mapper: Mapper) -> Self {
        self.send_mapper = Some(mapper);
        self
    }

    /// Transform applied to every `request` envelope.
    #[must_use]
    pub fn with_request_mapper(mut self, mapper: Mapper) -> Self {
        self.request_mapper = Some(mapper);
        self
    }

    /// Build the (mapped) JSON value for an outgoing message.
    pub fn envelope_value(
        &self,
        event: &str,
        data: Value,
        response_id: Option<&str>,
    ) -> Result<Value, CodecError> {
        let envelope = Envelope::new(event, data, response_id.map(str::to_owned));
        let mapper = match envelope.kind {
            EnvelopeKind::Request => self.request_mapper.as_ref(),
            EnvelopeKind::Send => self.send_mapper.as_ref(),
        };
        let value = serde_json::to_value(envelope)?;
        Ok(match mapper {
            Some(map) => map(value),
            None => value,
        })
    }

    /// Serialize an outgoing message to frame text.
    pub fn encode(
        &self,
        event: &str,
        data: Value,
        response_id: Option<&str>,
    ) -> Result<String, CodecError> {
        let value = self.envelope_value(event, data, response_id)?;
        Ok(serde_json::to_string(&value)?)
    }

    /// Parse and structurally validate a frame (steps 1 and 2).
    pub fn parse(text: &str) -> Result<IncomingMessage, CodecError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| CodecError::Malformed(e.to_string()))?;
        let Value::Object(mut map) = value else {
            return Err(CodecError::MissingEvent);
        };
        let event = match map.remove("event") {
            Some(Value::String(event)) if !event.is_empty() => event,
            _ => return Err(CodecError::MissingEvent),
        };
        let data = map.remove("data").unwrap_or(Value::Null);
        let kind = map
            .remove("type")
            .and_then(|t| serde_json::from_value::<EnvelopeKind>(t).ok());
        let response_id = match map.remove("response_id") {
            Some(Value::String(id)) => Some(id),
            _ => None,
        };
        Ok(IncomingMessage {
            event,
            data,
            kind,
            response_id,
        })
    }

    /// Fully validate a frame: parse, then check `is_handled(event)`.
    ///
    /// Frames for events nobody listens to are rejected here, before
    /// dispatch, so they are dropped rather than buffered.
    pub fn decode<F>(&self, text: &str, is_handled: F) -> Result<IncomingMessage, CodecError>
    where
        F: FnOnce(&str) -> bool,
    {
        let message = Self::parse(text).inspect_err(|e| {
            trace!(reason = e.reason(), len = text.len(), "rejected frame");
        })?;
        if !is_handled(&message.event) {
            trace!(event = %message.event, "no listener for frame");
            return Err(CodecError::UnhandledEvent(message.event));
        }
        Ok(message)
    }
}

impl fmt::Debug for MessageCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageCodec")
            .field("send_mapper", &self.send_mapper.is_some())
            .field("request_mapper", &self.request_mapper.is_some())
            .finish()
    }
}
