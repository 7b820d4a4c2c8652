//! Wire envelope types.
//!
//! Every text frame carries one JSON object:
//!
//! ```text
//! { "event": string, "data": any, "type": "send" | "request", "response_id"?: string }
//! ```
//!
//! `response_id` is present exactly when `type` is `"request"`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind discriminator carried in the `type` field.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeKind {
    /// Fire-and-forget message.
    Send,
    /// Message expecting a reply on its `response_id` channel.
    Request,
}

impl EnvelopeKind {
    /// Wire spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Send => "send",
            Self::Request => "request",
        }
    }
}

/// An outgoing frame before mapper hooks run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name.
    pub event: String,
    /// Payload.
    pub data: Value,
    /// `send` or `request`.
    #[serde(rename = "type")]
    pub kind: EnvelopeKind,
    /// Reply channel, only for requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_id: Option<String>,
}

impl Envelope {
    /// Build a `send` envelope.
    pub fn send(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
            kind: EnvelopeKind::Send,
            response_id: None,
        }
    }

    /// Build a `request` envelope answered on `response_id`.
    pub fn request(event: impl Into<String>, data: Value, response_id: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data,
            kind: EnvelopeKind::Request,
            response_id: Some(response_id.into()),
        }
    }

    /// Build the envelope for `(event, data, response_id?)`.
    pub fn new(event: impl Into<String>, data: Value, response_id: Option<String>) -> Self {
        match response_id {
            Some(id) => Self::request(event, data, id),
            None => Self::send(event, data),
        }
    }
}

/// A validated incoming frame.
#[derive(Clone, Debug, PartialEq)]
pub struct IncomingMessage {
    /// Event name the frame is addressed to.
    pub event: String,
    /// Payload (`null` when the frame had none).
    pub data: Value,
    /// The `type` field, when it was one of the known kinds.
    pub kind: Option<EnvelopeKind>,
    /// The `response_id` field, when present and a string.
    pub response_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn send_envelope_omits_response_id() {
        let env = Envelope::send("chat", json!({"text": "hi"}));
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value, json!({"event": "chat", "data": {"text": "hi"}, "type": "send"}));
    }

    #[test]
    fn request_envelope_carries_response_id() {
        let env = Envelope::request("ping", json!({"x": 1}), "@response-ping-abc");
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["type"], "request");
        assert_eq!(value["response_id"], "@response-ping-abc");
    }

    #[test]
    fn new_picks_kind_from_response_id() {
        assert_eq!(Envelope::new("a", Value::Null, None).kind, EnvelopeKind::Send);
        assert_eq!(
            Envelope::new("a", Value::Null, Some("r".into())).kind,
            EnvelopeKind::Request
        );
    }

    #[test]
    fn kind_wire_names() {
        assert_eq!(EnvelopeKind::Send.as_str(), "send");
        assert_eq!(EnvelopeKind::Request.as_str(), "request");
        let kind: EnvelopeKind = serde_json::from_str("\"request\"").unwrap();
        assert_eq!(kind, EnvelopeKind::Request);
    }
}
