//! Request/response pairing.
//!
//! A request is sent with a fresh `response_id`; the peer answers by
//! emitting an event with exactly that name. Pending requests live in a map
//! keyed by the id, separate from the event bus, and are taken out on the
//! first matching frame so each fires at most once.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use serde_json::{Map, Value};
use sockline_core::ResponseId;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::errors::ClientError;

/// One-shot response callback.
pub type ResponseCallback = Box<dyn FnOnce(Value) + Send>;

/// Where a response goes.
pub enum Responder {
    /// User callback; dropped silently on failure.
    Callback(ResponseCallback),
    /// Awaiting [`Client::call`](crate::Client::call); told why on failure.
    Reply(oneshot::Sender<Result<Value, ClientError>>),
}

impl Responder {
    /// Deliver a response.
    pub fn respond(self, data: Value) {
        match self {
            Self::Callback(callback) => callback(data),
            Self::Reply(tx) => {
                let _ = tx.send(Ok(data));
            }
        }
    }

    /// Report a failure. Callbacks are dropped without being invoked.
    pub fn fail(self, error: ClientError) {
        if let Self::Reply(tx) = self {
            let _ = tx.send(Err(error));
        }
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Callback(_) => f.write_str("Responder::Callback"),
            Self::Reply(_) => f.write_str("Responder::Reply"),
        }
    }
}

struct Pending {
    event: String,
    responder: Responder,
    issued_at: Instant,
    timeout: Option<Duration>,
}

/// Pending-request table. Owned by the connection manager.
#[derive(Default)]
pub struct RequestCorrelator {
    pending: HashMap<ResponseId, Pending>,
}

impl RequestCorrelator {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// A response id for `event` that no pending request uses.
    pub fn next_response_id(&self, event: &str) -> ResponseId {
        loop {
            let id = ResponseId::generate(event);
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }

    /// Register a request under `id`.
    pub fn register(
        &mut self,
        id: ResponseId,
        event: &str,
        responder: Responder,
        timeout: Option<Duration>,
    ) {
        let _ = self.pending.insert(
            id,
            Pending {
                event: event.to_owned(),
                responder,
                issued_at: Instant::now(),
                timeout,
            },
        );
    }

    /// Whether a request is waiting on the channel named `event`.
    pub fn is_pending(&self, event: &str) -> bool {
        self.pending.contains_key(&ResponseId::from_raw(event))
    }

    /// Deliver `data` to the request waiting on `event`. Returns `false` when
    /// nothing was waiting.
    pub fn resolve(&mut self, event: &str, data: Value) -> bool {
        match self.pending.remove(&ResponseId::from_raw(event)) {
            Some(pending) => {
                tracing::debug!(
                    event = %pending.event,
                    elapsed_ms = pending.issued_at.elapsed().as_millis(),
                    "request resolved"
                );
                pending.responder.respond(data);
                true
            }
            None => false,
        }
    }

    /// Remove a request whose timeout elapsed, failing it with
    /// [`ClientError::Timeout`]. Returns the request's event name when it was
    /// still pending.
    pub fn expire(&mut self, id: &ResponseId) -> Option<String> {
        let pending = self.pending.remove(id)?;
        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = pending.timeout.unwrap_or_default().as_millis() as u64;
        pending.responder.fail(ClientError::Timeout {
            event: pending.event.clone(),
            timeout_ms,
        });
        Some(pending.event)
    }

    /// Drop every pending request, failing awaiting callers with
    /// [`ClientError::Shutdown`].
    pub fn clear(&mut self) -> usize {
        let n = self.pending.len();
        for (_, pending) in self.pending.drain() {
            pending.responder.fail(ClientError::Shutdown);
        }
        n
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl fmt::Debug for RequestCorrelator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestCorrelator")
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Check an event name.
pub fn validate_event(event: &str) -> Result<(), ClientError> {
    if event.is_empty() {
        return Err(ClientError::InvalidArguments(
            "event name must be a non-empty string".into(),
        ));
    }
    Ok(())
}

/// Check request arguments. Absent params become `{}`; anything other than
/// a JSON object is rejected.
pub fn validate_request(event: &str, params: Option<Value>) -> Result<Value, ClientError> {
    validate_event(event)?;
    match params {
        None => Ok(Value::Object(Map::new())),
        Some(params @ Value::Object(_)) => Ok(params),
        Some(other) => Err(ClientError::InvalidArguments(format!(
            "request params must be an object, got {}",
            json_type(&other)
        ))),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<Value>>>, Responder) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (
            seen,
            Responder::Callback(Box::new(move |v| sink.lock().push(v))),
        )
    }

    #[tokio::test]
    async fn resolve_fires_once() {
        let mut c = RequestCorrelator::new();
        let id = c.next_response_id("ping");
        let (seen, responder) = recorder();
        c.register(id.clone(), "ping", responder, None);

        assert!(c.is_pending(id.as_str()));
        assert!(c.resolve(id.as_str(), json!({"pong": true})));
        assert!(!c.resolve(id.as_str(), json!({"pong": true})));
        assert_eq!(*seen.lock(), vec![json!({"pong": true})]);
        assert!(c.is_empty());
    }

    #[tokio::test]
    async fn matching_is_exact() {
        let mut c = RequestCorrelator::new();
        let id = c.next_response_id("ping");
        let (seen, responder) = recorder();
        c.register(id.clone(), "ping", responder, None);

        let prefix = &id.as_str()[..id.as_str().len() - 1];
        assert!(!c.resolve(prefix, json!(1)));
        assert!(!c.resolve(&format!("{id}x"), json!(1)));
        assert!(!c.resolve("ping", json!(1)));
        assert!(seen.lock().is_empty());
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn expire_fails_reply_with_timeout() {
        let mut c = RequestCorrelator::new();
        let id = c.next_response_id("slow");
        let (tx, rx) = oneshot::channel();
        c.register(
            id.clone(),
            "slow",
            Responder::Reply(tx),
            Some(Duration::from_millis(250)),
        );

        assert_eq!(c.expire(&id).as_deref(), Some("slow"));
        assert_eq!(c.expire(&id), None);
        assert!(!c.resolve(id.as_str(), json!(null)));
        assert_matches!(
            rx.await.unwrap(),
            Err(ClientError::Timeout { timeout_ms: 250, .. })
        );
    }

    #[tokio::test]
    async fn expire_drops_callback_uninvoked() {
        let mut c = RequestCorrelator::new();
        let id = c.next_response_id("slow");
        let (seen, responder) = recorder();
        c.register(id.clone(), "slow", responder, Some(Duration::from_secs(1)));
        assert!(c.expire(&id).is_some());
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn clear_fails_everything() {
        let mut c = RequestCorrelator::new();
        let (tx, rx) = oneshot::channel();
        let id = c.next_response_id("e");
        c.register(id, "e", Responder::Reply(tx), None);
        for _ in 0..2 {
            let id = c.next_response_id("e");
            c.register(id, "e", Responder::Callback(Box::new(|_| {})), None);
        }
        assert_eq!(c.clear(), 3);
        assert!(c.is_empty());
        assert_matches!(rx.await.unwrap(), Err(ClientError::Shutdown));
    }

    #[test]
    fn response_ids_are_distinct() {
        let c = RequestCorrelator::new();
        let a = c.next_response_id("ping");
        let b = c.next_response_id("ping");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("@response-ping-"));
    }

    #[test]
    fn validate_defaults_params_to_object() {
        assert_eq!(validate_request("ping", None).unwrap(), json!({}));
        assert_eq!(
            validate_request("ping", Some(json!({"x": 1}))).unwrap(),
            json!({"x": 1})
        );
    }

    #[test]
    fn validate_rejects_non_object_params() {
        for bad in [json!(1), json!("s"), json!([1]), json!(null), json!(true)] {
            assert_matches!(
                validate_request("ping", Some(bad)),
                Err(ClientError::InvalidArguments(_))
            );
        }
    }

    #[test]
    fn validate_rejects_empty_event() {
        assert_matches!(
            validate_request("", None),
            Err(ClientError::InvalidArguments(_))
        );
        assert!(validate_event("").is_err());
        assert!(validate_event("chat").is_ok());
    }
}
