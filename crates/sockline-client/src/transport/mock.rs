//! In-memory transport for tests.
//!
//! Every socket the client creates is recorded; tests drive it by hand
//! ([`MockSocket::accept`], [`MockSocket::deliver`], [`MockSocket::drop_connection`])
//! and inspect what the client wrote ([`MockSocket::sent`]).
//!
//! A requested close completes immediately with code 1000, the way a
//! well-behaved server answers a close frame.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use sockline_settings::TransportOptions;

use super::{EventSink, NORMAL_CLOSE, ReadyState, Socket, TransportFactory};
use crate::errors::TransportError;

/// Recording transport factory.
#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Debug, Default)]
struct MockState {
    sockets: Vec<MockSocket>,
    refuse_next: usize,
    attempts: usize,
}

impl MockTransport {
    /// Empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` constructions fail.
    pub fn refuse_next(&self, n: usize) {
        self.inner.lock().refuse_next = n;
    }

    /// Construction attempts so far, including refused ones.
    pub fn attempts(&self) -> usize {
        self.inner.lock().attempts
    }

    /// Sockets successfully created so far.
    pub fn socket_count(&self) -> usize {
        self.inner.lock().sockets.len()
    }

    /// Socket by creation order.
    pub fn socket(&self, index: usize) -> Option<MockSocket> {
        self.inner.lock().sockets.get(index).cloned()
    }

    /// Most recently created socket.
    pub fn last_socket(&self) -> Option<MockSocket> {
        self.inner.lock().sockets.last().cloned()
    }
}

impl TransportFactory for MockTransport {
    fn connect(
        &self,
        url: &str,
        options: &TransportOptions,
        events: EventSink,
    ) -> Result<Box<dyn Socket>, TransportError> {
        let mut state = self.inner.lock();
        state.attempts += 1;
        if state.refuse_next > 0 {
            state.refuse_next -= 1;
            return Err(TransportError::Refused(format!("mock refused {url}")));
        }
        let socket = MockSocket {
            shared: Arc::new(Shared {
                url: url.to_owned(),
                options: options.clone(),
                events,
                ready: Mutex::new(ReadyState::Connecting),
                sent: Mutex::new(Vec::new()),
                close_calls: Mutex::new(0),
            }),
        };
        state.sockets.push(socket.clone());
        Ok(Box::new(socket))
    }
}

/// Test-side handle to one mock socket.
#[derive(Clone, Debug)]
pub struct MockSocket {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    url: String,
    options: TransportOptions,
    events: EventSink,
    ready: Mutex<ReadyState>,
    sent: Mutex<Vec<String>>,
    close_calls: Mutex<usize>,
}

impl MockSocket {
    /// URL the socket was created for.
    pub fn url(&self) -> &str {
        &self.shared.url
    }

    /// Options the socket was created with.
    pub fn options(&self) -> &TransportOptions {
        &self.shared.options
    }

    /// Generation the client assigned.
    pub fn generation(&self) -> u64 {
        self.shared.events.generation()
    }

    /// Current ready state.
    pub fn state(&self) -> ReadyState {
        *self.shared.ready.lock()
    }

    /// Frames written by the client.
    pub fn sent(&self) -> Vec<String> {
        self.shared.sent.lock().clone()
    }

    /// Frames written by the client, parsed as JSON.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    /// How many times the client called `close`.
    pub fn close_calls(&self) -> usize {
        *self.shared.close_calls.lock()
    }

    /// Complete the handshake.
    pub fn accept(&self) {
        *self.shared.ready.lock() = ReadyState::Open;
        let _ = self.shared.events.opened();
    }

    /// Deliver an incoming text frame.
    pub fn deliver(&self, text: impl Into<String>) {
        let _ = self.shared.events.message(text);
    }

    /// Deliver a JSON value as an incoming frame.
    pub fn deliver_json(&self, value: &Value) {
        self.deliver(value.to_string());
    }

    /// Report a transport error.
    pub fn fail(&self, message: impl Into<String>) {
        let _ = self.shared.events.error(message);
    }

    /// Drop the connection from the remote side.
    pub fn drop_connection(&self, code: u16, reason: impl Into<String>) {
        *self.shared.ready.lock() = ReadyState::Closed;
        let _ = self.shared.events.closed(code, reason);
    }
}

impl Socket for MockSocket {
    fn ready_state(&self) -> ReadyState {
        self.state()
    }

    fn send(&self, text: String) -> Result<(), TransportError> {
        if self.state() != ReadyState::Open {
            return Err(TransportError::NotOpen);
        }
        self.shared.sent.lock().push(text);
        Ok(())
    }

    fn close(&self) {
        *self.shared.close_calls.lock() += 1;
        let mut ready = self.shared.ready.lock();
        if *ready != ReadyState::Closed {
            *ready = ReadyState::Closed;
            drop(ready);
            let _ = self.shared.events.closed(NORMAL_CLOSE, "");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::Input;
    use crate::transport::TransportEvent;
    use tokio::sync::mpsc;

    fn sink() -> (EventSink, mpsc::UnboundedReceiver<Input>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventSink::new(1, tx), rx)
    }

    fn next_event(rx: &mut mpsc::UnboundedReceiver<Input>) -> TransportEvent {
        match rx.try_recv().unwrap() {
            Input::Transport { event, .. } => event,
            Input::Command(_) | Input::Expire(_) => panic!("expected transport input"),
        }
    }

    #[test]
    fn records_sockets_and_refusals() {
        let transport = MockTransport::new();
        transport.refuse_next(1);
        let (events, _rx) = sink();
        assert!(
            transport
                .connect("ws://a", &TransportOptions::default(), events.clone())
                .is_err()
        );
        assert!(
            transport
                .connect("ws://a", &TransportOptions::default(), events)
                .is_ok()
        );
        assert_eq!(transport.attempts(), 2);
        assert_eq!(transport.socket_count(), 1);
        assert_eq!(transport.last_socket().unwrap().url(), "ws://a");
    }

    #[test]
    fn send_requires_open() {
        let transport = MockTransport::new();
        let (events, mut rx) = sink();
        let socket = transport
            .connect("ws://a", &TransportOptions::default(), events)
            .unwrap();
        assert_eq!(socket.send("x".into()), Err(TransportError::NotOpen));

        let handle = transport.last_socket().unwrap();
        handle.accept();
        assert_eq!(next_event(&mut rx), TransportEvent::Open);
        socket.send("x".into()).unwrap();
        assert_eq!(handle.sent(), vec!["x".to_string()]);
    }

    #[test]
    fn close_reports_normal_close_once() {
        let transport = MockTransport::new();
        let (events, mut rx) = sink();
        let socket = transport
            .connect("ws://a", &TransportOptions::default(), events)
            .unwrap();
        socket.close();
        socket.close();
        assert_eq!(
            next_event(&mut rx),
            TransportEvent::Closed {
                code: NORMAL_CLOSE,
                reason: String::new()
            }
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(transport.last_socket().unwrap().close_calls(), 2);
    }
}
