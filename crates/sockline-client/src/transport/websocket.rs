//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each socket is one spawned task that performs the handshake, then pumps
//! queued frames out and incoming frames into the [`EventSink`]. The
//! [`Socket`] handle talks to the task through an unbounded channel;
//! dropping the handle closes the connection without reporting anything.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use sockline_settings::TransportOptions;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;

use super::{ABNORMAL_CLOSE, EventSink, NO_STATUS, ReadyState, Socket, TransportFactory};
use crate::errors::TransportError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// The default transport.
#[derive(Clone, Copy, Debug, Default)]
pub struct WebSocketTransport;

impl TransportFactory for WebSocketTransport {
    fn connect(
        &self,
        url: &str,
        options: &TransportOptions,
        events: EventSink,
    ) -> Result<Box<dyn Socket>, TransportError> {
        let request = build_request(url, options)?;
        let ready = Arc::new(AtomicU8::new(ReadyState::Connecting as u8));
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();

        drop(tokio::spawn(run_socket(
            request,
            options.connect_timeout(),
            Arc::clone(&ready),
            outgoing_rx,
            events,
        )));

        Ok(Box::new(WebSocket {
            ready,
            outgoing: outgoing_tx,
        }))
    }
}

/// Build the upgrade request: URL, extra headers and subprotocols.
pub fn build_request(url: &str, options: &TransportOptions) -> Result<Request, TransportError> {
    let invalid = |reason: String| TransportError::InvalidUrl {
        url: url.to_owned(),
        reason,
    };

    let mut request = url
        .into_client_request()
        .map_err(|e| invalid(e.to_string()))?;
    match request.uri().scheme_str() {
        Some("ws" | "wss") => {}
        other => {
            return Err(invalid(format!(
                "unsupported scheme '{}'",
                other.unwrap_or_default()
            )));
        }
    }
    if request.uri().host().is_none_or(str::is_empty) {
        return Err(invalid("missing host".into()));
    }

    let headers = request.headers_mut();
    for (name, value) in &options.headers {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidOption(format!("header name '{name}': {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidOption(format!("header '{name}': {e}")))?;
        let _ = headers.insert(header, value);
    }
    if !options.protocols.is_empty() {
        let value = HeaderValue::from_str(&options.protocols.join(", "))
            .map_err(|e| TransportError::InvalidOption(format!("protocols: {e}")))?;
        let _ = headers.insert(SEC_WEBSOCKET_PROTOCOL, value);
    }
    Ok(request)
}

enum Outgoing {
    Text(String),
    Close,
}

struct WebSocket {
    ready: Arc<AtomicU8>,
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl Socket for WebSocket {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready.load(Ordering::Acquire))
    }

    fn send(&self, text: String) -> Result<(), TransportError> {
        if self.ready_state() != ReadyState::Open {
            return Err(TransportError::NotOpen);
        }
        self.outgoing
            .send(Outgoing::Text(text))
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        if matches!(
            self.ready_state(),
            ReadyState::Connecting | ReadyState::Open
        ) {
            set_ready(&self.ready, ReadyState::Closing);
        }
        let _ = self.outgoing.send(Outgoing::Close);
    }
}

fn set_ready(ready: &AtomicU8, state: ReadyState) {
    ready.store(state as u8, Ordering::Release);
}

async fn connect(request: Request, limit: Option<Duration>) -> Result<WsStream, String> {
    let attempt = connect_async(request);
    let result = match limit {
        Some(limit) => tokio::time::timeout(limit, attempt)
            .await
            .map_err(|_| format!("connect timed out after {}ms", limit.as_millis()))?,
        None => attempt.await,
    };
    result.map(|(ws, _response)| ws).map_err(|e| e.to_string())
}

/// Resolves when the owner asks to close or drops its handle.
async fn close_requested(outgoing: &mut mpsc::UnboundedReceiver<Outgoing>) {
    while let Some(message) = outgoing.recv().await {
        if matches!(message, Outgoing::Close) {
            return;
        }
    }
}

async fn run_socket(
    request: Request,
    connect_timeout: Option<Duration>,
    ready: Arc<AtomicU8>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: EventSink,
) {
    let generation = events.generation();
    let ws = tokio::select! {
        result = connect(request, connect_timeout) => match result {
            Ok(ws) => ws,
            Err(message) => {
                debug!(generation, error = %message, "websocket connect failed");
                set_ready(&ready, ReadyState::Closed);
                let _ = events.error(message);
                let _ = events.closed(ABNORMAL_CLOSE, "");
                return;
            }
        },
        () = close_requested(&mut outgoing) => {
            set_ready(&ready, ReadyState::Closed);
            let _ = events.closed(ABNORMAL_CLOSE, "closed before the connection was established");
            return;
        }
    };

    set_ready(&ready, ReadyState::Open);
    let _ = events.opened();

    let (mut ws_tx, mut ws_rx) = ws.split();
    let mut code = ABNORMAL_CLOSE;
    let mut reason = String::new();
    let mut closing = false;

    loop {
        tokio::select! {
            out = outgoing.recv(), if !closing => match out {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        let _ = events.error(e.to_string());
                    }
                }
                Some(Outgoing::Close) => {
                    closing = true;
                    set_ready(&ready, ReadyState::Closing);
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: String::new().into(),
                    };
                    if ws_tx.send(Message::Close(Some(frame))).await.is_err() {
                        break;
                    }
                }
                None => {
                    // Handle dropped: the socket was superseded.
                    let _ = ws_tx.close().await;
                    set_ready(&ready, ReadyState::Closed);
                    debug!(generation, "websocket handle dropped, connection closed");
                    return;
                }
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.message(text.to_string());
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(frame) = frame {
                        code = u16::from(frame.code);
                        reason = frame.reason.to_string();
                    } else {
                        code = NO_STATUS;
                    }
                    let _ = ws_tx.close().await;
                    break;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    debug!(generation, len = bytes.len(), "ignoring binary frame");
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = events.error(e.to_string());
                    break;
                }
                None => break,
            }
        }
    }

    set_ready(&ready, ReadyState::Closed);
    debug!(generation, code, "websocket closed");
    let _ = events.closed(code, reason);
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn request_for_plain_url() {
        let request = build_request("ws://127.0.0.1:4000/", &TransportOptions::default()).unwrap();
        assert_eq!(request.uri().host(), Some("127.0.0.1"));
        assert!(request.headers().get(SEC_WEBSOCKET_PROTOCOL).is_none());
    }

    #[test]
    fn request_carries_headers_and_protocols() {
        let mut options = TransportOptions::default();
        let _ = options
            .headers
            .insert("Authorization".into(), "Bearer abc".into());
        options.protocols = vec!["chat".into(), "json".into()];

        let request = build_request("wss://example.test/socket", &options).unwrap();
        assert_eq!(request.headers()["authorization"], "Bearer abc");
        assert_eq!(request.headers()[SEC_WEBSOCKET_PROTOCOL], "chat, json");
    }

    #[test]
    fn rejects_non_websocket_scheme() {
        let err = build_request("http://example.test", &TransportOptions::default()).unwrap_err();
        assert_matches!(err, TransportError::InvalidUrl { reason, .. } if reason.contains("scheme"));
    }

    #[test]
    fn rejects_garbage_url() {
        assert_matches!(
            build_request("not a url", &TransportOptions::default()),
            Err(TransportError::InvalidUrl { .. })
        );
    }

    #[test]
    fn rejects_bad_header_name() {
        let mut options = TransportOptions::default();
        let _ = options.headers.insert("bad header".into(), "x".into());
        assert_matches!(
            build_request("ws://localhost:1", &options),
            Err(TransportError::InvalidOption(_))
        );
    }
}
