//! One accepted WebSocket connection.
//!
//! Writes go through an unbounded channel to a writer task that owns the
//! sink half, so any number of [`ConnectionSender`] clones can push frames
//! while the owner awaits [`ServerConnection::recv`].

use std::fmt;
use std::net::SocketAddr;

use futures::stream::SplitStream;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use sockline_core::{Envelope, IncomingMessage, MessageCodec};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{Result, ServerError};

/// Unique connection identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Fresh time-ordered id.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

enum Outbound {
    Text(String),
    Close,
}

/// Cloneable write half of a connection.
#[derive(Clone)]
pub struct ConnectionSender {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ConnectionSender {
    /// Emit `event` to the client as a `send` envelope.
    pub fn send(&self, event: &str, data: Value) -> Result<()> {
        let text = serde_json::to_string(&Envelope::send(event, data))?;
        self.send_text(text)
    }

    /// Answer a request: emit its `response_id` as the event name.
    pub fn respond(&self, response_id: &str, data: Value) -> Result<()> {
        self.send(response_id, data)
    }

    /// Write a raw text frame.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.tx
            .send(Outbound::Text(text.into()))
            .map_err(|_| ServerError::ConnectionClosed(self.id.to_string()))
    }

    /// Start a normal close.
    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    /// Connection this sender writes to.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }
}

/// An accepted connection, handed to the `serve` callback.
pub struct ServerConnection {
    id: ConnectionId,
    peer: SocketAddr,
    sender: ConnectionSender,
    stream: SplitStream<WebSocketStream<TcpStream>>,
}

impl ServerConnection {
    /// Wrap an upgraded stream and start its writer task.
    pub fn new(ws: WebSocketStream<TcpStream>, peer: SocketAddr) -> Self {
        let id = ConnectionId::new();
        let (sink, stream) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(tokio::spawn(write_loop(id.clone(), sink, rx)));
        Self {
            sender: ConnectionSender { id: id.clone(), tx },
            id,
            peer,
            stream,
        }
    }

    /// Connection id.
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Remote address.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// A write handle that can outlive borrows of this connection.
    pub fn sender(&self) -> ConnectionSender {
        self.sender.clone()
    }

    /// Next envelope from the client. Frames that are not valid envelopes
    /// are skipped. `None` once the client has gone.
    pub async fn recv(&mut self) -> Option<IncomingMessage> {
        while let Some(frame) = self.stream.next().await {
            match frame {
                Ok(Message::Text(text)) => match MessageCodec::parse(&text) {
                    Ok(message) => return Some(message),
                    Err(e) => {
                        debug!(conn = %self.id, reason = e.reason(), "skipping frame");
                    }
                },
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => {
                    warn!(conn = %self.id, error = %e, "read failed");
                    return None;
                }
            }
        }
        None
    }

    /// Emit `event` to the client.
    pub fn send(&self, event: &str, data: Value) -> Result<()> {
        self.sender.send(event, data)
    }

    /// Answer a request.
    pub fn respond(&self, response_id: &str, data: Value) -> Result<()> {
        self.sender.respond(response_id, data)
    }

    /// Start a normal close.
    pub fn close(&self) {
        self.sender.close();
    }
}

impl fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConnection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

async fn write_loop(
    id: ConnectionId,
    mut sink: futures::stream::SplitSink<WebSocketStream<TcpStream>, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(outbound) = rx.recv().await {
        match outbound {
            Outbound::Text(text) => {
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    debug!(conn = %id, error = %e, "write failed, stopping writer");
                    break;
                }
            }
            Outbound::Close => {
                let _ = sink.close().await;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_ids_are_prefixed_and_unique() {
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        assert!(a.as_str().starts_with("conn_"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn sender_writes_send_envelopes() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sender = ConnectionSender {
            id: ConnectionId::new(),
            tx,
        };
        sender.send("chat", serde_json::json!({"text": "hi"})).unwrap();
        sender.respond("@response-ping-1", serde_json::json!(1)).unwrap();

        let Some(Outbound::Text(first)) = rx.recv().await else {
            panic!("expected text frame");
        };
        let first: Value = serde_json::from_str(&first).unwrap();
        assert_eq!(first["event"], "chat");
        assert_eq!(first["type"], "send");

        let Some(Outbound::Text(second)) = rx.recv().await else {
            panic!("expected text frame");
        };
        let second: Value = serde_json::from_str(&second).unwrap();
        assert_eq!(second["event"], "@response-ping-1");
        assert_eq!(second["data"], 1);
    }

    #[tokio::test]
    async fn sender_reports_closed_connection() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = ConnectionSender {
            id: ConnectionId::new(),
            tx,
        };
        drop(rx);
        assert!(matches!(
            sender.send_text("x"),
            Err(ServerError::ConnectionClosed(_))
        ));
    }
}
