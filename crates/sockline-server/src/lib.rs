//! # sockline-server
//!
//! Connection-acceptance shim for sockline peers.
//!
//! [`serve`] accepts TCP connections, performs the WebSocket upgrade and
//! hands every connection to a callback. It carries no protocol logic of its
//! own; [`ServerConnection`] only knows how to read envelopes and write
//! `send` envelopes back. [`serve_echo`] answers every request with its own
//! params, which is handy for trying a client out.

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;

use std::future::Future;
use std::sync::Arc;

use tokio::net::{TcpListener, ToSocketAddrs};
use tracing::{debug, info, warn};

pub use connection::{ConnectionId, ConnectionSender, ServerConnection};
pub use errors::{Result, ServerError};

/// Default listen address.
pub const DEFAULT_ADDR: &str = "127.0.0.1:4000";

/// Bind a listener.
pub async fn bind(addr: impl ToSocketAddrs) -> Result<TcpListener> {
    Ok(TcpListener::bind(addr).await?)
}

/// Accept connections forever, calling `on_connection` for each upgraded
/// one on its own task. Failed handshakes are logged and skipped.
pub async fn serve<F, Fut>(listener: TcpListener, on_connection: F) -> Result<()>
where
    F: Fn(ServerConnection) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let on_connection = Arc::new(on_connection);
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "accepting websocket connections");
    }
    loop {
        let (stream, peer) = listener.accept().await?;
        let handler = Arc::clone(&on_connection);
        drop(tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => {
                    let conn = ServerConnection::new(ws, peer);
                    let id = conn.id().clone();
                    info!(conn = %id, %peer, "connection accepted");
                    handler(conn).await;
                    debug!(conn = %id, "connection handler finished");
                }
                Err(e) => warn!(%peer, error = %e, "websocket handshake failed"),
            }
        }));
    }
}

/// Serve a responder that answers each request with its params.
pub async fn serve_echo(listener: TcpListener) -> Result<()> {
    serve(listener, |mut conn| async move {
        while let Some(message) = conn.recv().await {
            let Some(response_id) = message.response_id else {
                debug!(conn = %conn.id(), event = %message.event, "ignoring send");
                continue;
            };
            if conn.respond(&response_id, message.data).is_err() {
                break;
            }
        }
    })
    .await
}
