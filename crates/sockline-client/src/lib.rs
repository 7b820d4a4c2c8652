//! # sockline-client
//!
//! A resilient client for one WebSocket connection carrying JSON envelopes.
//!
//! - **Lifecycle**: explicit `open` / `close`, optional fixed-interval
//!   reconnect after a connection is lost
//! - **Events**: named listeners multiplexed over the connection, plus the
//!   built-in `connect`, `disconnect`, `reconnecting` and `error`
//! - **Requests**: one-shot request/response pairing over per-request
//!   response channels, as callbacks or awaited with [`Client::call`]
//!
//! The socket is created through a [`TransportFactory`]; the default is
//! [`WebSocketTransport`] and [`MockTransport`] drives the client in tests.

#![deny(unsafe_code)]

#[macro_use]
mod macros;

pub mod client;
pub mod correlator;
pub mod errors;
mod manager;
pub mod state;
pub mod transport;

pub use client::{Client, ClientBuilder, WeakClient};
pub use correlator::{RequestCorrelator, Responder, ResponseCallback};
pub use errors::{ClientError, TransportError};
pub use state::{ConnectionState, Effect, Transition, Trigger};
pub use transport::{
    EventSink, MockSocket, MockTransport, ReadyState, Socket, TransportEvent, TransportFactory,
    WebSocketTransport,
};

pub use sockline_core::{CONNECT, DISCONNECT, ERROR, ListenerHandle, RECONNECTING};
pub use sockline_settings::{AutoReconnect, ClientSettings, TransportOptions};
