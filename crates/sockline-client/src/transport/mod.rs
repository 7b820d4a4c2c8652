//! Transport abstraction.
//!
//! A [`TransportFactory`] turns a URL plus [`TransportOptions`] into a
//! [`Socket`]. Construction is synchronous and only fails for requests that
//! can never succeed (bad URL, bad header); everything that happens on the
//! wire afterwards is reported through the [`EventSink`] handed to the
//! factory, as [`TransportEvent`]s.
//!
//! Each sink is stamped with the generation of the socket it belongs to, so
//! the manager can discard events from sockets it has already replaced.

pub mod mock;
pub mod websocket;

use std::fmt;

use sockline_settings::TransportOptions;
use tokio::sync::mpsc;

use crate::errors::TransportError;
use crate::manager::Input;

pub use mock::{MockSocket, MockTransport};
pub use websocket::WebSocketTransport;

/// Close code for a connection that dropped without a close frame.
pub const ABNORMAL_CLOSE: u16 = 1006;
/// Close code for a close frame that carried no status.
pub const NO_STATUS: u16 = 1005;
/// Close code for a normal close.
pub const NORMAL_CLOSE: u16 = 1000;

/// Socket ready state, mirroring the browser `WebSocket.readyState` values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ReadyState {
    /// Handshake in progress.
    Connecting = 0,
    /// Frames can be written.
    Open = 1,
    /// A close was requested.
    Closing = 2,
    /// Gone.
    Closed = 3,
}

impl ReadyState {
    /// Decode the `repr(u8)` value; unknown values read as `Closed`.
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Lifecycle events a socket reports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established.
    Open,
    /// Something went wrong; a `Closed` usually follows.
    Error(String),
    /// A text frame arrived.
    Message(String),
    /// The connection is gone.
    Closed {
        /// WebSocket close code.
        code: u16,
        /// Close reason text.
        reason: String,
    },
}

/// A live socket owned by the connection manager.
pub trait Socket: Send {
    /// Current ready state.
    fn ready_state(&self) -> ReadyState;

    /// Queue a text frame.
    fn send(&self, text: String) -> Result<(), TransportError>;

    /// Start a normal close. The transport reports `Closed` when done.
    fn close(&self);
}

/// Constructs sockets.
pub trait TransportFactory: Send + Sync {
    /// Create a socket for `url`, reporting its lifecycle through `events`.
    fn connect(
        &self,
        url: &str,
        options: &TransportOptions,
        events: EventSink,
    ) -> Result<Box<dyn Socket>, TransportError>;
}

/// Delivers a socket's events into the manager inbox.
#[derive(Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<Input>,
}

impl EventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<Input>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the socket this sink belongs to.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Forward an event. Returns `false` once the client has shut down.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(Input::Transport {
                generation: self.generation,
                event,
            })
            .is_ok()
    }

    /// Report the connection open.
    pub fn opened(&self) -> bool {
        self.emit(TransportEvent::Open)
    }

    /// Report an error.
    pub fn error(&self, message: impl Into<String>) -> bool {
        self.emit(TransportEvent::Error(message.into()))
    }

    /// Report an incoming text frame.
    pub fn message(&self, text: impl Into<String>) -> bool {
        self.emit(TransportEvent::Message(text.into()))
    }

    /// Report the connection closed.
    pub fn closed(&self, code: u16, reason: impl Into<String>) -> bool {
        self.emit(TransportEvent::Closed {
            code,
            reason: reason.into(),
        })
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}
