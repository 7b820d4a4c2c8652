//! # sockline-core
//!
//! Protocol vocabulary shared by the sockline client, server shim and CLI.
//!
//! - **Envelope**: the JSON frame exchanged over the socket
//!   (`{ event, data, type, response_id? }`)
//! - **Codec**: outgoing envelope construction with mapper hooks, incoming
//!   frame validation with typed rejection reasons
//! - **Event bus**: named listener registry with handle-based removal and
//!   snapshot fan-out
//! - **Response ids**: `@response-<event>-<unique>` channel names

#![deny(unsafe_code)]

pub mod bus;
pub mod codec;
pub mod envelope;
pub mod errors;
pub mod ids;

pub use bus::{EventBus, Listener, ListenerHandle, ListenerId};
pub use codec::{Mapper, MessageCodec};
pub use envelope::{Envelope, EnvelopeKind, IncomingMessage};
pub use errors::CodecError;
pub use ids::{RESPONSE_PREFIX, ResponseId, unique_id};

/// Emitted after the transport reports an open connection.
pub const CONNECT: &str = "connect";
/// Emitted for every close of the underlying socket.
pub const DISCONNECT: &str = "disconnect";
/// Emitted when a scheduled reconnect attempt fires.
pub const RECONNECTING: &str = "reconnecting";
/// Emitted on transport errors.
pub const ERROR: &str = "error";
