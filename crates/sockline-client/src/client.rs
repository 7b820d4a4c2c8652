//! Public client handle.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde_json::Value;
use sockline_core::{EventBus, ListenerHandle, MessageCodec};
use sockline_settings::ClientSettings;
use tokio::sync::{mpsc, oneshot};

use crate::correlator::{Responder, validate_event, validate_request};
use crate::errors::ClientError;
use crate::manager::{Command, ConnectionManager, Input};
use crate::state::ConnectionState;
use crate::transport::{TransportFactory, WebSocketTransport};

/// Configures and starts a [`Client`].
pub struct ClientBuilder {
    settings: ClientSettings,
    transport: Arc<dyn TransportFactory>,
    codec: MessageCodec,
}

impl ClientBuilder {
    /// Builder with the WebSocket transport and identity mappers.
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            transport: Arc::new(WebSocketTransport),
            codec: MessageCodec::new(),
        }
    }

    /// Replace the transport factory.
    #[must_use]
    pub fn transport<T>(mut self, transport: T) -> Self
    where
        T: TransportFactory + 'static,
    {
        self.transport = Arc::new(transport);
        self
    }

    /// Transform applied to every `send` envelope before it is written.
    #[must_use]
    pub fn send_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.codec = self.codec.with_send_mapper(Arc::new(mapper));
        self
    }

    /// Transform applied to every `request` envelope before it is written.
    #[must_use]
    pub fn request_mapper<F>(mut self, mapper: F) -> Self
    where
        F: Fn(Value) -> Value + Send + Sync + 'static,
    {
        self.codec = self.codec.with_request_mapper(Arc::new(mapper));
        self
    }

    /// Validate the settings and start the connection actor.
    ///
    /// Must be called from within a Tokio runtime. The client does not
    /// connect until [`Client::open`] is called.
    pub fn build(self) -> Result<Client, ClientError> {
        self.settings.validate()?;
        let diagnostics = self.settings.should_console_log;
        let request_timeout = self.settings.request_timeout();
        let bus = Arc::new(EventBus::new());
        let tx = ConnectionManager::spawn(
            self.settings,
            self.transport,
            self.codec,
            Arc::clone(&bus),
        );
        Ok(Client {
            inner: Arc::new(Inner {
                tx,
                bus,
                diagnostics,
                request_timeout,
            }),
        })
    }
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("settings", &self.settings)
            .field("codec", &self.codec)
            .finish_non_exhaustive()
    }
}

/// Handle to one resilient socket connection.
///
/// Cheap to clone; all clones drive the same connection. When the last
/// clone is dropped the connection actor shuts down and closes the socket.
///
/// Listeners and request callbacks are owned by the connection, so one that
/// holds a `Client` keeps it alive forever. Capture a [`WeakClient`] from
/// [`Client::downgrade`] instead.
///
/// None of the operations block on the network. Sends and requests made
/// while the connection is not open are dropped (and logged when
/// diagnostics are on); arguments that can never be valid are rejected with
/// [`ClientError::InvalidArguments`] before anything happens.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

struct Inner {
    tx: mpsc::UnboundedSender<Input>,
    bus: Arc<EventBus>,
    diagnostics: bool,
    request_timeout: Option<Duration>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let _ = self.tx.send(Input::Command(Command::Shutdown(None)));
    }
}

impl Client {
    /// Client over the WebSocket transport. See [`ClientBuilder::build`].
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        ClientBuilder::new(settings).build()
    }

    /// Start configuring a client.
    pub fn builder(settings: ClientSettings) -> ClientBuilder {
        ClientBuilder::new(settings)
    }

    /// Handle that does not keep the connection alive. Use it inside
    /// listeners and request callbacks.
    pub fn downgrade(&self) -> WeakClient {
        WeakClient {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Connect. No-op while connecting or connected; cancels a pending
    /// reconnect.
    pub fn open(&self) {
        let _ = self.command(Command::Open);
    }

    /// Close deliberately. Never followed by an automatic reconnect.
    pub fn close(&self) {
        let _ = self.command(Command::Close);
    }

    /// Fire-and-forget `send` envelope.
    pub fn send(&self, event: &str, data: Value) -> Result<(), ClientError> {
        self.validated(validate_event(event))?;
        self.command(Command::Send {
            event: event.to_owned(),
            data,
            response_id: None,
        })
    }

    /// Write a `request` envelope with a caller-chosen response id, without
    /// waiting for the response. Useful for answering on a channel the
    /// caller already listens to.
    pub fn send_with_response_id(
        &self,
        event: &str,
        data: Value,
        response_id: &str,
    ) -> Result<(), ClientError> {
        self.validated(validate_event(event))?;
        if response_id.is_empty() {
            return self.validated(Err(ClientError::InvalidArguments(
                "response_id must be a non-empty string".into(),
            )));
        }
        self.command(Command::Send {
            event: event.to_owned(),
            data,
            response_id: Some(response_id.to_owned()),
        })
    }

    /// Send a request; `callback` runs once with the response data.
    ///
    /// `params` must be a JSON object when given (absent means `{}`). Uses
    /// the `request_timeout_ms` setting, if any; a request that times out is
    /// forgotten and its callback never runs.
    pub fn request<F>(
        &self,
        event: &str,
        params: Option<Value>,
        callback: F,
    ) -> Result<(), ClientError>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        self.enqueue_request(
            event,
            params,
            Responder::Callback(Box::new(callback)),
            self.inner.request_timeout,
        )
    }

    /// [`request`](Self::request) with an explicit timeout.
    pub fn request_with_timeout<F>(
        &self,
        event: &str,
        params: Option<Value>,
        timeout: Duration,
        callback: F,
    ) -> Result<(), ClientError>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        self.enqueue_request(
            event,
            params,
            Responder::Callback(Box::new(callback)),
            Some(timeout),
        )
    }

    /// Send a request and wait for the response.
    ///
    /// `timeout` falls back to the `request_timeout_ms` setting; with
    /// neither, waits until a response arrives or the client shuts down.
    pub async fn call(
        &self,
        event: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.enqueue_request(
            event,
            params,
            Responder::Reply(tx),
            timeout.or(self.inner.request_timeout),
        )?;
        rx.await.map_err(|_| ClientError::Shutdown)?
    }

    /// Register a listener for `event`, including the built-in `connect`,
    /// `disconnect`, `reconnecting` and `error`.
    ///
    /// Listeners run on the connection task and must not block. To reply
    /// from a listener, capture [`Client::downgrade`] rather than a clone.
    pub fn on<F>(&self, event: &str, listener: F) -> Result<ListenerHandle, ClientError>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.validated(validate_event(event))?;
        Ok(self.inner.bus.on(event, listener))
    }

    /// Remove one listener. Returns whether it was registered.
    pub fn off(&self, handle: &ListenerHandle) -> bool {
        self.inner.bus.off(handle)
    }

    /// Remove every listener for `event`. Returns how many were removed.
    pub fn destroy(&self, event: &str) -> usize {
        self.inner.bus.destroy(event)
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        let (tx, rx) = oneshot::channel();
        if self.command(Command::State(tx)).is_err() {
            return ConnectionState::Closed;
        }
        rx.await.unwrap_or(ConnectionState::Closed)
    }

    /// Stop the connection actor: close the socket, cancel any reconnect and
    /// fail pending calls. Every clone of this client becomes inert.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.command(Command::Shutdown(Some(tx))).is_ok() {
            let _ = rx.await;
        }
    }

    fn enqueue_request(
        &self,
        event: &str,
        params: Option<Value>,
        responder: Responder,
        timeout: Option<Duration>,
    ) -> Result<(), ClientError> {
        let params = self.validated(validate_request(event, params))?;
        self.command(Command::Request {
            event: event.to_owned(),
            params,
            responder,
            timeout,
        })
    }

    fn validated<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(e) = &result {
            diag!(self.inner.diagnostics, warn, error = %e, "rejected call");
        }
        result
    }

    fn command(&self, command: Command) -> Result<(), ClientError> {
        self.inner
            .tx
            .send(Input::Command(command))
            .map_err(|_| ClientError::Shutdown)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("bus", &self.inner.bus)
            .finish_non_exhaustive()
    }
}

/// Non-owning [`Client`] handle.
///
/// Dropping the last [`Client`] still shuts the connection down while weak
/// handles exist; after that [`upgrade`](Self::upgrade) returns `None`.
#[derive(Clone, Default)]
pub struct WeakClient {
    inner: Weak<Inner>,
}

impl WeakClient {
    /// The client, if any strong handle is still alive.
    pub fn upgrade(&self) -> Option<Client> {
        self.inner.upgrade().map(|inner| Client { inner })
    }
}

impl fmt::Debug for WeakClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakClient")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
