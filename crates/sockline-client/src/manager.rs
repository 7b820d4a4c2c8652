//! Connection manager actor.
//!
//! One task per client owns the socket, the reconnect deadline, the state
//! machine and the pending-request table. Public calls and transport events
//! arrive on the same inbox and are handled one at a time, so a listener
//! always observes a consistent state.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use sockline_core::{CONNECT, DISCONNECT, ERROR, EventBus, MessageCodec, RECONNECTING, ResponseId};
use sockline_settings::{AutoReconnect, ClientSettings, TransportOptions};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::correlator::{RequestCorrelator, Responder};
use crate::errors::ClientError;
use crate::state::{ConnectionState, Effect, Transition, Trigger};
use crate::transport::{EventSink, Socket, TransportEvent, TransportFactory};

/// Everything the actor consumes.
pub(crate) enum Input {
    Command(Command),
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    Expire(ResponseId),
}

/// Public operations forwarded by [`Client`](crate::Client).
pub(crate) enum Command {
    Open,
    Close,
    Send {
        event: String,
        data: Value,
        response_id: Option<String>,
    },
    Request {
        event: String,
        params: Value,
        responder: Responder,
        timeout: Option<Duration>,
    },
    State(oneshot::Sender<ConnectionState>),
    Shutdown(Option<oneshot::Sender<()>>),
}

pub(crate) struct ConnectionManager {
    url: String,
    options: TransportOptions,
    reconnect: AutoReconnect,
    diagnostics: bool,
    transport: Arc<dyn TransportFactory>,
    codec: MessageCodec,
    bus: Arc<EventBus>,
    correlator: RequestCorrelator,
    state: ConnectionState,
    socket: Option<Box<dyn Socket>>,
    generation: u64,
    reconnect_at: Option<Instant>,
    inbox: mpsc::WeakUnboundedSender<Input>,
}

impl ConnectionManager {
    /// Start the actor. Returns the inbox sender.
    pub(crate) fn spawn(
        settings: ClientSettings,
        transport: Arc<dyn TransportFactory>,
        codec: MessageCodec,
        bus: Arc<EventBus>,
    ) -> mpsc::UnboundedSender<Input> {
        let (tx, rx) = mpsc::unbounded_channel();
        let manager = Self {
            url: settings.url,
            options: settings.websocket_options,
            reconnect: settings.auto_reconnect,
            diagnostics: settings.should_console_log,
            transport,
            codec,
            bus,
            correlator: RequestCorrelator::new(),
            state: ConnectionState::Idle,
            socket: None,
            generation: 0,
            reconnect_at: None,
            inbox: tx.downgrade(),
        };
        drop(tokio::spawn(manager.run(rx)));
        tx
    }

    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Input>) {
        let mut shutdown_ack = None;
        loop {
            let input = if let Some(deadline) = self.reconnect_at {
                // An elapsed deadline is handled before anything queued behind it.
                tokio::select! {
                    biased;
                    () = tokio::time::sleep_until(deadline) => {
                        self.reconnect_at = None;
                        let _ = self.apply(Trigger::TimerFired);
                        continue;
                    }
                    input = inbox.recv() => input,
                }
            } else {
                inbox.recv().await
            };

            match input {
                None => break,
                Some(Input::Command(Command::Shutdown(ack))) => {
                    shutdown_ack = ack;
                    break;
                }
                Some(Input::Command(command)) => self.handle_command(command),
                Some(Input::Transport { generation, event }) => {
                    self.handle_transport(generation, event);
                }
                Some(Input::Expire(id)) => {
                    if let Some(event) = self.correlator.expire(&id) {
                        diag!(self.diagnostics, warn, event = %event, response_id = %id, "request timed out");
                    }
                }
            }
        }

        self.teardown();
        if let Some(ack) = shutdown_ack {
            let _ = ack.send(());
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Open => {
                let _ = self.apply(Trigger::Open);
            }
            Command::Close => {
                let _ = self.apply(Trigger::Close);
            }
            Command::Send {
                event,
                data,
                response_id,
            } => {
                let _ = self.write(&event, data, response_id.as_deref());
            }
            Command::Request {
                event,
                params,
                responder,
                timeout,
            } => self.request(&event, params, responder, timeout),
            Command::State(reply) => {
                let _ = reply.send(self.state);
            }
            // Handled by the run loop.
            Command::Shutdown(_) => {}
        }
    }

    fn handle_transport(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation || self.socket.is_none() {
            diag!(self.diagnostics, trace, generation, current = self.generation, "ignoring event from stale socket");
            return;
        }
        match event {
            TransportEvent::Open => {
                if self.apply(Trigger::SocketOpened) {
                    diag!(self.diagnostics, info, url = %self.url, generation, "connected");
                    let _ = self.bus.emit(CONNECT, &Value::Null);
                }
            }
            TransportEvent::Error(message) => {
                diag!(self.diagnostics, warn, generation, error = %message, "socket error");
                let _ = self.bus.emit(ERROR, &json!({ "message": message }));
            }
            TransportEvent::Message(text) => self.dispatch(&text),
            TransportEvent::Closed { code, reason } => {
                self.socket = None;
                diag!(self.diagnostics, info, generation, code, reason = %reason, "disconnected");
                let _ = self
                    .bus
                    .emit(DISCONNECT, &json!({ "code": code, "reason": reason }));
                let _ = self.apply(Trigger::SocketClosed);
            }
        }
    }

    /// Run a state transition and its effect. Returns `false` when the
    /// trigger was ignored in the current state.
    fn apply(&mut self, trigger: Trigger) -> bool {
        let from = self.state;
        let Transition { next, effect } = from.on(trigger, self.reconnect.is_enabled());
        if let Effect::Ignore(reason) = effect {
            diag!(self.diagnostics, debug, state = %from, ?trigger, reason, "ignored");
            return false;
        }

        self.state = next;
        if next != ConnectionState::Reconnecting {
            self.reconnect_at = None;
        }
        diag!(self.diagnostics, debug, from = %from, to = %next, ?trigger, "state transition");

        match effect {
            Effect::None | Effect::Ignore(_) => {}
            Effect::CreateSocket => self.create_socket(),
            Effect::CloseSocket => {
                if let Some(socket) = &self.socket {
                    socket.close();
                }
            }
            Effect::ScheduleReconnect => {
                if let Some(delay) = self.reconnect.delay() {
                    self.reconnect_at = Some(Instant::now() + delay);
                    #[allow(clippy::cast_possible_truncation)]
                    let delay_ms = delay.as_millis() as u64;
                    diag!(self.diagnostics, info, delay_ms, "reconnect scheduled");
                }
            }
            Effect::Reopen => {
                let _ = self.bus.emit(RECONNECTING, &Value::Null);
                let _ = self.apply(Trigger::Open);
            }
        }
        true
    }

    fn create_socket(&mut self) {
        let Some(tx) = self.inbox.upgrade() else {
            return;
        };
        self.generation += 1;
        let events = EventSink::new(self.generation, tx);
        match self.transport.connect(&self.url, &self.options, events) {
            Ok(socket) => {
                diag!(self.diagnostics, info, url = %self.url, generation = self.generation, "connecting");
                self.socket = Some(socket);
            }
            Err(e) => {
                diag!(self.diagnostics, warn, url = %self.url, error = %e, "failed to create socket");
                self.socket = None;
                let _ = self.bus.emit(ERROR, &json!({ "message": e.to_string() }));
                let _ = self.apply(Trigger::ConstructionFailed);
            }
        }
    }

    /// Encode and write one frame. Dropped unless the connection is open.
    fn write(&self, event: &str, data: Value, response_id: Option<&str>) -> bool {
        let Some(socket) = self.socket.as_ref().filter(|_| self.state.is_open()) else {
            diag!(self.diagnostics, debug, event, state = %self.state, "not connected, dropping send");
            return false;
        };
        let text = match self.codec.encode(event, data, response_id) {
            Ok(text) => text,
            Err(e) => {
                diag!(self.diagnostics, warn, event, error = %e, "failed to encode envelope");
                return false;
            }
        };
        match socket.send(text) {
            Ok(()) => true,
            Err(e) => {
                diag!(self.diagnostics, warn, event, error = %e, "socket write failed");
                false
            }
        }
    }

    fn request(
        &mut self,
        event: &str,
        params: Value,
        responder: Responder,
        timeout: Option<Duration>,
    ) {
        let dropped = || ClientError::RequestDropped {
            event: event.to_owned(),
        };
        if !self.state.is_open() {
            diag!(self.diagnostics, debug, event, state = %self.state, "not connected, dropping request");
            responder.fail(dropped());
            return;
        }

        let id = self.correlator.next_response_id(event);
        if !self.write(event, params, Some(id.as_str())) {
            responder.fail(dropped());
            return;
        }
        self.correlator.register(id.clone(), event, responder, timeout);
        if let Some(limit) = timeout {
            self.schedule_expiry(id, limit);
        }
    }

    fn schedule_expiry(&self, id: ResponseId, limit: Duration) {
        let inbox = self.inbox.clone();
        drop(tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            if let Some(tx) = inbox.upgrade() {
                let _ = tx.send(Input::Expire(id));
            }
        }));
    }

    /// Route a validated frame: a pending request first, then listeners.
    fn dispatch(&mut self, text: &str) {
        let decoded = self.codec.decode(text, |event| {
            self.correlator.is_pending(event) || self.bus.has_listeners(event)
        });
        let message = match decoded {
            Ok(message) => message,
            Err(e) => {
                diag!(self.diagnostics, debug, reason = e.reason(), error = %e, "dropping frame");
                return;
            }
        };
        if self.correlator.is_pending(&message.event) {
            let _ = self.correlator.resolve(&message.event, message.data);
        } else {
            let _ = self.bus.emit(&message.event, &message.data);
        }
    }

    fn teardown(&mut self) {
        self.reconnect_at = None;
        if let Some(socket) = self.socket.take() {
            socket.close();
        }
        let dropped = self.correlator.clear();
        self.state = ConnectionState::Closed;
        diag!(self.diagnostics, debug, dropped, "client shut down");
    }
}
