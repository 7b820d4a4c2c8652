//! Connection state machine.
//!
//! ```text
//! Idle ──open──▶ Connecting ──socket open──▶ Open ──close──▶ Closing ──socket closed──▶ Closed
//!                   ▲                          │
//!                   │ timer                    │ socket closed (not deliberate, reconnect on)
//!                   └────── Reconnecting ◀─────┘
//! ```
//!
//! Every transition is looked up in [`ConnectionState::on`]; the manager
//! performs the returned [`Effect`] and never keeps separate flags. A close
//! requested by the client is the `Closing` state itself, so a socket close
//! observed in `Closing` never schedules a reconnect.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of a client's connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Never opened.
    #[default]
    Idle,
    /// A socket exists and is establishing its connection.
    Connecting,
    /// The socket is open; sends are written.
    Open,
    /// The client asked the socket to close and is waiting for it.
    Closing,
    /// Closed and not retrying.
    Closed,
    /// Lost the connection; a reconnect attempt is scheduled.
    Reconnecting,
}

impl ConnectionState {
    /// Whether a live socket is owned (`Connecting` or `Open`).
    pub fn is_connected(self) -> bool {
        matches!(self, Self::Connecting | Self::Open)
    }

    /// Whether sends are written.
    pub fn is_open(self) -> bool {
        self == Self::Open
    }

    /// Lowercase name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Reconnecting => "reconnecting",
        }
    }

    /// Look up the transition for `trigger`.
    ///
    /// `reconnect` is whether auto-reconnect is enabled.
    pub fn on(self, trigger: Trigger, reconnect: bool) -> Transition {
        use ConnectionState as S;
        use Effect as E;
        use Trigger as T;

        let lost = if reconnect {
            Transition::to(S::Reconnecting, E::ScheduleReconnect)
        } else {
            Transition::to(S::Closed, E::None)
        };

        match (self, trigger) {
            (S::Connecting | S::Open, T::Open) => Transition::ignore(self, "already connected"),
            (_, T::Open) => Transition::to(S::Connecting, E::CreateSocket),

            (S::Connecting | S::Open, T::Close) => Transition::to(S::Closing, E::CloseSocket),
            (S::Reconnecting, T::Close) => Transition::to(S::Closed, E::None),
            (_, T::Close) => Transition::ignore(self, "already closed"),

            (S::Connecting, T::SocketOpened) => Transition::to(S::Open, E::None),
            (_, T::SocketOpened) => Transition::ignore(self, "unexpected open"),

            (S::Closing, T::SocketClosed) => Transition::to(S::Closed, E::None),
            (S::Connecting | S::Open, T::SocketClosed | T::ConstructionFailed) => lost,
            (_, T::SocketClosed | T::ConstructionFailed) => {
                Transition::ignore(self, "no live socket")
            }

            (S::Reconnecting, T::TimerFired) => Transition::to(S::Reconnecting, E::Reopen),
            (_, T::TimerFired) => Transition::ignore(self, "no reconnect pending"),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs that drive the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// `open()` was called, or a reconnect attempt starts.
    Open,
    /// `close()` was called.
    Close,
    /// The transport reported the socket open.
    SocketOpened,
    /// The transport reported the socket closed.
    SocketClosed,
    /// The transport could not construct a socket.
    ConstructionFailed,
    /// The reconnect delay elapsed.
    TimerFired,
}

/// Work the manager performs for a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// State change only.
    None,
    /// Ask the transport for a new socket.
    CreateSocket,
    /// Ask the current socket to close.
    CloseSocket,
    /// Arm the reconnect timer (replacing any pending one).
    ScheduleReconnect,
    /// Emit `reconnecting` and run `open()`.
    Reopen,
    /// Nothing to do; the reason is logged.
    Ignore(&'static str),
}

/// Result of a state lookup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// State after the trigger.
    pub next: ConnectionState,
    /// Work to perform.
    pub effect: Effect,
}

impl Transition {
    fn to(next: ConnectionState, effect: Effect) -> Self {
        Self { next, effect }
    }

    fn ignore(state: ConnectionState, reason: &'static str) -> Self {
        Self {
            next: state,
            effect: Effect::Ignore(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState as S;

    #[test]
    fn open_from_rest_states_creates_socket() {
        for s in [S::Idle, S::Closed, S::Closing, S::Reconnecting] {
            let t = s.on(Trigger::Open, false);
            assert_eq!(t.next, S::Connecting, "from {s}");
            assert_eq!(t.effect, Effect::CreateSocket, "from {s}");
        }
    }

    #[test]
    fn open_while_connected_is_ignored() {
        for s in [S::Connecting, S::Open] {
            let t = s.on(Trigger::Open, true);
            assert_eq!(t.next, s);
            assert!(matches!(t.effect, Effect::Ignore(_)));
        }
    }

    #[test]
    fn close_while_connected_closes_socket() {
        for s in [S::Connecting, S::Open] {
            let t = s.on(Trigger::Close, true);
            assert_eq!(t.next, S::Closing);
            assert_eq!(t.effect, Effect::CloseSocket);
        }
    }

    #[test]
    fn close_while_reconnecting_goes_closed() {
        let t = S::Reconnecting.on(Trigger::Close, true);
        assert_eq!(t.next, S::Closed);
        assert_eq!(t.effect, Effect::None);
    }

    #[test]
    fn close_when_not_connected_is_ignored() {
        for s in [S::Idle, S::Closed, S::Closing] {
            let t = s.on(Trigger::Close, true);
            assert_eq!(t.next, s);
            assert!(matches!(t.effect, Effect::Ignore(_)));
        }
    }

    #[test]
    fn socket_open_moves_connecting_to_open() {
        let t = S::Connecting.on(Trigger::SocketOpened, false);
        assert_eq!(t.next, S::Open);
    }

    #[test]
    fn deliberate_close_never_reconnects() {
        let t = S::Closing.on(Trigger::SocketClosed, true);
        assert_eq!(t.next, S::Closed);
        assert_eq!(t.effect, Effect::None);
    }

    #[test]
    fn lost_connection_with_reconnect() {
        for s in [S::Open, S::Connecting] {
            let t = s.on(Trigger::SocketClosed, true);
            assert_eq!(t.next, S::Reconnecting);
            assert_eq!(t.effect, Effect::ScheduleReconnect);
        }
    }

    #[test]
    fn lost_connection_without_reconnect() {
        let t = S::Open.on(Trigger::SocketClosed, false);
        assert_eq!(t.next, S::Closed);
        assert_eq!(t.effect, Effect::None);
    }

    #[test]
    fn construction_failure_counts_as_lost_connection() {
        let t = S::Connecting.on(Trigger::ConstructionFailed, true);
        assert_eq!(t.effect, Effect::ScheduleReconnect);
        let t = S::Connecting.on(Trigger::ConstructionFailed, false);
        assert_eq!(t.next, S::Closed);
    }

    #[test]
    fn timer_fires_only_in_reconnecting() {
        let t = S::Reconnecting.on(Trigger::TimerFired, true);
        assert_eq!(t.effect, Effect::Reopen);
        for s in [S::Idle, S::Open, S::Closed] {
            assert!(matches!(s.on(Trigger::TimerFired, true).effect, Effect::Ignore(_)));
        }
    }

    #[test]
    fn display_and_serde() {
        assert_eq!(S::Reconnecting.to_string(), "reconnecting");
        assert_eq!(serde_json::to_string(&S::Open).unwrap(), "\"open\"");
    }

    #[test]
    fn predicates() {
        assert!(S::Connecting.is_connected());
        assert!(S::Open.is_connected());
        assert!(!S::Closing.is_connected());
        assert!(S::Open.is_open());
        assert!(!S::Connecting.is_open());
    }
}
