//! Client settings types.
//!
//! JSON keys follow the client's construction options: `url`,
//! `websocket_options`, `auto_reconnect`, `should_console_log`, plus
//! `request_timeout_ms`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Reconnect delay used when auto-reconnect is enabled without an interval.
pub const DEFAULT_RECONNECT_EVERY_MS: u64 = 2000;

/// Top-level client configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Socket URL (`ws://` or `wss://`). Required.
    pub url: String,
    /// Options handed to the transport when a socket is created.
    pub websocket_options: TransportOptions,
    /// Reconnect policy after a non-deliberate close.
    pub auto_reconnect: AutoReconnect,
    /// Whether the client writes its own diagnostic log lines.
    pub should_console_log: bool,
    /// Default timeout for requests. `None` waits indefinitely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

impl ClientSettings {
    /// Settings for `url` with every other field at its default.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(SettingsError::InvalidValue("url is required".into()));
        }
        if let AutoReconnect::Every { every_ms: 0 } = self.auto_reconnect {
            return Err(SettingsError::InvalidValue(
                "auto_reconnect.every must be greater than zero".into(),
            ));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(SettingsError::InvalidValue(
                "request_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Default request timeout as a [`Duration`].
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

/// Transport options. Interpreted by the transport; the client only passes
/// them through.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Extra HTTP headers on the upgrade request.
    pub headers: BTreeMap<String, String>,
    /// Requested subprotocols (`Sec-WebSocket-Protocol`).
    pub protocols: Vec<String>,
    /// Abort the connection attempt after this long.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
}

impl TransportOptions {
    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

/// Reconnect policy.
///
/// On the wire this is `false`, `true` (default interval) or
/// `{ "every": <milliseconds> }`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AutoReconnectRepr", into = "AutoReconnectRepr")]
pub enum AutoReconnect {
    /// Never reconnect automatically.
    #[default]
    Disabled,
    /// Retry at a fixed interval (no backoff).
    Every {
        /// Delay between a lost connection and the next attempt.
        every_ms: u64,
    },
}

impl AutoReconnect {
    /// Fixed-interval policy.
    pub fn every(delay: Duration) -> Self {
        #[allow(clippy::cast_possible_truncation)]
        let every_ms = delay.as_millis() as u64;
        Self::Every { every_ms }
    }

    /// Whether reconnects are scheduled at all.
    pub fn is_enabled(self) -> bool {
        matches!(self, Self::Every { .. })
    }

    /// Delay before the next attempt, if enabled.
    pub fn delay(self) -> Option<Duration> {
        match self {
            Self::Disabled => None,
            Self::Every { every_ms } => Some(Duration::from_millis(every_ms)),
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum AutoReconnectRepr {
    Flag(bool),
    Interval {
        #[serde(default)]
        every: Option<u64>,
    },
}

impl From<AutoReconnectRepr> for AutoReconnect {
    fn from(repr: AutoReconnectRepr) -> Self {
        match repr {
            AutoReconnectRepr::Flag(false) => Self::Disabled,
            AutoReconnectRepr::Flag(true) => Self::Every {
                every_ms: DEFAULT_RECONNECT_EVERY_MS,
            },
            AutoReconnectRepr::Interval { every } => Self::Every {
                every_ms: every.unwrap_or(DEFAULT_RECONNECT_EVERY_MS),
            },
        }
    }
}

impl From<AutoReconnect> for AutoReconnectRepr {
    fn from(policy: AutoReconnect) -> Self {
        match policy {
            AutoReconnect::Disabled => Self::Flag(false),
            AutoReconnect::Every { every_ms } => Self::Interval {
                every: Some(every_ms),
            },
        }
    }
}
