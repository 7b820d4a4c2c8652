//! # sockline-logging
//!
//! Installs the global `tracing` subscriber for sockline binaries.
//!
//! The filter comes from `RUST_LOG` when it is set and parses; otherwise it
//! is built from [`LoggingConfig::level`] plus per-module overrides. Output
//! is human-readable by default, or one JSON object per line.

#![deny(unsafe_code)]

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Errors from subscriber installation.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// The log level string did not parse.
    #[error("invalid log level: {0}")]
    InvalidLevel(String),
    /// A global subscriber was already installed.
    #[error("failed to install subscriber: {0}")]
    Init(#[from] tracing_subscriber::util::TryInitError),
}

/// Logging configuration.
#[derive(Clone, Debug)]
pub struct LoggingConfig {
    /// Default level. Overridden by `RUST_LOG`.
    pub level: Level,
    /// Per-module level overrides (e.g. `"sockline_client"` => DEBUG).
    pub module_levels: Vec<(String, Level)>,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            module_levels: Vec::new(),
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Config at `level` (`"trace"`, `"debug"`, `"info"`, `"warn"`, `"error"`).
    pub fn with_level(level: &str) -> Result<Self, LoggingError> {
        let level =
            Level::from_str(level).map_err(|_| LoggingError::InvalidLevel(level.to_owned()))?;
        Ok(Self {
            level,
            ..Self::default()
        })
    }

    /// Filter directive string built from the config.
    pub fn directive(&self) -> String {
        let mut filter = self.level.to_string().to_lowercase();
        for (module, level) in &self.module_levels {
            filter.push(',');
            filter.push_str(module);
            filter.push('=');
            filter.push_str(&level.to_string().to_lowercase());
        }
        filter
    }
}

/// Install the global subscriber. Call once at startup.
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let directive = config.directive();
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directive));

    let json_layer = config.json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
    });
    let text_layer = (!config.json).then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()?;
    Ok(())
}
