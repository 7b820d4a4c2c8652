//! # sockline
//!
//! Command-line front end: listen for events, send one, make a request, or
//! run the echo server.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use sockline_client::{CONNECT, Client, ClientSettings, DISCONNECT, ERROR};
use sockline_logging::{LoggingConfig, init_logging};
use sockline_settings::{load_settings, load_settings_from_path};
use tokio::sync::mpsc;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Resilient WebSocket client for JSON event envelopes.
#[derive(Parser, Debug)]
#[command(name = "sockline", version, about)]
struct Cli {
    /// Socket URL (overrides the settings file and `SOCKLINE_URL`).
    #[arg(long, global = true)]
    url: Option<String>,

    /// Settings file (default `~/.sockline/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level when `RUST_LOG` is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every received event until Ctrl-C.
    Listen {
        /// Events to subscribe to.
        #[arg(required = true)]
        events: Vec<String>,
    },
    /// Send one event and exit.
    Send {
        /// Event name.
        event: String,
        /// Payload; parsed as JSON, sent as a string if it does not parse.
        data: Option<String>,
    },
    /// Make a request and print the response.
    Request {
        /// Event name.
        event: String,
        /// Params as a JSON object.
        params: Option<String>,
        /// Give up after this many milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Run the echo server.
    Serve {
        /// Listen address.
        #[arg(long, default_value = sockline_server::DEFAULT_ADDR)]
        addr: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::with_level(&cli.log_level)?;
    logging.json = cli.json_logs;
    init_logging(&logging)?;

    match cli.command {
        Command::Serve { addr } => {
            let listener = sockline_server::bind(addr.as_str())
                .await
                .with_context(|| format!("failed to bind {addr}"))?;
            tokio::select! {
                result = sockline_server::serve_echo(listener) => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
            }
            Ok(())
        }
        command => {
            let settings = client_settings(cli.url, cli.settings.as_deref())?;
            run_client(settings, command).await
        }
    }
}

fn client_settings(url: Option<String>, path: Option<&Path>) -> Result<ClientSettings> {
    let mut settings = match path {
        Some(path) => load_settings_from_path(path),
        None => load_settings(),
    }
    .context("failed to load settings")?;
    if let Some(url) = url {
        settings.url = url;
    }
    settings
        .validate()
        .context("no usable url: pass --url or set SOCKLINE_URL")?;
    Ok(settings)
}

async fn run_client(settings: ClientSettings, command: Command) -> Result<()> {
    let url = settings.url.clone();
    let client = Client::new(settings)?;

    match command {
        Command::Listen { events } => {
            for event in events {
                let name = event.clone();
                let _ = client.on(&event, move |data| {
                    println!("{}", json!({ "event": name, "data": data }));
                })?;
            }
            let _ = client.on(DISCONNECT, |data| {
                tracing::warn!(%data, "disconnected");
            })?;
            connect(&client, &url).await?;
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
        }
        Command::Send { event, data } => {
            connect(&client, &url).await?;
            client.send(&event, parse_payload(data.as_deref()))?;
            close(&client).await;
        }
        Command::Request {
            event,
            params,
            timeout_ms,
        } => {
            let params = params
                .as_deref()
                .map(serde_json::from_str::<Value>)
                .transpose()
                .context("params must be valid JSON")?;
            connect(&client, &url).await?;
            let response = client
                .call(&event, params, timeout_ms.map(Duration::from_millis))
                .await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
            close(&client).await;
        }
        Command::Serve { .. } => bail!("serve does not run a client"),
    }

    client.shutdown().await;
    Ok(())
}

/// Open and wait for `connect`, failing on the first `error`.
async fn connect(client: &Client, url: &str) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let ok = tx.clone();
    let on_connect = client.on(CONNECT, move |_| {
        let _ = ok.send(Ok(()));
    })?;
    let on_error = client.on(ERROR, move |data| {
        let message = data["message"].as_str().unwrap_or("connection failed");
        let _ = tx.send(Err(message.to_owned()));
    })?;

    client.open();
    let outcome = tokio::time::timeout(CONNECT_TIMEOUT, rx.recv()).await;
    let _ = client.off(&on_connect);
    let _ = client.off(&on_error);

    match outcome {
        Ok(Some(Ok(()))) => {
            tracing::info!(url, "connected");
            Ok(())
        }
        Ok(Some(Err(message))) => bail!("failed to connect to {url}: {message}"),
        Ok(None) => bail!("client shut down"),
        Err(_) => bail!("timed out connecting to {url}"),
    }
}

/// Close and give the socket a moment to finish the close handshake.
async fn close(client: &Client) {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = client.on(DISCONNECT, move |_| {
        let _ = tx.send(());
    });
    client.close();
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, rx.recv()).await;
    if let Ok(handle) = handle {
        let _ = client.off(&handle);
    }
}

/// JSON if it parses, otherwise the raw string.
fn parse_payload(raw: Option<&str>) -> Value {
    match raw {
        None => Value::Null,
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_parses_json_or_falls_back_to_string() {
        assert_eq!(parse_payload(None), Value::Null);
        assert_eq!(parse_payload(Some(r#"{"a":1}"#)), json!({"a": 1}));
        assert_eq!(parse_payload(Some("42")), json!(42));
        assert_eq!(parse_payload(Some("hello")), json!("hello"));
    }

    #[test]
    fn parses_listen_with_global_flags() {
        let cli = Cli::try_parse_from([
            "sockline",
            "listen",
            "chat",
            "presence",
            "--url",
            "ws://localhost:4000",
            "--json-logs",
        ])
        .unwrap();
        assert_eq!(cli.url.as_deref(), Some("ws://localhost:4000"));
        assert!(cli.json_logs);
        assert!(matches!(cli.command, Command::Listen { events } if events.len() == 2));
    }

    #[test]
    fn listen_requires_an_event() {
        assert!(Cli::try_parse_from(["sockline", "listen"]).is_err());
    }

    #[test]
    fn parses_request_timeout() {
        let cli = Cli::try_parse_from([
            "sockline",
            "request",
            "ping",
            r#"{"x":1}"#,
            "--timeout-ms",
            "500",
        ])
        .unwrap();
        match cli.command {
            Command::Request {
                event,
                params,
                timeout_ms,
            } => {
                assert_eq!(event, "ping");
                assert_eq!(params.as_deref(), Some(r#"{"x":1}"#));
                assert_eq!(timeout_ms, Some(500));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn serve_defaults_to_port_4000() {
        let cli = Cli::try_parse_from(["sockline", "serve"]).unwrap();
        assert!(matches!(cli.command, Command::Serve { addr } if addr == "127.0.0.1:4000"));
    }

    #[test]
    fn explicit_url_overrides_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"url": "ws://from-file:1"}"#).unwrap();
        let settings =
            client_settings(Some("ws://from-flag:2".into()), Some(path.as_path())).unwrap();
        assert_eq!(settings.url, "ws://from-flag:2");
    }
}
