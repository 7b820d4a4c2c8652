//! Settings loading: defaults, then the settings file, then `SOCKLINE_*`
//! environment variables.
//!
//! The file is merged over the serialized defaults as JSON before being
//! deserialized, so a file only needs the keys it changes. Nested objects
//! such as `websocket_options` merge key by key; arrays, scalars and a
//! `null` on either side are handled by [`deep_merge`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::{AutoReconnect, ClientSettings, DEFAULT_RECONNECT_EVERY_MS};

/// Upper bound accepted for millisecond env overrides (one hour).
const MAX_ENV_MS: u64 = 3_600_000;

/// `~/.sockline/settings.json`, or under `/tmp` when `HOME` is unset.
pub fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("/tmp"), PathBuf::from);
    home.join(".sockline").join("settings.json")
}

/// Load from [`settings_path`] and apply env overrides.
pub fn load_settings() -> Result<ClientSettings> {
    load_settings_from_path(&settings_path())
}

/// Load from `path` and apply env overrides.
///
/// A missing file yields the defaults. A file that exists but cannot be
/// read or parsed is an error; nothing is silently ignored.
pub fn load_settings_from_path(path: &Path) -> Result<ClientSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// File layer only, without the environment.
pub(crate) fn read_settings_file(path: &Path) -> Result<ClientSettings> {
    let defaults = serde_json::to_value(ClientSettings::default())?;
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(serde_json::from_value(defaults)?);
        }
        Err(source) => {
            return Err(SettingsError::Read {
                path: path.to_owned(),
                source,
            });
        }
    };
    debug!(path = %path.display(), "loading settings file");

    let parse_err = |source: serde_json::Error| SettingsError::Parse {
        path: path.to_owned(),
        source,
    };
    let overrides: Value = serde_json::from_str(&content).map_err(parse_err)?;
    serde_json::from_value(deep_merge(defaults, overrides)).map_err(parse_err)
}

/// Merge `overrides` into `base`.
///
/// Objects merge per key, recursively. Anything else in `overrides`
/// replaces the base value, except `null`, which leaves it untouched.
pub fn deep_merge(base: Value, overrides: Value) -> Value {
    match (base, overrides) {
        (base, Value::Null) => base,
        (Value::Object(base), Value::Object(overrides)) => {
            Value::Object(merge_maps(base, overrides))
        }
        (_, overrides) => overrides,
    }
}

fn merge_maps(mut base: Map<String, Value>, overrides: Map<String, Value>) -> Map<String, Value> {
    for (key, value) in overrides {
        let merged = match base.remove(&key) {
            Some(existing) => deep_merge(existing, value),
            None if value.is_null() => continue,
            None => value,
        };
        let _ = base.insert(key, merged);
    }
    base
}

/// Apply `SOCKLINE_*` overrides:
///
/// | variable | effect |
/// |---|---|
/// | `SOCKLINE_URL` | replaces `url` |
/// | `SOCKLINE_AUTO_RECONNECT` | on/off via [`toggle_reconnect`] |
/// | `SOCKLINE_RECONNECT_EVERY_MS` | enables reconnect at that interval |
/// | `SOCKLINE_REQUEST_TIMEOUT_MS` | default request timeout |
/// | `SOCKLINE_CONSOLE_LOG` | diagnostics toggle |
///
/// Unparseable values are logged and skipped.
pub fn apply_env_overrides(settings: &mut ClientSettings) {
    if let Some(url) = env_var("SOCKLINE_URL", |v| Some(v.to_owned())) {
        settings.url = url;
    }
    if let Some(on) = env_var("SOCKLINE_AUTO_RECONNECT", parse_bool) {
        settings.auto_reconnect = toggle_reconnect(settings.auto_reconnect, on);
    }
    if let Some(every_ms) = env_var("SOCKLINE_RECONNECT_EVERY_MS", parse_ms) {
        settings.auto_reconnect = AutoReconnect::Every { every_ms };
    }
    if let Some(ms) = env_var("SOCKLINE_REQUEST_TIMEOUT_MS", parse_ms) {
        settings.request_timeout_ms = Some(ms);
    }
    if let Some(on) = env_var("SOCKLINE_CONSOLE_LOG", parse_bool) {
        settings.should_console_log = on;
    }
}

/// Turn reconnects on or off, keeping a configured interval when turning
/// them on.
pub fn toggle_reconnect(current: AutoReconnect, enabled: bool) -> AutoReconnect {
    match (enabled, current) {
        (false, _) => AutoReconnect::Disabled,
        (true, AutoReconnect::Every { .. }) => current,
        (true, AutoReconnect::Disabled) => AutoReconnect::Every {
            every_ms: DEFAULT_RECONNECT_EVERY_MS,
        },
    }
}

/// `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`, any case.
pub fn parse_bool(val: &str) -> Option<bool> {
    const TRUE: [&str; 4] = ["true", "1", "yes", "on"];
    const FALSE: [&str; 4] = ["false", "0", "no", "off"];
    let val = val.trim();
    if TRUE.iter().any(|t| t.eq_ignore_ascii_case(val)) {
        Some(true)
    } else if FALSE.iter().any(|f| f.eq_ignore_ascii_case(val)) {
        Some(false)
    } else {
        None
    }
}

/// Integer in `min..=max`.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    val.trim()
        .parse::<u64>()
        .ok()
        .filter(|n| (min..=max).contains(n))
}

fn parse_ms(val: &str) -> Option<u64> {
    parse_u64_range(val, 1, MAX_ENV_MS)
}

/// Read `name`, treating empty as unset; values `parse` rejects are logged.
fn env_var<T>(name: &str, parse: impl FnOnce(&str) -> Option<T>) -> Option<T> {
    let raw = std::env::var(name).ok().filter(|v| !v.is_empty())?;
    let parsed = parse(&raw);
    if parsed.is_none() {
        warn!(key = name, value = %raw, "ignoring unparseable env override");
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::time::Duration;

    fn defaults() -> Value {
        serde_json::to_value(ClientSettings::default()).unwrap()
    }

    fn write_settings(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_keeps_defaults_the_file_does_not_mention() {
        let merged = deep_merge(defaults(), json!({"url": "ws://a:1"}));
        assert_eq!(merged["url"], "ws://a:1");
        assert_eq!(merged["should_console_log"], false);
        assert_eq!(merged["auto_reconnect"], false);
    }

    #[test]
    fn merge_transport_options_per_key() {
        let base = json!({
            "websocket_options": {"headers": {"authorization": "Bearer x"}, "protocols": ["v1"]}
        });
        let merged = deep_merge(
            base,
            json!({"websocket_options": {"headers": {"x-trace": "1"}}}),
        );
        let options = &merged["websocket_options"];
        assert_eq!(options["headers"]["authorization"], "Bearer x");
        assert_eq!(options["headers"]["x-trace"], "1");
        assert_eq!(options["protocols"], json!(["v1"]));
    }

    #[test]
    fn merge_protocol_list_is_replaced_not_appended() {
        let base = json!({"websocket_options": {"protocols": ["v1", "v2"]}});
        let merged = deep_merge(base, json!({"websocket_options": {"protocols": ["v3"]}}));
        assert_eq!(merged["websocket_options"]["protocols"], json!(["v3"]));
    }

    #[test]
    fn merge_null_leaves_setting_alone() {
        let base = json!({"url": "ws://a:1", "request_timeout_ms": 500});
        let merged = deep_merge(base, json!({"url": null, "request_timeout_ms": null}));
        assert_eq!(merged["url"], "ws://a:1");
        assert_eq!(merged["request_timeout_ms"], 500);
    }

    #[test]
    fn merge_null_does_not_add_missing_key() {
        let merged = deep_merge(json!({"url": "ws://a:1"}), json!({"request_timeout_ms": null}));
        assert!(merged.get("request_timeout_ms").is_none());
    }

    #[test]
    fn merge_reconnect_flag_replaced_by_interval() {
        let merged = deep_merge(defaults(), json!({"auto_reconnect": {"every": 500}}));
        assert_eq!(merged["auto_reconnect"], json!({"every": 500}));
    }

    // ── file layer ──────────────────────────────────────────────────

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = read_settings_file(&dir.path().join("absent.json")).unwrap();
        assert_eq!(settings, ClientSettings::default());
    }

    #[test]
    fn partial_file_overrides_only_its_keys() {
        let (_dir, path) = write_settings(
            r#"{"url": "ws://127.0.0.1:4000", "auto_reconnect": {"every": 500},
                "websocket_options": {"protocols": ["chat"]}}"#,
        );
        let settings = read_settings_file(&path).unwrap();
        assert_eq!(settings.url, "ws://127.0.0.1:4000");
        assert_eq!(settings.auto_reconnect, AutoReconnect::Every { every_ms: 500 });
        assert_eq!(settings.websocket_options.protocols, vec!["chat".to_string()]);
        assert!(settings.websocket_options.headers.is_empty());
        assert_eq!(settings.request_timeout_ms, None);
    }

    #[test]
    fn invalid_json_is_a_parse_error_naming_the_file() {
        let (_dir, path) = write_settings("not valid json");
        let err = read_settings_file(&path).unwrap_err();
        assert_matches!(&err, SettingsError::Parse { path: p, .. } if *p == path);
    }

    #[test]
    fn wrong_value_type_is_a_parse_error() {
        let (_dir, path) = write_settings(r#"{"request_timeout_ms": "soon"}"#);
        assert_matches!(
            read_settings_file(&path),
            Err(SettingsError::Parse { .. })
        );
    }

    #[test]
    fn unreadable_path_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_settings_file(dir.path()).unwrap_err();
        assert_matches!(&err, SettingsError::Read { path, .. } if path == dir.path());
    }

    #[test]
    fn load_from_path_surfaces_read_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert_matches!(
            load_settings_from_path(dir.path()),
            Err(SettingsError::Read { .. })
        );
    }

    // ── toggle_reconnect ────────────────────────────────────────────

    #[test]
    fn toggle_reconnect_on_keeps_interval() {
        let current = AutoReconnect::Every { every_ms: 750 };
        assert_eq!(toggle_reconnect(current, true), current);
    }

    #[test]
    fn toggle_reconnect_on_from_disabled_uses_default() {
        let p = toggle_reconnect(AutoReconnect::Disabled, true);
        assert_eq!(p.delay(), Some(Duration::from_millis(2000)));
    }

    #[test]
    fn toggle_reconnect_off() {
        let p = toggle_reconnect(AutoReconnect::Every { every_ms: 10 }, false);
        assert_eq!(p, AutoReconnect::Disabled);
    }

    // ── value parsing ───────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in ["true", "1", "yes", "On", " TRUE "] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val:?}");
        }
        for val in ["false", "0", "NO", "off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val:?}");
        }
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn millisecond_overrides_are_bounded() {
        assert_eq!(parse_ms("500"), Some(500));
        assert_eq!(parse_ms("3600000"), Some(MAX_ENV_MS));
        assert_eq!(parse_ms("0"), None);
        assert_eq!(parse_ms("3600001"), None);
        assert_eq!(parse_ms("-5"), None);
        assert_eq!(parse_ms("2s"), None);
    }
}
