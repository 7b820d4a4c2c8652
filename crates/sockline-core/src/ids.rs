//! Response-channel naming.
//!
//! A request is answered on a transient event named
//! `@response-<event>-<unique>`, where `<unique>` is eight random
//! 4-hex-digit groups laid out like a UUID. The randomness only has to avoid
//! collisions within one connection's lifetime; it is not a security token.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of every response-channel name.
pub const RESPONSE_PREFIX: &str = "@response-";

/// One random group of four lowercase hex digits.
fn hex_group() -> String {
    format!("{:04x}", rand::random::<u16>())
}

/// Generate a `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` identifier from random
/// hex groups.
pub fn unique_id() -> String {
    let g: Vec<String> = (0..8).map(|_| hex_group()).collect();
    format!(
        "{}{}-{}-{}-{}-{}{}{}",
        g[0], g[1], g[2], g[3], g[4], g[5], g[6], g[7]
    )
}

/// Name of the event a response to a request is delivered on.
#[derive(Clone, Debug, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(String);

impl ResponseId {
    /// Fresh response id for a request on `event`.
    pub fn generate(event: &str) -> Self {
        Self(format!("{RESPONSE_PREFIX}{event}-{}", unique_id()))
    }

    /// Wrap an existing channel name.
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Borrow as `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwrap into the channel name.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ResponseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResponseId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn unique_id_layout() {
        let id = unique_id();
        let parts: Vec<&str> = id.split('-').collect();
        let lens: Vec<usize> = parts.iter().map(|p| p.len()).collect();
        assert_eq!(lens, vec![8, 4, 4, 4, 12], "got: {id}");
        assert!(id.chars().all(|c| c == '-' || c.is_ascii_hexdigit()));
    }

    #[test]
    fn response_id_has_prefix_and_event() {
        let id = ResponseId::generate("ping");
        assert!(id.as_str().starts_with("@response-ping-"), "got: {id}");
        assert_eq!(id.as_str().len(), "@response-ping-".len() + 36);
    }

    #[test]
    fn response_ids_do_not_repeat() {
        let ids: HashSet<ResponseId> = (0..1000).map(|_| ResponseId::generate("e")).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn serde_transparent() {
        let id = ResponseId::from_raw("@response-x-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"@response-x-1\"");
    }
}
