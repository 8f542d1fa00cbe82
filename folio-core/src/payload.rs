//! JSON payloads embedded in issue bodies.
//!
//! Index issues carry their data inside a fenced ```json block surrounded by
//! human-readable markdown. Parsing is a tagged result rather than an error:
//! most readers fail open to an empty record (first use, or a hand-mangled
//! body), while security-sensitive readers treat anything but `Ok` as fatal.

use serde::de::DeserializeOwned;
use serde::Serialize;

const FENCE_OPEN: &str = "```json";
const FENCE_CLOSE: &str = "```";

/// Outcome of scanning an issue body for its embedded payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedPayload<T> {
    Ok(T),
    /// No fence found, or the fence is empty.
    Missing,
    /// A fence exists but its contents do not parse.
    Malformed(String),
}

impl<T: Default> ExtractedPayload<T> {
    /// Fail-open accessor: missing and malformed both become the default.
    pub fn or_default(self) -> T {
        match self {
            Self::Ok(value) => value,
            Self::Missing | Self::Malformed(_) => T::default(),
        }
    }
}

/// Pull the first fenced JSON block out of `body` and deserialize it.
pub fn extract<T: DeserializeOwned>(body: &str) -> ExtractedPayload<T> {
    let Some(open) = body.find(FENCE_OPEN) else {
        return ExtractedPayload::Missing;
    };
    let rest = &body[open + FENCE_OPEN.len()..];
    let Some(close) = rest.find(FENCE_CLOSE) else {
        return ExtractedPayload::Malformed("unterminated json fence".to_string());
    };
    let raw = rest[..close].trim();
    if raw.is_empty() {
        return ExtractedPayload::Missing;
    }
    match serde_json::from_str(raw) {
        Ok(value) => ExtractedPayload::Ok(value),
        Err(e) => ExtractedPayload::Malformed(e.to_string()),
    }
}

/// Render the canonical index-issue body around `value`.
pub fn embed<T: Serialize>(heading: &str, value: &T) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string_pretty(value)?;
    Ok(format!(
        "{heading}\n\n{FENCE_OPEN}\n{json}\n{FENCE_CLOSE}\n\n\
         _This issue is managed by the wiki backend. Do not edit it by hand._\n"
    ))
}
