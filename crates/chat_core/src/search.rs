//! Web-search payloads attached to assistant messages.
//!
//! The service sends the search document either as a JSON object or as a
//! JSON-encoded string holding that object. Both decode to the same
//! [`SearchPayload`]; a string that cannot be decoded yields an empty payload.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default)]
    pub results: Vec<SearchResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl SearchPayload {
    /// Fallback used when a search document cannot be decoded.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty() && self.answer.is_none()
    }
}

/// Decode a raw `search` value.
///
/// `null` and blank strings mean "no search was run" and give `None`.
pub fn decode_search_value(value: &Value) -> Option<SearchPayload> {
    match value {
        Value::Null => None,
        Value::String(raw) if raw.trim().is_empty() => None,
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(inner) => Some(from_structured(inner)),
            Err(e) => {
                log::warn!("Search payload is not valid JSON, using empty results: {e}");
                Some(SearchPayload::empty())
            }
        },
        other => Some(from_structured(other.clone())),
    }
}

fn from_structured(value: Value) -> SearchPayload {
    serde_json::from_value(value).unwrap_or_else(|e| {
        log::warn!("Unexpected search payload shape, using empty results: {e}");
        SearchPayload::empty()
    })
}

/// Serde adapter for optional search fields that may arrive in either form.
pub fn deserialize_optional<'de, D>(deserializer: D) -> Result<Option<SearchPayload>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw.as_ref().and_then(decode_search_value))
}
