//! Recover a JSON document from free-form oracle text

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;
use thiserror::Error;

/// The response text could not be turned into the expected payload
#[derive(Debug, Error)]
#[error("Failed to parse analysis response: {source}")]
pub struct ParseError {
    #[source]
    pub source: serde_json::Error,
    /// The exact text handed to the JSON parser
    pub attempted: String,
}

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    // Lazy interior so the first closing fence ends the block.
    FENCE.get_or_init(|| Regex::new(r"```(?:json)?([\s\S]*?)```").unwrap())
}

/// The JSON candidate inside `raw`: the interior of the first fenced block
/// (optionally tagged `json`) if there is one, otherwise the whole text.
pub fn json_candidate(raw: &str) -> &str {
    fence_regex()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
        .trim()
}

/// Deserialize the JSON document embedded in `raw`. Never returns a partial
/// payload: either the whole shape parses or the call fails.
pub fn extract<T: DeserializeOwned>(raw: &str) -> Result<T, ParseError> {
    let candidate = json_candidate(raw);
    serde_json::from_str(candidate).map_err(|source| ParseError {
        source,
        attempted: candidate.to_string(),
    })
}
