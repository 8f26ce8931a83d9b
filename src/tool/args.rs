use serde::de::IgnoredAny;
use serde_json::Value;

/// Normalize a tool-call argument string to guaranteed-parseable JSON text.
///
/// - empty / whitespace-only -> `"{}"`
/// - already-valid JSON -> returned trimmed, otherwise unchanged
/// - arbitrary non-JSON text -> re-encoded as a JSON string literal that
///   parses back to the exact (trimmed) original
///
/// Fragmented streaming often delivers arguments as free text or nothing at
/// all; normalizing here keeps downstream parsing infallible.
#[must_use]
pub fn ensure_json_string(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "{}".to_string();
    }
    if serde_json::from_str::<IgnoredAny>(trimmed).is_ok() {
        return trimmed.to_string();
    }
    Value::String(trimmed.to_string()).to_string()
}
