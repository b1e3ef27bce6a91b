//! Shared utility functions for model payloads and text handling.
//!
//! ## JSON Extraction Helpers
//!
//! Ergonomic helpers for pulling typed values out of recovered model output:
//! - `json_string`, `json_string_or` - Extract strings
//! - `json_text` - Extract a string, joining list values with a separator
//! - `json_string_array` - Extract string arrays
//! - `json_bool`, `json_f64` - Extract primitives (with lenient coercion)

use sha2::{Digest, Sha256};

// =============================================================================
// JSON Value Extraction Helpers
// =============================================================================

/// Extract string from JSON value by key.
#[inline]
pub fn json_string(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(String::from)
}

/// Extract string with default value.
#[inline]
pub fn json_string_or(value: &serde_json::Value, key: &str, default: &str) -> String {
    json_string(value, key).unwrap_or_else(|| default.to_string())
}

/// Extract a free-text field that models sometimes emit as a list.
///
/// Lists are joined with `separator`; empty items are skipped. Other scalars
/// are rendered with their JSON display form. Missing or null yields "".
pub fn json_text(value: &serde_json::Value, key: &str, separator: &str) -> String {
    match value.get(key) {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
                serde_json::Value::String(_) | serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect::<Vec<_>>()
            .join(separator),
        Some(serde_json::Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Extract string array from JSON value by key.
#[inline]
pub fn json_string_array(value: &serde_json::Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Extract boolean with default.
///
/// Accepts "true"/"yes"/"1" strings since models are not consistent about it.
pub fn json_bool(value: &serde_json::Value, key: &str, default: bool) -> bool {
    match value.get(key) {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => {
            matches!(s.trim().to_lowercase().as_str(), "true" | "yes" | "1")
        }
        Some(serde_json::Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => default,
    }
}

/// Extract f64 with default. Numeric strings are parsed.
pub fn json_f64(value: &serde_json::Value, key: &str, default: f64) -> f64 {
    match value.get(key) {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

// =============================================================================
// String Utilities
// =============================================================================

/// Take at most `max_chars` characters from the start of `s`.
///
/// Always cuts on a char boundary.
#[inline]
pub fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Take at most `max_chars` characters from the end of `s`.
pub fn tail_chars(s: &str, max_chars: usize) -> &str {
    let total = s.chars().count();
    if total <= max_chars {
        return s;
    }
    match s.char_indices().nth(total - max_chars) {
        Some((idx, _)) => &s[idx..],
        None => s,
    }
}

/// Truncate to `max_chars` and append "..." when anything was cut.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    let cut = truncate_chars(s, max_chars);
    if cut.len() < s.len() {
        format!("{}...", cut)
    } else {
        s.to_string()
    }
}

/// Number of characters (not bytes) in `s`.
#[inline]
pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

// =============================================================================
// Fingerprints
// =============================================================================

/// Deterministic content fingerprint (lowercase hex SHA-256).
pub fn fingerprint(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
