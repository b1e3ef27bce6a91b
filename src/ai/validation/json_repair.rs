//! JSON Recovery
//!
//! Graduated recovery of structured model output.
//!
//! Ordered attempts, first success wins:
//! 1. Strip markdown code fences and control characters
//! 2. Keep the span from the first `{` to the last `}`
//! 3. Drop trailing commas before `}` / `]`
//! 4. Parse
//! 5. Field-level recovery of `language` and `cpv_codes`
//! 6. `MalformedOutput` with the byte offset of the parse failure
//!
//! Partial recovery never invents a field it cannot read back exactly.
//! Callers supply their own defaults for anything omitted.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::{debug, warn};

use crate::types::{Result, RfpError};

static CONTROL_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[\x00-\x08\x0b-\x0c\x0e-\x1f\x7f-\x9f]").expect("valid control-char pattern")
});
static OBJECT_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{.*\}").expect("valid object pattern"));
static ARRAY_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("valid array pattern"));
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid trailing-comma pattern"));
static LANGUAGE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""language"\s*:\s*"([^"]+)""#).expect("valid language pattern")
});
static CPV_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"cpv_codes"\s*:\s*(\[.*?\])"#).expect("valid cpv pattern")
});

// =============================================================================
// Convenience Functions
// =============================================================================

/// Recover a JSON object from model output.
pub fn recover_json(content: &str) -> Result<Recovered> {
    JsonRecovery::recover(content)
}

/// Recover a JSON object as a plain `Value`, ignoring the partial flag.
pub fn recover_value(content: &str) -> Result<Value> {
    JsonRecovery::recover(content).map(Recovered::into_value)
}

// =============================================================================
// Recovered
// =============================================================================

/// Outcome of a successful recovery
#[derive(Debug, Clone, PartialEq)]
pub struct Recovered {
    pub value: Map<String, Value>,
    /// True when only a subset of fields was salvaged by field-level recovery
    pub partial: bool,
}

impl Recovered {
    pub fn into_value(self) -> Value {
        Value::Object(self.value)
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.value.clone())
    }
}

// =============================================================================
// JsonRecovery
// =============================================================================

pub struct JsonRecovery;

impl JsonRecovery {
    /// Recover a top-level object, see module docs for the attempt order.
    pub fn recover(raw: &str) -> Result<Recovered> {
        let cleaned = Self::clean(raw);
        let candidate = Self::object_candidate(&cleaned);

        match serde_json::from_str::<Value>(&candidate) {
            Ok(Value::Object(map)) => {
                return Ok(Recovered {
                    value: map,
                    partial: false,
                });
            }
            Ok(other) => {
                debug!("Model output parsed as non-object JSON ({})", type_name(&other));
                if let Some(map) = Self::recover_fields(&cleaned) {
                    return Ok(Recovered {
                        value: map,
                        partial: true,
                    });
                }
                Err(RfpError::malformed(
                    None,
                    format!("expected a JSON object, found {}", type_name(&other)),
                ))
            }
            Err(e) => {
                if let Some(map) = Self::recover_fields(&cleaned) {
                    warn!(
                        "JSON parse failed ({}), recovered fields: {:?}",
                        e,
                        map.keys().collect::<Vec<_>>()
                    );
                    return Ok(Recovered {
                        value: map,
                        partial: true,
                    });
                }
                Err(RfpError::malformed(byte_offset(&candidate, &e), e.to_string()))
            }
        }
    }

    /// Recover an array payload: either a top-level array or `{field: [...]}`.
    pub fn recover_array(raw: &str, field: &str) -> Result<Vec<Value>> {
        let cleaned = Self::clean(raw);
        let direct = TRAILING_COMMA.replace_all(&cleaned, "$1");

        match serde_json::from_str::<Value>(&direct) {
            Ok(Value::Array(items)) => return Ok(items),
            Ok(Value::Object(map)) => {
                if let Some(Value::Array(items)) = map.get(field) {
                    return Ok(items.clone());
                }
            }
            _ => {}
        }

        // Object wrapper surrounded by prose
        let object = Self::object_candidate(&cleaned);
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&object)
            && let Some(Value::Array(items)) = map.get(field)
        {
            return Ok(items.clone());
        }

        // Bare array surrounded by prose
        let span = ARRAY_SPAN
            .find(&cleaned)
            .map(|m| m.as_str())
            .unwrap_or(&cleaned);
        let candidate = TRAILING_COMMA.replace_all(span, "$1");
        match serde_json::from_str::<Value>(&candidate) {
            Ok(Value::Array(items)) => Ok(items),
            Ok(other) => Err(RfpError::malformed(
                None,
                format!("expected an array for '{}', found {}", field, type_name(&other)),
            )),
            Err(e) => Err(RfpError::malformed(byte_offset(&candidate, &e), e.to_string())),
        }
    }

    // -------------------------------------------------------------------------
    // Steps
    // -------------------------------------------------------------------------

    /// Step 1: fences and control characters
    fn clean(raw: &str) -> String {
        let stripped = Self::strip_code_fences(raw.trim());
        CONTROL_CHARS.replace_all(stripped, "").into_owned()
    }

    fn strip_code_fences(s: &str) -> &str {
        let mut result = s;
        if let Some(rest) = result.strip_prefix("```json") {
            result = rest;
        } else if let Some(rest) = result.strip_prefix("```") {
            result = rest;
        }
        if let Some(rest) = result.trim_end().strip_suffix("```") {
            result = rest;
        }
        result.trim()
    }

    /// Steps 2 and 3: greedy object span, trailing commas removed
    fn object_candidate(cleaned: &str) -> String {
        let span = OBJECT_SPAN
            .find(cleaned)
            .map(|m| m.as_str())
            .unwrap_or(cleaned);
        TRAILING_COMMA.replace_all(span, "$1").into_owned()
    }

    /// Step 5: critical fields only
    fn recover_fields(cleaned: &str) -> Option<Map<String, Value>> {
        let mut map = Map::new();

        if let Some(caps) = LANGUAGE_FIELD.captures(cleaned) {
            map.insert("language".to_string(), Value::String(caps[1].to_string()));
        }

        if let Some(caps) = CPV_FIELD.captures(cleaned) {
            let array = TRAILING_COMMA.replace_all(&caps[1], "$1");
            let codes = match serde_json::from_str::<Value>(&array) {
                Ok(Value::Array(items)) => items,
                _ => Vec::new(),
            };
            map.insert("cpv_codes".to_string(), Value::Array(codes));
        }

        (!map.is_empty()).then_some(map)
    }
}

/// Byte offset of a serde_json error within `input`, from its 1-based line/column.
fn byte_offset(input: &str, err: &serde_json::Error) -> Option<usize> {
    let (line, column) = (err.line(), err.column());
    if line == 0 {
        return None;
    }
    let line_start: usize = input
        .split_inclusive('\n')
        .take(line - 1)
        .map(str::len)
        .sum();
    Some((line_start + column.saturating_sub(1)).min(input.len()))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_parse_valid_json() {
        let recovered = JsonRecovery::recover(r#"{"key": "value"}"#).unwrap();
        assert!(!recovered.partial);
        assert_eq!(recovered.value["key"], "value");
    }

    #[test]
    fn test_strip_code_fences() {
        let input = "```json\n{\"key\": \"value\"}\n```";
        let recovered = JsonRecovery::recover(input).unwrap();
        assert_eq!(recovered.value["key"], "value");

        let bare = "```\n{\"key\": 1}\n```";
        assert_eq!(JsonRecovery::recover(bare).unwrap().value["key"], 1);
    }

    #[test]
    fn test_fix_trailing_comma() {
        let input = r#"{"codes": ["72000000-5", "48000000-8",], "n": 2,}"#;
        let recovered = JsonRecovery::recover(input).unwrap();
        assert!(!recovered.partial);
        assert_eq!(recovered.value["codes"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_control_chars_removed() {
        let input = "{\"language\": \"de\u{0001}\", \"x\u{7f}\": 1}";
        let recovered = JsonRecovery::recover(input).unwrap();
        assert_eq!(recovered.value["language"], "de");
        assert_eq!(recovered.value["x"], 1);
    }

    #[test]
    fn test_newlines_and_tabs_survive() {
        let input = "{\n\t\"a\": 1\n}";
        assert_eq!(JsonRecovery::recover(input).unwrap().value["a"], 1);
    }

    #[test]
    fn test_extract_from_prose() {
        let input = r#"Here is the result:
{"language": "en", "cpv_codes": []}
Let me know if you need more."#;
        let recovered = JsonRecovery::recover(input).unwrap();
        assert!(!recovered.partial);
        assert_eq!(recovered.value["language"], "en");
    }

    #[test]
    fn test_partial_recovery_on_truncation() {
        let input = r#"{"language": "fr", "cpv_codes": ["72000000-5"], "translated_text": "Le march"#;
        let recovered = JsonRecovery::recover(input).unwrap();
        assert!(recovered.partial);
        assert_eq!(recovered.value["language"], "fr");
        assert_eq!(recovered.value["cpv_codes"], json!(["72000000-5"]));
        assert!(!recovered.value.contains_key("translated_text"));
    }

    #[test]
    fn test_partial_recovery_bad_cpv_array() {
        let input = r#"{"language": "es", "cpv_codes": [72000000-5 oops], "#;
        let recovered = JsonRecovery::recover(input).unwrap();
        assert!(recovered.partial);
        assert_eq!(recovered.value["cpv_codes"], json!([]));
    }

    #[test]
    fn test_unrecoverable_reports_offset() {
        let err = JsonRecovery::recover("not json at all").unwrap_err();
        match err {
            RfpError::MalformedOutput { offset, .. } => assert!(offset.is_some_and(|o| o < 4)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_offset_on_later_line() {
        let err = JsonRecovery::recover("{\n  \"a\": 1\n  \"b\": 2\n}").unwrap_err();
        match err {
            RfpError::MalformedOutput {
                offset: Some(offset),
                ..
            } => assert!(offset >= 10, "offset {offset} should point at line 3"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_object_is_malformed() {
        let err = JsonRecovery::recover("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, RfpError::MalformedOutput { .. }));
    }

    #[test]
    fn test_recover_array_forms() {
        let top = JsonRecovery::recover_array("```json\n[{\"q\": 1},]\n```", "questions").unwrap();
        assert_eq!(top.len(), 1);

        let wrapped =
            JsonRecovery::recover_array(r#"{"questions": [{"q": 1}, {"q": 2}]}"#, "questions")
                .unwrap();
        assert_eq!(wrapped.len(), 2);

        let prose =
            JsonRecovery::recover_array("Sure! [{\"q\": 1}] Hope that helps", "questions").unwrap();
        assert_eq!(prose.len(), 1);

        assert!(JsonRecovery::recover_array("nothing here", "questions").is_err());
    }

    fn add_trailing_commas(json: &str) -> String {
        json.replace(']', ",\n]").replace('}', " ,}")
    }

    proptest! {
        #[test]
        fn prop_fenced_trailing_commas_roundtrip(
            map in prop::collection::btree_map("[a-z]{1,8}", prop::collection::vec(any::<i32>(), 0..4), 1..6),
            label in "[a-z ]{0,12}",
        ) {
            let mut object = serde_json::Map::new();
            for (k, v) in &map {
                object.insert(k.clone(), json!(v));
            }
            object.insert("label".to_string(), json!(label));
            let compact = serde_json::to_string(&Value::Object(object.clone())).unwrap();

            let wrapped = format!("```json\n{}\n```", add_trailing_commas(&compact));
            let recovered = JsonRecovery::recover(&wrapped).unwrap();

            prop_assert!(!recovered.partial);
            prop_assert_eq!(recovered.value, object);
        }
    }
}
