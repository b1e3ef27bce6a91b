//! Memory record schema and stage snapshot builders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::constants::memory::SNAPSHOT_EXCERPT_CHARS;
use crate::types::{
    BuildQuery, PreprocessResult, RequirementsResult, Stage, truncate_chars,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryMessage {
    pub role: String,
    pub content: String,
}

impl MemoryMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// One line of the store. Appended once, never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    /// Fingerprint of the source text
    pub user_id: String,
    pub stage: Stage,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub messages: Vec<MemoryMessage>,
    pub created_at: DateTime<Utc>,
}

impl MemoryRecord {
    /// Message contents joined by newlines; the text that gets scored.
    pub fn content(&self) -> String {
        self.messages
            .iter()
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// What a stage hands to the store
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPayload {
    pub language: Option<String>,
    pub messages: Vec<MemoryMessage>,
}

impl MemoryPayload {
    /// Summary as the user turn, a bounded JSON snapshot as the assistant turn.
    pub fn preprocess(result: &PreprocessResult) -> Self {
        let summary = if result.key_requirements_summary.trim().is_empty() {
            "RFP preprocess summary".to_string()
        } else {
            result.key_requirements_summary.clone()
        };
        let snapshot = json!({
            "key_requirements_summary": summary,
            "language": result.language,
            "removed_text_length": result.removed_text.chars().count(),
            "cleaned_text_excerpt": truncate_chars(&result.cleaned_text, SNAPSHOT_EXCERPT_CHARS),
        });
        Self {
            language: Some(result.language.clone()),
            messages: vec![
                MemoryMessage::user(summary),
                MemoryMessage::assistant(snapshot.to_string()),
            ],
        }
    }

    pub fn requirements(result: &RequirementsResult, language: Option<&str>) -> Self {
        let summary = if result.notes.trim().is_empty() {
            "RFP requirements summary".to_string()
        } else {
            result.notes.clone()
        };
        let listing = |items: &[crate::types::RequirementItem]| -> Vec<Value> {
            items
                .iter()
                .map(|r| json!({"id": r.id, "type": r.req_type, "text": r.normalized_text}))
                .collect()
        };
        let mut snapshot = json!({
            "notes": result.notes,
            "solution_requirements": listing(&result.solution_requirements),
            "response_structure_requirements": listing(&result.response_structure_requirements),
        });
        let mut text = snapshot.to_string();
        if text.chars().count() > SNAPSHOT_EXCERPT_CHARS {
            // Keep the record bounded; counts survive, listings do not
            snapshot = json!({
                "notes": result.notes,
                "solution_count": result.solution_requirements.len(),
                "response_structure_count": result.response_structure_requirements.len(),
                "excerpt": truncate_chars(&text, SNAPSHOT_EXCERPT_CHARS),
            });
            text = snapshot.to_string();
        }
        Self {
            language: language.map(String::from),
            messages: vec![MemoryMessage::user(summary), MemoryMessage::assistant(text)],
        }
    }

    pub fn build_query(query: &BuildQuery) -> Self {
        let language = query
            .extraction_data
            .get("language")
            .and_then(|v| v.as_str())
            .map(String::from);
        let snapshot = json!({
            "extraction_data": query.extraction_data,
            "query_excerpt": truncate_chars(&query.query_text, SNAPSHOT_EXCERPT_CHARS),
        });
        Self {
            language,
            messages: vec![
                MemoryMessage::user(query.solution_requirements_summary.clone()),
                MemoryMessage::assistant(snapshot.to_string()),
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RequirementItem, RequirementType};

    #[test]
    fn test_preprocess_snapshot_is_bounded() {
        let result = PreprocessResult {
            language: "de".to_string(),
            cleaned_text: "x".repeat(10_000),
            removed_text: "abc".to_string(),
            key_requirements_summary: String::new(),
            comparison_agreement: true,
            comparison_notes: String::new(),
            rationale: String::new(),
        };
        let payload = MemoryPayload::preprocess(&result);

        assert_eq!(payload.messages[0].content, "RFP preprocess summary");
        let snapshot: Value = serde_json::from_str(&payload.messages[1].content).unwrap();
        assert_eq!(snapshot["removed_text_length"], 3);
        assert_eq!(snapshot["language"], "de");
        assert_eq!(
            snapshot["cleaned_text_excerpt"].as_str().unwrap().len(),
            SNAPSHOT_EXCERPT_CHARS
        );
    }

    #[test]
    fn test_requirements_snapshot_lists_items() {
        let result = RequirementsResult {
            solution_requirements: vec![RequirementItem::new(
                "SOL-01",
                RequirementType::Mandatory,
                "Host in the EU.",
                "",
                "hosting",
            )],
            notes: "One hosting constraint".to_string(),
            ..Default::default()
        };
        let payload = MemoryPayload::requirements(&result, Some("en"));
        assert_eq!(payload.messages[0].content, "One hosting constraint");
        assert!(payload.messages[1].content.contains("Host in the EU."));
        assert_eq!(payload.language.as_deref(), Some("en"));
    }

    #[test]
    fn test_record_content_joins_messages() {
        let record = MemoryRecord {
            id: "1".to_string(),
            user_id: "u".to_string(),
            stage: Stage::Preprocess,
            metadata: Map::new(),
            messages: vec![MemoryMessage::user("a"), MemoryMessage::assistant("b")],
            created_at: Utc::now(),
        };
        assert_eq!(record.content(), "a\nb");
    }
}
