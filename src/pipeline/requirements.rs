//! Requirements Stage
//!
//! Splits scoped tender text into solution requirements (what the buyer
//! wants) and response-structure requirements (how to answer). There is no
//! safe default here: unparseable output fails the stage.

use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, warn};

use super::cache::StageCache;
use super::{ask, prompts};
use crate::ai::{JsonRecovery, LlmGateway, ModelRoute};
use crate::types::{
    ExtractionResult, RequirementItem, RequirementType, RequirementsResult, Result, RfpError,
    char_len, json_string, json_text,
};

const SOLUTION_PREFIX: &str = "SOL";
const RESPONSE_PREFIX: &str = "RESP";

pub struct RequirementsStage {
    gateway: Arc<LlmGateway>,
    route: ModelRoute,
    cache: StageCache<String, RequirementsResult>,
}

impl RequirementsStage {
    pub fn new(gateway: Arc<LlmGateway>, route: ModelRoute, cache_capacity: usize) -> Self {
        Self {
            gateway,
            route,
            cache: StageCache::new("requirements", cache_capacity),
        }
    }

    pub fn cache(&self) -> &StageCache<String, RequirementsResult> {
        &self.cache
    }

    /// Split `text` using `extraction` as context. Cached on both.
    pub async fn run(&self, text: &str, extraction: &ExtractionResult) -> Result<RequirementsResult> {
        let info = structured_info(extraction);
        let key = format!("{}\u{0}{}", text, info);
        if let Some(cached) = self.cache.get(&key) {
            info!("Requirements: cache hit (input_chars={})", char_len(text));
            return Ok(cached);
        }

        info!("Requirements: starting (input_chars={})", char_len(text));
        let raw = ask(
            &self.gateway,
            &self.route,
            prompts::REQUIREMENTS_SYSTEM,
            prompts::requirements_user(text, &info),
            0.0,
            None,
        )
        .await?;

        let result = parse_requirements(&raw)?;
        info!(
            "Requirements: finished (solution={}, response_structure={})",
            result.solution_requirements.len(),
            result.response_structure_requirements.len()
        );

        self.cache.insert(key, result.clone());
        Ok(result)
    }
}

/// Extraction context as compact JSON with sorted keys.
fn structured_info(extraction: &ExtractionResult) -> String {
    json!({
        "language": extraction.language,
        "cpv_codes": extraction.cpv_codes,
        "other_codes": extraction.other_codes,
        "key_requirements_summary": extraction.key_requirements_summary,
    })
    .to_string()
}

pub fn parse_requirements(raw: &str) -> Result<RequirementsResult> {
    let recovered = JsonRecovery::recover(raw)?;
    if recovered.partial {
        return Err(RfpError::malformed(
            None,
            "requirements output could only be partially recovered",
        ));
    }

    let value = recovered.into_value();
    let has_solution = value.get("solution_requirements").is_some();
    let has_response = value.get("response_structure_requirements").is_some();
    if !has_solution && !has_response {
        return Err(RfpError::malformed(
            None,
            "requirements output has neither solution nor response-structure lists",
        ));
    }

    Ok(RequirementsResult {
        solution_requirements: items(&value, "solution_requirements", SOLUTION_PREFIX),
        response_structure_requirements: items(
            &value,
            "response_structure_requirements",
            RESPONSE_PREFIX,
        ),
        notes: json_text(&value, "notes", "\n"),
        structure_detection: None,
    })
}

fn items(value: &Value, key: &str, prefix: &str) -> Vec<RequirementItem> {
    let Some(raw_items) = value.get(key).and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut result = Vec::with_capacity(raw_items.len());
    let mut skipped = 0;
    for item in raw_items {
        let next_id = || format!("{}-{:02}", prefix, result.len() + 1);
        let parsed = match item {
            Value::String(text) if !text.trim().is_empty() => Some(RequirementItem::new(
                next_id(),
                RequirementType::Unspecified,
                text.trim(),
                "",
                "",
            )),
            Value::Object(_) => {
                let source = json_string(item, "source_text").unwrap_or_default();
                if source.trim().is_empty() {
                    None
                } else {
                    let id = json_string(item, "id")
                        .map(|id| id.trim().to_string())
                        .filter(|id| !id.is_empty())
                        .unwrap_or_else(next_id);
                    Some(RequirementItem::new(
                        id,
                        RequirementType::from_label(
                            &json_string(item, "type").unwrap_or_default(),
                        ),
                        source.trim(),
                        json_string(item, "normalized_text").unwrap_or_default(),
                        json_string(item, "category").unwrap_or_default(),
                    ))
                }
            }
            _ => None,
        };

        match parsed {
            Some(req) => result.push(req),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!("Requirements: skipped {} {} item(s) without source text", skipped, key);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::ScriptedProvider;
    use crate::ai::{ProviderKind, RetryPolicy};
    use std::time::Duration;

    const OUTPUT: &str = r#"{
        "solution_requirements": [
            {"id": "SR-1", "type": "Mandatory", "source_text": "The service shall be hosted in the EU.", "normalized_text": "EU hosting", "category": "hosting"},
            {"type": "must", "source_text": "Provide 24/7 support.", "category": "support"},
            {"id": "SR-9", "source_text": "   "},
            "Offer an API for case data."
        ],
        "response_structure_requirements": [
            {"source_text": "Responses must follow sections 1-4.", "normalized_text": "", "type": "mandatory"}
        ],
        "notes": ["two lists", "one note"]
    }"#;

    fn stage(provider: Arc<ScriptedProvider>) -> RequirementsStage {
        let gateway = LlmGateway::new(RetryPolicy::none(), Duration::from_secs(5))
            .with_provider(provider);
        RequirementsStage::new(Arc::new(gateway), ModelRoute::openai("req-model"), 8)
    }

    #[test]
    fn test_parse_normalizes_items() {
        let result = parse_requirements(OUTPUT).unwrap();
        let sol = &result.solution_requirements;

        assert_eq!(sol.len(), 3);
        assert_eq!(sol[0].id, "SR-1");
        assert_eq!(sol[0].req_type, RequirementType::Mandatory);
        assert_eq!(sol[1].id, "SOL-02");
        assert_eq!(sol[1].req_type, RequirementType::Unspecified);
        assert_eq!(sol[1].normalized_text, "Provide 24/7 support.");
        assert_eq!(sol[2].id, "SOL-03");
        assert_eq!(sol[2].source_text, "Offer an API for case data.");

        let resp = &result.response_structure_requirements;
        assert_eq!(resp[0].id, "RESP-01");
        assert_eq!(resp[0].normalized_text, resp[0].source_text);
        assert_eq!(result.notes, "two lists\none note");
    }

    #[test]
    fn test_normalized_text_never_empty() {
        let result = parse_requirements(OUTPUT).unwrap();
        for item in result
            .solution_requirements
            .iter()
            .chain(result.response_structure_requirements.iter())
        {
            assert!(!item.source_text.is_empty());
            assert!(!item.normalized_text.is_empty());
        }
    }

    #[test]
    fn test_parse_failure_is_error() {
        assert!(matches!(
            parse_requirements("I could not find requirements."),
            Err(RfpError::MalformedOutput { .. })
        ));
        assert!(parse_requirements(r#"{"notes": "nothing"}"#).is_err());
    }

    #[tokio::test]
    async fn test_run_propagates_parse_failure() {
        let provider = Arc::new(ScriptedProvider::always(ProviderKind::OpenAi, "no json"));
        let err = stage(provider)
            .run("text", &ExtractionResult::fallback())
            .await
            .unwrap_err();
        assert!(matches!(err, RfpError::MalformedOutput { .. }));
    }

    #[tokio::test]
    async fn test_cache_key_includes_extraction() {
        let provider = Arc::new(ScriptedProvider::always(ProviderKind::OpenAi, OUTPUT));
        let stage = stage(provider.clone());
        let en = ExtractionResult::fallback();
        let de = ExtractionResult {
            language: "de".to_string(),
            ..ExtractionResult::fallback()
        };

        stage.run("text", &en).await.unwrap();
        stage.run("text", &en).await.unwrap();
        assert_eq!(provider.calls(), 1);

        stage.run("text", &de).await.unwrap();
        assert_eq!(provider.calls(), 2);

        let prompt = provider.last_request().unwrap().messages[1].content.as_text();
        assert!(prompt.contains("=== STRUCTURED INFO (JSON) ==="));
        assert!(prompt.contains(r#""language":"de""#));
    }
}
