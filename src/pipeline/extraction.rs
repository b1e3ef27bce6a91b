//! Extraction Stage
//!
//! Language, classification codes and a requirements summary from raw tender
//! text. Unparseable model output never fails the stage: it degrades to an
//! English result with no codes.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cache::StageCache;
use super::{ask, prompts};
use crate::ai::{JsonRecovery, LlmGateway, ModelRoute};
use crate::constants::extraction::{
    CODE_MARKERS, MAX_OUTPUT_TOKENS, MIN_BARE_CODE_DIGITS, MIN_OUTPUT_TOKENS,
};
use crate::types::{ExtractionResult, Result, char_len, json_string, json_string_array, json_text};

/// Placeholder the model copies from the instructions instead of a real code
const OTHER_CODE_PLACEHOLDERS: &[&str] = &["type: value", "type:value", "type : value"];

pub struct ExtractionStage {
    gateway: Arc<LlmGateway>,
    route: ModelRoute,
    cache: StageCache<String, ExtractionResult>,
}

impl ExtractionStage {
    pub fn new(gateway: Arc<LlmGateway>, route: ModelRoute, cache_capacity: usize) -> Self {
        Self {
            gateway,
            route,
            cache: StageCache::new("extraction", cache_capacity),
        }
    }

    pub fn cache(&self) -> &StageCache<String, ExtractionResult> {
        &self.cache
    }

    /// Extract facts from `text`. Only provider failures are returned as errors.
    pub async fn run(&self, text: &str) -> Result<ExtractionResult> {
        let key = text.to_string();
        if let Some(cached) = self.cache.get(&key) {
            info!("Extraction: cache hit (input_chars={})", char_len(text));
            return Ok(cached);
        }

        info!("Extraction: starting (input_chars={})", char_len(text));
        let user = prompts::extraction_user(text);
        let max_tokens = prompts::output_budget(
            prompts::EXTRACTION_SYSTEM,
            &user,
            500,
            MIN_OUTPUT_TOKENS,
            MAX_OUTPUT_TOKENS,
        );

        let raw = ask(
            &self.gateway,
            &self.route,
            prompts::EXTRACTION_SYSTEM,
            user,
            0.0,
            Some(max_tokens),
        )
        .await?;

        let result = parse_extraction(&raw);
        info!(
            "Extraction: finished (lang={}, cpv={}, other_codes={})",
            result.language,
            result.cpv_codes.len(),
            result.other_codes.len()
        );

        self.cache.insert(key, result.clone());
        Ok(result)
    }
}

/// Build an `ExtractionResult` from raw model output, falling back on failure.
pub fn parse_extraction(raw: &str) -> ExtractionResult {
    let recovered = match JsonRecovery::recover(raw) {
        Ok(recovered) => recovered,
        Err(e) => {
            warn!("Extraction: unusable model output, using fallback: {}", e);
            return ExtractionResult::fallback();
        }
    };
    if recovered.partial {
        warn!("Extraction: partial recovery, missing fields take defaults");
    }

    let value = recovered.into_value();
    let language = json_string(&value, "language")
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .unwrap_or_else(|| "en".to_string());

    if value.get("metadata").is_some() {
        debug!("Extraction: ignoring model-supplied metadata");
    }

    ExtractionResult {
        language,
        cpv_codes: filter_cpv_codes(json_string_array(&value, "cpv_codes")),
        other_codes: filter_other_codes(json_string_array(&value, "other_codes")),
        key_requirements_summary: json_text(&value, "key_requirements_summary", "\n"),
        ..ExtractionResult::fallback()
    }
}

/// Drop bare digit strings that carry no classification marker.
fn filter_cpv_codes(codes: Vec<String>) -> Vec<String> {
    codes
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|code| {
            if code.is_empty() {
                return false;
            }
            let lower = code.to_lowercase();
            if CODE_MARKERS.iter().any(|m| lower.contains(m)) {
                return true;
            }
            let bare = code.len() >= MIN_BARE_CODE_DIGITS && code.chars().all(|c| c.is_ascii_digit());
            if bare {
                debug!("Extraction: dropping unlabelled code '{}'", code);
            }
            !bare
        })
        .collect()
}

fn filter_other_codes(codes: Vec<String>) -> Vec<String> {
    codes
        .into_iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty() && !OTHER_CODE_PLACEHOLDERS.contains(&c.to_lowercase().as_str()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::ScriptedProvider;
    use crate::ai::{ProviderKind, RetryPolicy};
    use std::time::Duration;

    fn stage(provider: Arc<ScriptedProvider>) -> ExtractionStage {
        let gateway = LlmGateway::new(RetryPolicy::none(), Duration::from_secs(5))
            .with_provider(provider);
        ExtractionStage::new(Arc::new(gateway), ModelRoute::openai("extract-model"), 8)
    }

    #[tokio::test]
    async fn test_malformed_output_falls_back() {
        let provider = Arc::new(ScriptedProvider::always(ProviderKind::OpenAi, "not json at all"));
        let result = stage(provider.clone()).run("Tender text").await.unwrap();

        assert_eq!(result.language, "en");
        assert!(result.cpv_codes.is_empty());
        assert!(result.other_codes.is_empty());
        assert_eq!(result.key_requirements_summary, "");
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_second_run_is_cache_hit() {
        let provider = Arc::new(ScriptedProvider::always(
            ProviderKind::OpenAi,
            r#"{"language": "de", "cpv_codes": ["CPV 72000000-5"]}"#,
        ));
        let stage = stage(provider.clone());

        let first = stage.run("Ausschreibung").await.unwrap();
        let second = stage.run("Ausschreibung").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);
        assert_eq!(stage.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_provider_error_propagates() {
        let provider = Arc::new(ScriptedProvider::new(
            ProviderKind::OpenAi,
            vec![Err(crate::types::RfpError::LlmApi("boom".to_string()))],
        ));
        assert!(stage(provider).run("text").await.is_err());
    }

    #[test]
    fn test_parse_filters_codes() {
        let raw = r#"```json
        {
          "language": "fr",
          "translated_text": "should never survive",
          "cpv_codes": ["72000000", "CPV: 48000000-8", "NUTS code FR101", "12345"],
          "other_codes": ["TYPE: VALUE", "Tender ID: 2024/S 123", ""],
          "key_requirements_summary": ["- hosting", "- support"],
          "metadata": {"pages": 40},
        }
        ```"#;
        let result = parse_extraction(raw);

        assert_eq!(result.language, "fr");
        assert_eq!(result.cpv_codes, vec!["CPV: 48000000-8", "NUTS code FR101", "12345"]);
        assert_eq!(result.other_codes, vec!["Tender ID: 2024/S 123"]);
        assert_eq!(result.key_requirements_summary, "- hosting\n- support");
        assert!(result.translated_text.is_empty());
        assert!(result.raw_structured.is_empty());
    }

    #[test]
    fn test_parse_partial_keeps_language() {
        let raw = r#"{"language": "es", "cpv_codes": ["CPV 1"], "key_requirements_summary": "cut off"#;
        let result = parse_extraction(raw);
        assert_eq!(result.language, "es");
        assert_eq!(result.cpv_codes, vec!["CPV 1"]);
        assert_eq!(result.key_requirements_summary, "");
    }
}
