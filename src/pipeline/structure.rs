//! Structure Detection Stage
//!
//! Decides whether the response-structure requirements mandate an explicit
//! template. Never fails: any error degrades to "no structure".

use std::sync::Arc;
use tracing::{info, warn};

use super::cache::StageCache;
use super::{ask, prompts};
use crate::ai::{JsonRecovery, LlmGateway, ModelRoute};
use crate::constants::structure::{DEFAULT_CONFIDENCE, MAX_TOKENS};
use crate::types::{
    RequirementItem, Result, RfpError, StructureDetectionResult, StructureType, json_bool,
    json_f64, json_string, json_string_array, json_text,
};

const NO_REQUIREMENTS: &str = "No response structure requirements found in RFP.";
const NO_DESCRIPTION: &str = "No explicit structure detected.";

pub struct StructureStage {
    gateway: Arc<LlmGateway>,
    route: ModelRoute,
    cache: StageCache<String, StructureDetectionResult>,
}

impl StructureStage {
    pub fn new(gateway: Arc<LlmGateway>, route: ModelRoute, cache_capacity: usize) -> Self {
        Self {
            gateway,
            route,
            cache: StageCache::new("structure", cache_capacity),
        }
    }

    pub fn cache(&self) -> &StageCache<String, StructureDetectionResult> {
        &self.cache
    }

    pub async fn run(&self, items: &[RequirementItem]) -> StructureDetectionResult {
        if items.is_empty() {
            info!("Structure: no response-structure requirements, skipping model call");
            return StructureDetectionResult::none(NO_REQUIREMENTS, 1.0);
        }

        let user = prompts::structure_user(items);
        if let Some(cached) = self.cache.get(&user) {
            info!("Structure: cache hit ({} items)", items.len());
            return cached;
        }

        info!("Structure: starting ({} items)", items.len());
        let outcome = match ask(
            &self.gateway,
            &self.route,
            prompts::STRUCTURE_SYSTEM,
            user.clone(),
            0.0,
            Some(MAX_TOKENS),
        )
        .await
        {
            Ok(raw) => parse_structure(&raw),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => {
                info!(
                    "Structure: finished (type={}, sections={}, confidence={:.2})",
                    result.structure_type,
                    result.detected_sections.len(),
                    result.confidence
                );
                self.cache.insert(user, result.clone());
                result
            }
            Err(e) => {
                warn!("Structure: detection failed, assuming none: {}", e);
                StructureDetectionResult::none(format!("Structure detection failed: {}", e), 0.0)
            }
        }
    }
}

pub fn parse_structure(raw: &str) -> Result<StructureDetectionResult> {
    let recovered = JsonRecovery::recover(raw)?;
    if recovered.partial {
        return Err(RfpError::malformed(
            None,
            "structure output could only be partially recovered",
        ));
    }
    let value = recovered.into_value();

    let sections: Vec<String> = json_string_array(&value, "detected_sections")
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let mut description = json_text(&value, "structure_description", " ");
    if description.trim().is_empty() {
        description = NO_DESCRIPTION.to_string();
    }

    Ok(StructureDetectionResult::reconciled(
        json_bool(&value, "has_explicit_structure", false),
        StructureType::from_label(&json_string(&value, "structure_type").unwrap_or_default()),
        sections,
        description,
        json_f64(&value, "confidence", DEFAULT_CONFIDENCE),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::ScriptedProvider;
    use crate::ai::{ProviderKind, RetryPolicy};
    use crate::types::RequirementType;
    use std::time::Duration;

    fn stage(provider: Arc<ScriptedProvider>) -> StructureStage {
        let gateway = LlmGateway::new(RetryPolicy::none(), Duration::from_secs(5))
            .with_provider(provider);
        StructureStage::new(Arc::new(gateway), ModelRoute::openai("structure-model"), 8)
    }

    fn items() -> Vec<RequirementItem> {
        vec![RequirementItem::new(
            "RESP-01",
            RequirementType::Mandatory,
            "Responses must contain: 1. Approach 2. Team 3. Pricing",
            "",
            "format",
        )]
    }

    #[tokio::test]
    async fn test_empty_input_skips_call() {
        let provider = Arc::new(ScriptedProvider::always(ProviderKind::OpenAi, "{}"));
        let result = stage(provider.clone()).run(&[]).await;

        assert!(!result.has_explicit_structure);
        assert_eq!(result.structure_type, StructureType::Unstructured);
        assert_eq!(result.structure_description, NO_REQUIREMENTS);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_explicit_claim_forces_type() {
        let provider = Arc::new(ScriptedProvider::always(
            ProviderKind::OpenAi,
            r#"{"has_explicit_structure": true, "structure_type": "implicit",
                "detected_sections": ["Approach", "Team", "Pricing"], "confidence": 1.7}"#,
        ));
        let stage = stage(provider.clone());
        let result = stage.run(&items()).await;

        assert!(result.has_explicit_structure);
        assert_eq!(result.structure_type, StructureType::Explicit);
        assert_eq!(result.detected_sections.len(), 3);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.structure_description, NO_DESCRIPTION);

        let prompt = provider.last_request().unwrap();
        assert_eq!(prompt.max_tokens, Some(MAX_TOKENS));
        assert!(prompt.messages[1].content.as_text().contains("[MANDATORY] Responses must contain"));

        stage.run(&items()).await;
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_degrades_to_none() {
        let provider = Arc::new(ScriptedProvider::always(ProviderKind::OpenAi, "no idea"));
        let stage = stage(provider.clone());
        let result = stage.run(&items()).await;

        assert!(!result.has_explicit_structure);
        assert_eq!(result.confidence, 0.0);
        assert!(result.structure_description.starts_with("Structure detection failed:"));

        // failures are not cached
        stage.run(&items()).await;
        assert_eq!(provider.calls(), 2);
    }

    #[test]
    fn test_unclaimed_explicit_with_sections_is_implicit() {
        let result = parse_structure(
            r#"{"has_explicit_structure": false, "structure_type": "explicit",
                "detected_sections": ["Overview"], "structure_description": "Loose order"}"#,
        )
        .unwrap();
        assert_eq!(result.structure_type, StructureType::Implicit);
        assert!(!result.has_explicit_structure);
        assert_eq!(result.confidence, DEFAULT_CONFIDENCE);
    }
}
