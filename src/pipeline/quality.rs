//! Quality Assessment
//!
//! Reviewer-style scoring of a drafted response against its requirement.
//! Never fails: an unusable review yields a neutral assessment that names
//! the failure.

use std::sync::Arc;
use tracing::{info, warn};

use super::cache::StageCache;
use super::{ask, prompts};
use crate::ai::{JsonRecovery, LlmGateway, ModelRoute};
use crate::constants::quality::{MAX_TOKENS, NEUTRAL_SCORE};
use crate::types::{
    Completeness, QualityAssessment, Relevance, RequirementItem, Result, json_f64, json_string,
    json_string_array,
};

pub struct QualityStage {
    gateway: Arc<LlmGateway>,
    route: ModelRoute,
    cache: StageCache<(String, String), QualityAssessment>,
}

impl QualityStage {
    pub fn new(gateway: Arc<LlmGateway>, route: ModelRoute, cache_capacity: usize) -> Self {
        Self {
            gateway,
            route,
            cache: StageCache::new("quality", cache_capacity),
        }
    }

    pub async fn assess(&self, requirement: &RequirementItem, response: &str) -> QualityAssessment {
        let key = (requirement.source_text.clone(), response.to_string());
        if let Some(cached) = self.cache.get(&key) {
            info!("Quality ({}): cache hit", requirement.id);
            return cached;
        }

        match self.review(&requirement.source_text, response).await {
            Ok(assessment) => {
                info!(
                    "Quality ({}): score={}, completeness={:?}, relevance={:?}",
                    requirement.id, assessment.score, assessment.completeness, assessment.relevance
                );
                self.cache.insert(key, assessment.clone());
                assessment
            }
            Err(e) => {
                warn!("Quality ({}): assessment failed: {}", requirement.id, e);
                QualityAssessment::failed(e)
            }
        }
    }

    async fn review(&self, requirement: &str, response: &str) -> Result<QualityAssessment> {
        let raw = ask(
            &self.gateway,
            &self.route,
            prompts::QUALITY_SYSTEM,
            prompts::quality_user(requirement, response),
            0.0,
            Some(MAX_TOKENS),
        )
        .await?;
        let value = JsonRecovery::recover(&raw)?.into_value();

        let score = json_f64(&value, "score", f64::from(NEUTRAL_SCORE))
            .clamp(0.0, 100.0)
            .round() as u8;
        let completeness =
            match Completeness::from_label(&json_string(&value, "completeness").unwrap_or_default()) {
                Completeness::Unknown => Completeness::Partial,
                other => other,
            };
        let relevance =
            match Relevance::from_label(&json_string(&value, "relevance").unwrap_or_default()) {
                Relevance::Unknown => Relevance::Medium,
                other => other,
            };

        Ok(QualityAssessment {
            score,
            completeness,
            relevance,
            issues: json_string_array(&value, "issues"),
            suggestions: json_string_array(&value, "suggestions"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::ScriptedProvider;
    use crate::ai::{ProviderKind, RetryPolicy};
    use crate::types::RequirementType;
    use std::time::Duration;

    fn stage(provider: Arc<ScriptedProvider>) -> QualityStage {
        let gateway = LlmGateway::new(RetryPolicy::none(), Duration::from_secs(5))
            .with_provider(provider);
        QualityStage::new(Arc::new(gateway), ModelRoute::openai("quality-model"), 8)
    }

    fn requirement() -> RequirementItem {
        RequirementItem::new("SOL-01", RequirementType::Mandatory, "Host in the EU.", "", "hosting")
    }

    #[tokio::test]
    async fn test_assessment_clamped_and_cached() {
        let provider = Arc::new(ScriptedProvider::always(
            ProviderKind::OpenAi,
            r#"{"score": 130.4, "completeness": "complete", "relevance": "sideways",
                "issues": ["no SLA"], "suggestions": ["add SLA"]}"#,
        ));
        let stage = stage(provider.clone());
        let first = stage.assess(&requirement(), "We host in Frankfurt.").await;

        assert_eq!(first.score, 100);
        assert_eq!(first.completeness, Completeness::Complete);
        assert_eq!(first.relevance, Relevance::Medium);
        assert_eq!(first.issues, vec!["no SLA"]);

        let second = stage.assess(&requirement(), "We host in Frankfurt.").await;
        assert_eq!(first, second);
        assert_eq!(provider.calls(), 1);

        stage.assess(&requirement(), "Different draft.").await;
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_neutral_and_not_cached() {
        let provider = Arc::new(ScriptedProvider::always(ProviderKind::OpenAi, "great answer!"));
        let stage = stage(provider.clone());
        let result = stage.assess(&requirement(), "draft").await;

        assert_eq!(result.score, NEUTRAL_SCORE);
        assert_eq!(result.completeness, Completeness::Unknown);
        assert_eq!(result.relevance, Relevance::Unknown);
        assert!(result.issues[0].starts_with("Quality assessment failed"));

        stage.assess(&requirement(), "draft").await;
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_fields_take_defaults() {
        let provider = Arc::new(ScriptedProvider::always(ProviderKind::OpenAi, "{}"));
        let result = stage(provider).assess(&requirement(), "draft").await;
        assert_eq!(result.score, NEUTRAL_SCORE);
        assert_eq!(result.completeness, Completeness::Partial);
        assert!(result.issues.is_empty());
    }
}
