//! Clarification Questions
//!
//! Asks, per solution requirement, what the bidder must supply before a
//! credible response can be drafted. Topics the company profile already
//! answers are filtered out.

use futures::future::join_all;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cache::StageCache;
use super::query::NO_STRUCTURE_REQUIREMENTS;
use super::{ask, prompts};
use crate::ai::{JsonRecovery, LlmGateway, ModelRoute};
use crate::constants::questions::{MAX_PER_REQUIREMENT, MAX_TOKENS};
use crate::knowledge::CompanyProfile;
use crate::types::{
    Priority, Question, RequirementItem, RequirementsResult, Result, json_string,
};

const DEFAULT_CATEGORY: &str = "general";

pub struct QuestionStage {
    gateway: Arc<LlmGateway>,
    route: ModelRoute,
    company: Option<CompanyProfile>,
    cache: StageCache<String, Vec<Question>>,
}

impl QuestionStage {
    pub fn new(gateway: Arc<LlmGateway>, route: ModelRoute, cache_capacity: usize) -> Self {
        Self {
            gateway,
            route,
            company: None,
            cache: StageCache::new("questions", cache_capacity),
        }
    }

    pub fn with_company(mut self, company: CompanyProfile) -> Self {
        self.company = Some(company);
        self
    }

    /// Questions for every solution requirement, highest priority first.
    ///
    /// A requirement whose call fails contributes no questions.
    pub async fn run(&self, requirements: &RequirementsResult) -> Vec<Question> {
        let solution = &requirements.solution_requirements;
        info!("Questions: starting ({} requirements)", solution.len());

        let structure_summary = if requirements.response_structure_requirements.is_empty() {
            NO_STRUCTURE_REQUIREMENTS.to_string()
        } else {
            requirements
                .response_structure_requirements
                .iter()
                .map(|r| r.source_text.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        };
        let known_info = self
            .company
            .as_ref()
            .map(CompanyProfile::format_for_prompt)
            .unwrap_or_default();

        let tasks = solution.iter().map(|item| {
            let others = solution
                .iter()
                .filter(|other| other.id != item.id)
                .map(|other| format!("[{}] {}", other.id, other.normalized_text))
                .collect::<Vec<_>>()
                .join("\n");
            let user = prompts::question_user(item, &others, &structure_summary, &known_info);
            async move { (item, self.for_requirement(item, user).await) }
        });

        let mut questions = Vec::new();
        for (item, outcome) in join_all(tasks).await {
            match outcome {
                Ok(found) => questions.extend(found),
                Err(e) => warn!("Questions: skipping requirement {}: {}", item.id, e),
            }
        }

        questions.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then_with(|| a.requirement_id.cmp(&b.requirement_id))
        });
        info!("Questions: finished ({} questions)", questions.len());
        questions
    }

    async fn for_requirement(&self, item: &RequirementItem, user: String) -> Result<Vec<Question>> {
        if let Some(cached) = self.cache.get(&user) {
            debug!("Questions ({}): cache hit", item.id);
            return Ok(cached);
        }

        let raw = ask(
            &self.gateway,
            &self.route,
            prompts::QUESTION_SYSTEM,
            user.clone(),
            0.0,
            Some(MAX_TOKENS),
        )
        .await?;

        let items = JsonRecovery::recover_array(&raw, "questions")?;
        let mut questions = parse_questions(&items, &item.id);
        if let Some(company) = &self.company {
            questions.retain(|q| !covered_by_profile(company, &q.question_text));
        }
        debug!("Questions ({}): {} kept", item.id, questions.len());

        self.cache.insert(user, questions.clone());
        Ok(questions)
    }
}

/// Valid questions for one requirement, capped and highest priority first.
fn parse_questions(items: &[Value], requirement_id: &str) -> Vec<Question> {
    let mut questions: Vec<Question> = items
        .iter()
        .filter_map(|item| {
            let text = json_string(item, "question_text")?;
            let text = text.trim();
            if text.is_empty() {
                return None;
            }
            let category = json_string(item, "category")
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
            let priority =
                Priority::from_label(&json_string(item, "priority").unwrap_or_default());
            Some(
                Question::new(
                    text,
                    json_string(item, "context").unwrap_or_default(),
                    category,
                    priority,
                )
                .for_requirement(requirement_id),
            )
        })
        .collect();

    questions.sort_by_key(|q| q.priority.rank());
    questions.truncate(MAX_PER_REQUIREMENT);
    questions
}

fn covered_by_profile(company: &CompanyProfile, question: &str) -> bool {
    let lower = question.to_lowercase();
    company.known_topics().iter().any(|topic| {
        let topic = topic.to_lowercase();
        !topic.is_empty() && lower.contains(&topic) && company.has_info(&topic)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::ScriptedProvider;
    use crate::ai::{ProviderKind, RetryPolicy};
    use crate::knowledge::KnowledgeBase;
    use crate::types::{RequirementType, RfpError};
    use std::time::Duration;

    fn stage(provider: Arc<ScriptedProvider>) -> QuestionStage {
        let gateway = LlmGateway::new(RetryPolicy::none(), Duration::from_secs(5))
            .with_provider(provider);
        QuestionStage::new(Arc::new(gateway), ModelRoute::openai("questions-model"), 8)
    }

    fn requirements() -> RequirementsResult {
        RequirementsResult {
            solution_requirements: vec![
                RequirementItem::new("SOL-01", RequirementType::Mandatory, "Provide a delivery team structure.", "", "team"),
                RequirementItem::new("SOL-02", RequirementType::Mandatory, "Describe the hosting approach.", "", "hosting"),
            ],
            ..RequirementsResult::default()
        }
    }

    #[test]
    fn test_parse_caps_and_defaults() {
        let items: Vec<Value> = serde_json::from_str(
            r#"[
                {"question_text": "How many consultants?", "priority": "low"},
                {"question_text": "  ", "priority": "high"},
                {"question_text": "Who leads delivery?", "priority": "high", "category": "resources"},
                {"question_text": "Which roles are onshore?"},
                {"question_text": "Any subcontractors?", "priority": "medium"}
            ]"#,
        )
        .unwrap();
        let questions = parse_questions(&items, "SOL-01");

        assert_eq!(questions.len(), MAX_PER_REQUIREMENT);
        assert_eq!(questions[0].question_text, "Who leads delivery?");
        assert_eq!(questions[0].category, "resources");
        assert_eq!(questions[1].question_text, "Which roles are onshore?");
        assert_eq!(questions[1].category, DEFAULT_CATEGORY);
        assert_eq!(questions[1].priority, Priority::Medium);
        assert!(questions.iter().all(|q| q.requirement_id.as_deref() == Some("SOL-01")));
        assert!(questions.iter().all(|q| q.priority != Priority::Low));
    }

    #[tokio::test]
    async fn test_run_sorts_across_requirements() {
        let provider = Arc::new(
            ScriptedProvider::always(ProviderKind::OpenAi, "[]")
                .with_rule(
                    "ID: SOL-01",
                    r#"[{"question_text": "How large is the team?", "priority": "medium"}]"#,
                )
                .with_rule(
                    "ID: SOL-02",
                    r#"{"questions": [{"question_text": "Which region hosts data?", "priority": "high"}]}"#,
                ),
        );
        let questions = stage(provider.clone()).run(&requirements()).await;

        assert_eq!(provider.calls(), 2);
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].requirement_id.as_deref(), Some("SOL-02"));
        assert_eq!(questions[1].requirement_id.as_deref(), Some("SOL-01"));
    }

    #[tokio::test]
    async fn test_failed_requirement_is_skipped() {
        let provider = Arc::new(
            ScriptedProvider::new(
                ProviderKind::OpenAi,
                vec![Err(RfpError::LlmApi("boom".to_string()))],
            )
            .with_rule(
                "ID: SOL-02",
                r#"[{"question_text": "Which region hosts data?"}]"#,
            ),
        );
        let questions = stage(provider).run(&requirements()).await;

        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].requirement_id.as_deref(), Some("SOL-02"));
    }

    #[tokio::test]
    async fn test_known_topics_filtered() {
        let kb = KnowledgeBase::builtin().unwrap();
        let topic = kb.company.known_topics()[0].clone();
        let known = format!(
            r#"[{{"question_text": "Do you have experience with {}?"}}, {{"question_text": "How many analysts join the team?"}}]"#,
            topic
        );
        let provider = Arc::new(ScriptedProvider::always(ProviderKind::OpenAi, &known));
        let requirements = RequirementsResult {
            solution_requirements: vec![requirements().solution_requirements[0].clone()],
            ..RequirementsResult::default()
        };

        let questions = stage(provider.clone())
            .with_company(kb.company.clone())
            .run(&requirements)
            .await;

        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].question_text, "How many analysts join the team?");
        let user = provider.last_request().unwrap().messages[1].content.as_text();
        assert!(user.contains("KNOWN COMPANY INFORMATION"));
    }
}
