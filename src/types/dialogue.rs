//! Clarification dialogue: questions asked of the bidder and their answers.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

use super::SessionId;
use super::error::{RfpError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "high" => Self::High,
            "low" => Self::Low,
            _ => Self::Medium,
        }
    }

    /// Sort key: high first
    pub fn rank(&self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub question_id: String,
    pub question_text: String,
    #[serde(default)]
    pub context: String,
    pub category: String,
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_id: Option<String>,
    #[serde(default)]
    pub answered: bool,
    pub asked_at: DateTime<Utc>,
}

impl Question {
    pub fn new(
        question_text: impl Into<String>,
        context: impl Into<String>,
        category: impl Into<String>,
        priority: Priority,
    ) -> Self {
        Self {
            question_id: uuid::Uuid::new_v4().to_string(),
            question_text: question_text.into(),
            context: context.into(),
            category: category.into(),
            priority,
            requirement_id: None,
            answered: false,
            asked_at: Utc::now(),
        }
    }

    pub fn for_requirement(mut self, requirement_id: impl Into<String>) -> Self {
        self.requirement_id = Some(requirement_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    pub answer_text: String,
    pub answered_at: DateTime<Utc>,
}

// =============================================================================
// Conversation Context
// =============================================================================

/// Ordered questions and answers for one requirement's clarification flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_id: Option<String>,
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub answers: Vec<Answer>,
    pub created_at: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(requirement_id: Option<String>) -> Self {
        Self {
            session_id: SessionId::new(uuid::Uuid::new_v4().to_string()),
            requirement_id,
            questions: Vec::new(),
            answers: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn add_question(&mut self, question: Question) {
        self.questions.push(question);
    }

    /// Record an answer and mark its question answered.
    ///
    /// A repeated answer replaces the earlier one.
    pub fn submit_answer(&mut self, question_id: &str, answer_text: impl Into<String>) -> Result<()> {
        let question = self
            .questions
            .iter_mut()
            .find(|q| q.question_id == question_id)
            .ok_or_else(|| RfpError::Session(format!("Unknown question id: {}", question_id)))?;
        question.answered = true;

        self.answers.retain(|a| a.question_id != question_id);
        self.answers.push(Answer {
            question_id: question_id.to_string(),
            answer_text: answer_text.into(),
            answered_at: Utc::now(),
        });
        Ok(())
    }

    pub fn answer_for(&self, question_id: &str) -> Option<&Answer> {
        self.answers.iter().find(|a| a.question_id == question_id)
    }

    pub fn unanswered(&self) -> Vec<&Question> {
        self.questions.iter().filter(|q| !q.answered).collect()
    }

    /// Answered pairs as `Q: ...\nA: ...` blocks, in question order.
    pub fn qa_context(&self) -> String {
        self.questions
            .iter()
            .filter_map(|q| {
                self.answer_for(&q.question_id)
                    .map(|a| format!("Q: {}\nA: {}", q.question_text, a.answer_text))
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

// =============================================================================
// Session Store
// =============================================================================

/// Concurrent in-process registry of clarification sessions
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<SessionId, ConversationContext>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, requirement_id: Option<String>) -> SessionId {
        let context = ConversationContext::new(requirement_id);
        let id = context.session_id.clone();
        self.sessions.insert(id.clone(), context);
        id
    }

    pub fn insert(&self, context: ConversationContext) {
        self.sessions.insert(context.session_id.clone(), context);
    }

    pub fn get(&self, id: &SessionId) -> Option<ConversationContext> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn add_question(&self, id: &SessionId, question: Question) -> Result<()> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RfpError::Session(format!("Unknown session: {}", id)))?;
        entry.add_question(question);
        Ok(())
    }

    pub fn submit_answer(&self, id: &SessionId, question_id: &str, text: &str) -> Result<()> {
        let mut entry = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| RfpError::Session(format!("Unknown session: {}", id)))?;
        entry.submit_answer(question_id, text)
    }

    pub fn remove(&self, id: &SessionId) -> Option<ConversationContext> {
        self.sessions.remove(id).map(|(_, ctx)| ctx)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
