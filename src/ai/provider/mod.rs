//! LLM Provider Abstraction
//!
//! Defines the `LlmProvider` trait for chat completions and the message
//! types shared by every provider. Responses are plain text; structured
//! output is recovered downstream by `ai::validation`.
//!
//! ## Providers
//!
//! - `openai`: any OpenAI-compatible chat-completions endpoint (bearer key)
//! - `azure`: Azure OpenAI deployments (`api-key` header, `api-version` query)
//!
//! Routing is explicit: every stage is configured with a [`ModelRoute`]
//! naming its [`ProviderKind`], resolved once at startup.

mod azure;
mod openai;

pub use azure::AzureOpenAiProvider;
pub use openai::OpenAiProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::types::Result;

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One part of a multi-part message (vision calls)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Text view of the content; image parts are skipped.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Parts(parts) => join_text_parts(parts),
        }
    }

    pub fn has_images(&self) -> bool {
        matches!(self, Self::Parts(parts) if parts.iter().any(|p| matches!(p, ContentPart::ImageUrl { .. })))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// User message with a text prompt followed by images (data or http URLs)
    pub fn user_with_images(text: impl Into<String>, image_urls: &[String]) -> Self {
        let mut parts = vec![ContentPart::Text { text: text.into() }];
        parts.extend(image_urls.iter().map(|url| ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.clone() },
        }));
        Self {
            role: ChatRole::User,
            content: MessageContent::Parts(parts),
        }
    }
}

/// Concatenate the text parts of a structured response into one string
pub fn join_text_parts(parts: &[ContentPart]) -> String {
    parts
        .iter()
        .filter_map(|p| match p {
            ContentPart::Text { text } => Some(text.as_str()),
            ContentPart::ImageUrl { .. } => None,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

// =============================================================================
// Routing
// =============================================================================

/// Provider selector, resolved once from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(alias = "openai-compatible", alias = "hf")]
    OpenAi,
    Azure,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Azure => "azure",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which provider serves a stage, and with which model or deployment
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModelRoute {
    pub provider: ProviderKind,
    pub model: String,
}

impl ModelRoute {
    pub fn new(provider: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    pub fn openai(model: impl Into<String>) -> Self {
        Self::new(ProviderKind::OpenAi, model)
    }

    pub fn azure(model: impl Into<String>) -> Self {
        Self::new(ProviderKind::Azure, model)
    }
}

impl fmt::Display for ModelRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

// =============================================================================
// LLM Provider Trait
// =============================================================================

/// Shared LLM provider type for concurrent access across pipeline stages.
pub type SharedProvider = Arc<dyn LlmProvider>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Run one chat completion and return the raw text content.
    ///
    /// Transport timeouts surface as `RfpError::Timeout`; everything else
    /// as `RfpError::LlmApi`.
    async fn complete(&self, request: &CompletionRequest) -> Result<String>;

    fn kind(&self) -> ProviderKind;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Map a reqwest transport error onto the crate taxonomy
pub(crate) fn map_transport_error(
    provider: &str,
    err: reqwest::Error,
    timeout: std::time::Duration,
) -> crate::types::RfpError {
    if err.is_timeout() {
        crate::types::RfpError::timeout(format!("{} request", provider), timeout)
    } else {
        crate::types::RfpError::LlmApi(format!("{} request failed: {}", provider, err))
    }
}

// =============================================================================
// Wire Types (OpenAI chat-completions schema, shared by both providers)
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct WireRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<&'a str>,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireResponse {
    pub choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChoice {
    pub message: WireMessage,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireMessage {
    #[serde(default)]
    pub content: Option<WireContent>,
}

/// Content may arrive as a plain string or as a list of typed parts
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum WireContent {
    Text(String),
    Parts(Vec<serde_json::Value>),
}

impl WireResponse {
    /// Text of the first choice; list content is concatenated.
    pub fn into_text(self) -> String {
        let Some(choice) = self.choices.into_iter().next() else {
            return String::new();
        };
        match choice.message.content {
            Some(WireContent::Text(s)) => s,
            Some(WireContent::Parts(parts)) => parts
                .iter()
                .map(|part| match part {
                    serde_json::Value::String(s) => s.clone(),
                    other => other
                        .get("text")
                        .and_then(|t| t.as_str())
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect(),
            None => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_serializes_openai_shape() {
        let msg = ChatMessage::user_with_images("Read this page", &["data:image/png;base64,AA".to_string()]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"][0], json!({"type": "text", "text": "Read this page"}));
        assert_eq!(value["content"][1]["type"], "image_url");
        assert_eq!(value["content"][1]["image_url"]["url"], "data:image/png;base64,AA");
        assert!(msg.content.has_images());

        let plain = serde_json::to_value(ChatMessage::system("rules")).unwrap();
        assert_eq!(plain, json!({"role": "system", "content": "rules"}));
    }

    #[test]
    fn test_wire_response_concatenates_parts() {
        let body = json!({
            "choices": [{"message": {"content": [
                {"type": "text", "text": "{\"a\":"},
                {"type": "text", "text": " 1}"}
            ]}}]
        });
        let resp: WireResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.into_text(), "{\"a\": 1}");
    }

    #[test]
    fn test_wire_response_null_content() {
        let body = json!({"choices": [{"message": {"content": null}}]});
        let resp: WireResponse = serde_json::from_value(body).unwrap();
        assert_eq!(resp.into_text(), "");
    }

    #[test]
    fn test_provider_kind_serde() {
        let route: ModelRoute =
            serde_json::from_value(json!({"provider": "azure", "model": "gpt-5-chat"})).unwrap();
        assert_eq!(route, ModelRoute::azure("gpt-5-chat"));
        assert_eq!(route.to_string(), "azure:gpt-5-chat");
        let hf: ProviderKind = serde_json::from_value(json!("hf")).unwrap();
        assert_eq!(hf, ProviderKind::OpenAi);
    }
}
