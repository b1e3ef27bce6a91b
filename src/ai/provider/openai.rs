//! OpenAI-compatible Provider
//!
//! Chat Completions against any OpenAI-compatible endpoint (the Hugging Face
//! router by default). The HTTP client is built once and reused.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{
    CompletionRequest, LlmProvider, ProviderKind, WireRequest, WireResponse,
    map_transport_error,
};
use crate::config::OpenAiConfig;
use crate::types::{Result, RfpError};

/// OpenAI-compatible provider with secure API key handling
pub struct OpenAiProvider {
    /// API key stored securely - never exposed in logs or debug output
    api_key: SecretString,
    api_base: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl OpenAiProvider {
    /// Build from configuration, reading the key from the configured env var.
    pub fn from_config(config: &OpenAiConfig, timeout: Duration) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            RfpError::Config(format!(
                "OpenAI-compatible API key not found. Set the {} env var",
                config.api_key_env
            ))
        })?;
        Self::new(&config.api_base, SecretString::from(api_key), timeout)
    }

    pub fn new(api_base: &str, api_key: SecretString, timeout: Duration) -> Result<Self> {
        let api_base = crate::config::validate_endpoint(api_base)?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RfpError::LlmApi(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            api_base,
            timeout,
            client,
        })
    }

    fn url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        info!(
            "Calling LLM (provider: openai, model: {}, temperature: {})",
            request.model, request.temperature
        );

        let start_time = Instant::now();
        let body = WireRequest {
            model: Some(&request.model),
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(self.url())
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("OpenAI", e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RfpError::LlmApi(format!(
                "OpenAI API error ({}): {}",
                status, body
            )));
        }

        let response_body: WireResponse = response
            .json()
            .await
            .map_err(|e| map_transport_error("OpenAI", e, self.timeout))?;

        let content = response_body.into_text();
        debug!(
            "LLM model={} returned {} chars in {:?}",
            request.model,
            content.len(),
            start_time.elapsed()
        );
        Ok(content)
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn name(&self) -> &str {
        "openai"
    }
}
