//! Azure OpenAI Provider
//!
//! The route's model name is the deployment name. Authentication uses the
//! `api-key` header and every request carries the `api-version` query.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::{
    CompletionRequest, LlmProvider, ProviderKind, WireRequest, WireResponse,
    map_transport_error,
};
use crate::config::AzureConfig;
use crate::types::{Result, RfpError};

pub struct AzureOpenAiProvider {
    api_key: SecretString,
    endpoint: String,
    api_version: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for AzureOpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiProvider")
            .field("api_key", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AzureOpenAiProvider {
    /// Build from configuration; the endpoint falls back to its env var.
    pub fn from_config(config: &AzureConfig, timeout: Duration) -> Result<Self> {
        let endpoint = config
            .endpoint
            .clone()
            .or_else(|| std::env::var(&config.endpoint_env).ok())
            .ok_or_else(|| {
                RfpError::Config(format!(
                    "Azure OpenAI endpoint not set. Configure providers.azure.endpoint or {}",
                    config.endpoint_env
                ))
            })?;
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            RfpError::Config(format!(
                "Azure OpenAI API key not found. Set the {} env var",
                config.api_key_env
            ))
        })?;
        Self::new(
            &endpoint,
            &config.api_version,
            SecretString::from(api_key),
            timeout,
        )
    }

    pub fn new(
        endpoint: &str,
        api_version: &str,
        api_key: SecretString,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = crate::config::validate_endpoint(endpoint)?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RfpError::LlmApi(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            endpoint,
            api_version: api_version.to_string(),
            timeout,
            client,
        })
    }

    fn url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint.trim_end_matches('/'),
            deployment,
            self.api_version
        )
    }
}

#[async_trait]
impl LlmProvider for AzureOpenAiProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String> {
        info!(
            "Calling LLM (provider: azure, deployment: {}, temperature: {})",
            request.model, request.temperature
        );

        let start_time = Instant::now();
        let body = WireRequest {
            model: None,
            messages: &request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(self.url(&request.model))
            .header("api-key", self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error("Azure OpenAI", e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RfpError::LlmApi(format!(
                "Azure OpenAI API error ({}): {}",
                status, body
            )));
        }

        let response_body: WireResponse = response
            .json()
            .await
            .map_err(|e| map_transport_error("Azure OpenAI", e, self.timeout))?;

        let content = response_body.into_text();
        debug!(
            "LLM deployment={} returned {} chars in {:?}",
            request.model,
            content.len(),
            start_time.elapsed()
        );
        Ok(content)
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Azure
    }

    fn name(&self) -> &str {
        "azure"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deployment_url() {
        let provider = AzureOpenAiProvider::new(
            "https://contoso.openai.azure.com/",
            "2024-02-15-preview",
            SecretString::from("azure-secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(
            provider.url("gpt-5-chat"),
            "https://contoso.openai.azure.com/openai/deployments/gpt-5-chat/chat/completions?api-version=2024-02-15-preview"
        );
        assert!(!format!("{:?}", provider).contains("azure-secret"));
    }

    #[test]
    fn test_missing_endpoint() {
        let config = AzureConfig {
            endpoint: None,
            endpoint_env: "RFP_ASSISTANT_TEST_UNSET_ENDPOINT".to_string(),
            api_version: "2024-02-15-preview".to_string(),
            api_key_env: "RFP_ASSISTANT_TEST_UNSET_KEY".to_string(),
        };
        let err = AzureOpenAiProvider::from_config(&config, Duration::from_secs(1)).unwrap_err();
        assert!(err.to_string().contains("endpoint"));
    }
}
