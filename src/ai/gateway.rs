//! LLM Gateway
//!
//! Single retrying entry point for every chat completion in the pipeline.
//!
//! - Dispatch on the route's [`ProviderKind`] to an injected provider
//! - Each attempt bounded by `with_timeout`
//! - Only timeouts are retried, with exponential backoff (`backon`)
//! - Retry state is built per call, so concurrent stages never share it

use backon::{ExponentialBuilder, Retryable};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::provider::{
    AzureOpenAiProvider, ChatMessage, CompletionRequest, LlmProvider, ModelRoute,
    OpenAiProvider, ProviderKind, SharedProvider,
};
use super::timeout::with_timeout;
use crate::config::Config;
use crate::constants::llm as llm_constants;
use crate::types::{Result, RfpError};

// =============================================================================
// Retry Policy
// =============================================================================

/// Bounded exponential backoff, applied to timeouts only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first
    pub max_retries: usize,
    /// Delay before the first retry; doubles each time
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: llm_constants::MAX_RETRIES,
            base_delay: Duration::from_millis(llm_constants::BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
        }
    }

    pub(crate) fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_factor(llm_constants::BACKOFF_FACTOR)
            .with_max_times(self.max_retries)
    }
}

// =============================================================================
// Gateway
// =============================================================================

/// Explicitly constructed provider registry with retry and timeout policy
pub struct LlmGateway {
    providers: HashMap<ProviderKind, SharedProvider>,
    policy: RetryPolicy,
    timeout: Duration,
}

impl std::fmt::Debug for LlmGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmGateway")
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl LlmGateway {
    pub fn new(policy: RetryPolicy, timeout: Duration) -> Self {
        Self {
            providers: HashMap::new(),
            policy,
            timeout,
        }
    }

    /// Register a provider under its own kind, replacing any previous one
    pub fn with_provider(mut self, provider: SharedProvider) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    /// Build providers for every kind referenced by the configured routes.
    ///
    /// Unreferenced providers are never constructed, so their keys are optional.
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.llm.timeout();
        let mut gateway = Self::new(config.llm.retry_policy(), timeout);

        let kinds = config.models.referenced_kinds();
        if kinds.contains(&ProviderKind::OpenAi) {
            let provider = OpenAiProvider::from_config(&config.providers.openai, timeout)?;
            gateway = gateway.with_provider(Arc::new(provider));
        }
        if kinds.contains(&ProviderKind::Azure) {
            let provider = AzureOpenAiProvider::from_config(&config.providers.azure, timeout)?;
            gateway = gateway.with_provider(Arc::new(provider));
        }

        debug!("LLM gateway ready: {:?}", gateway);
        Ok(gateway)
    }

    pub fn has_provider(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    /// Text completion on the route's provider
    pub async fn complete(
        &self,
        route: &ModelRoute,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        let request = CompletionRequest {
            model: route.model.clone(),
            messages,
            temperature,
            max_tokens,
        };
        self.dispatch(route.provider, &request, "chat completion")
            .await
    }

    /// Completion whose messages may carry image parts
    pub async fn complete_vision(
        &self,
        route: &ModelRoute,
        messages: Vec<ChatMessage>,
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String> {
        if !messages.iter().any(|m| m.content.has_images()) {
            debug!("Vision completion without image parts (model: {})", route.model);
        }
        let request = CompletionRequest {
            model: route.model.clone(),
            messages,
            temperature,
            max_tokens,
        };
        self.dispatch(route.provider, &request, "vision completion")
            .await
    }

    async fn dispatch(
        &self,
        kind: ProviderKind,
        request: &CompletionRequest,
        operation: &str,
    ) -> Result<String> {
        let provider = self.providers.get(&kind).ok_or_else(|| {
            RfpError::Config(format!("No provider registered for '{}'", kind))
        })?;

        let attempts = AtomicUsize::new(0);
        let attempt = || async {
            attempts.fetch_add(1, Ordering::Relaxed);
            with_timeout(self.timeout, provider.complete(request), operation).await
        };

        let result = attempt
            .retry(self.policy.backoff())
            .when(|e: &RfpError| e.is_timeout())
            .notify(|err: &RfpError, delay: Duration| {
                warn!(
                    "{} on {} timed out ({}), retrying in {:?}",
                    operation,
                    provider.name(),
                    err,
                    delay
                );
            })
            .await;

        let used = attempts.load(Ordering::Relaxed);
        match &result {
            Ok(text) => debug!(
                "{} via {} succeeded after {} attempt(s), {} chars",
                operation,
                provider.name(),
                used,
                text.len()
            ),
            Err(e) => warn!(
                "{} via {} failed after {} attempt(s): {}",
                operation,
                provider.name(),
                used,
                e
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::mock::ScriptedProvider;

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
        }
    }

    fn timeout_err() -> RfpError {
        RfpError::timeout("mock", Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retries_timeouts_then_succeeds() {
        let provider = Arc::new(ScriptedProvider::new(ProviderKind::OpenAi, vec![
            Err(timeout_err()),
            Err(timeout_err()),
            Ok("done".to_string()),
        ]));
        let gateway = LlmGateway::new(fast_policy(2), Duration::from_secs(5))
            .with_provider(provider.clone());

        let text = gateway
            .complete(&ModelRoute::openai("m"), vec![ChatMessage::user("hi")], 0.2, None)
            .await
            .unwrap();

        assert_eq!(text, "done");
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_bound() {
        let provider = Arc::new(ScriptedProvider::new(
            ProviderKind::Azure,
            vec![Err(timeout_err()), Err(timeout_err()), Err(timeout_err()), Ok("late".into())],
        ));
        let gateway = LlmGateway::new(fast_policy(2), Duration::from_secs(5))
            .with_provider(provider.clone());

        let err = gateway
            .complete(&ModelRoute::azure("d"), vec![ChatMessage::user("hi")], 0.2, None)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn test_generic_error_not_retried() {
        let provider = Arc::new(ScriptedProvider::new(
            ProviderKind::OpenAi,
            vec![Err(RfpError::LlmApi("500".to_string())), Ok("never".into())],
        ));
        let gateway = LlmGateway::new(fast_policy(2), Duration::from_secs(5))
            .with_provider(provider.clone());

        let err = gateway
            .complete(&ModelRoute::openai("m"), vec![ChatMessage::user("hi")], 0.2, None)
            .await
            .unwrap_err();

        assert!(matches!(err, RfpError::LlmApi(_)));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_slow_provider_hits_attempt_timeout() {
        let provider = Arc::new(
            ScriptedProvider::always(ProviderKind::OpenAi, "slow")
                .with_delay(Duration::from_millis(200)),
        );
        let gateway = LlmGateway::new(fast_policy(1), Duration::from_millis(10))
            .with_provider(provider.clone());

        let err = gateway
            .complete(&ModelRoute::openai("m"), vec![ChatMessage::user("hi")], 0.2, None)
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn test_missing_provider_is_config_error() {
        let gateway = LlmGateway::new(RetryPolicy::none(), Duration::from_secs(1));
        let err = gateway
            .complete(&ModelRoute::azure("d"), vec![], 0.0, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RfpError::Config(_)));
        assert!(!gateway.has_provider(ProviderKind::Azure));
    }

    #[tokio::test]
    async fn test_request_carries_route_and_params() {
        let provider = Arc::new(ScriptedProvider::always(ProviderKind::OpenAi, "{}"));
        let gateway = LlmGateway::new(RetryPolicy::none(), Duration::from_secs(1))
            .with_provider(provider.clone());

        gateway
            .complete_vision(
                &ModelRoute::openai("Qwen/Qwen2.5-VL-7B-Instruct"),
                vec![ChatMessage::user_with_images("ocr", &["data:image/png;base64,AA".into()])],
                0.0,
                Some(4000),
            )
            .await
            .unwrap();

        let request = provider.last_request().unwrap();
        assert_eq!(request.model, "Qwen/Qwen2.5-VL-7B-Instruct");
        assert_eq!(request.max_tokens, Some(4000));
        assert!(request.messages[0].content.has_images());
    }
}
