//! Embedding Providers
//!
//! Text embeddings for the memory store's embedding mode and the vector
//! retrieval index. Both HTTP embedders speak the OpenAI `/embeddings` schema.

use async_trait::async_trait;
use backon::Retryable;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::gateway::RetryPolicy;
use super::provider::{ProviderKind, map_transport_error};
use crate::config::{Config, EmbeddingConfig};
use crate::types::{Result, RfpError};

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// One vector per input, in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;
}

pub type SharedEmbedder = Arc<dyn Embedder>;

/// Build the configured embedder, retrying timed-out requests with the
/// same policy as completions.
pub fn create_embedder(config: &Config) -> Result<SharedEmbedder> {
    let inner = create_http_embedder(config)?;
    Ok(Arc::new(RetryingEmbedder::new(
        inner,
        config.llm.retry_policy(),
    )))
}

fn create_http_embedder(config: &Config) -> Result<SharedEmbedder> {
    let timeout = config.llm.timeout();
    let embedding = &config.embedding;
    match embedding.provider {
        ProviderKind::OpenAi => {
            let key_env = embedding
                .api_key_env
                .as_deref()
                .unwrap_or(&config.providers.openai.api_key_env);
            let key = read_key(key_env)?;
            let base = embedding
                .endpoint
                .as_deref()
                .unwrap_or(&config.providers.openai.api_base);
            Ok(Arc::new(OpenAiEmbedder::new(base, key, embedding, timeout)?))
        }
        ProviderKind::Azure => {
            let azure = &config.providers.azure;
            let key_env = embedding.api_key_env.as_deref().unwrap_or(&azure.api_key_env);
            let key = read_key(key_env)?;
            let endpoint = embedding
                .endpoint
                .clone()
                .or_else(|| azure.endpoint.clone())
                .or_else(|| std::env::var(&azure.endpoint_env).ok())
                .ok_or_else(|| {
                    RfpError::Config(format!(
                        "Azure embedding endpoint not set. Configure embedding.endpoint or {}",
                        azure.endpoint_env
                    ))
                })?;
            Ok(Arc::new(AzureEmbedder::new(
                &endpoint,
                &azure.api_version,
                key,
                embedding,
                timeout,
            )?))
        }
    }
}

fn read_key(env_name: &str) -> Result<SecretString> {
    std::env::var(env_name)
        .map(SecretString::from)
        .map_err(|_| RfpError::Config(format!("Embedding API key not found. Set the {} env var", env_name)))
}

// =============================================================================
// Retry
// =============================================================================

/// Retries timed-out embedding requests with exponential backoff.
/// Other errors are returned on the first failure.
pub struct RetryingEmbedder {
    inner: SharedEmbedder,
    policy: RetryPolicy,
}

impl RetryingEmbedder {
    pub fn new(inner: SharedEmbedder, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl Embedder for RetryingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (|| async { self.inner.embed(text).await })
            .retry(self.policy.backoff())
            .when(|e: &RfpError| e.is_timeout())
            .notify(|err: &RfpError, delay: Duration| {
                warn!("Embedding timed out ({}), retrying in {:?}", err, delay);
            })
            .await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (|| async { self.inner.embed_batch(texts).await })
            .retry(self.policy.backoff())
            .when(|e: &RfpError| e.is_timeout())
            .notify(|err: &RfpError, delay: Duration| {
                warn!(
                    "Embedding batch of {} timed out ({}), retrying in {:?}",
                    texts.len(),
                    err,
                    delay
                );
            })
            .await
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }
}

// =============================================================================
// Similarity
// =============================================================================

/// Cosine similarity; 0.0 for zero-norm vectors or mismatched lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// Order by `index`, check count and dimension.
fn collect_vectors(
    mut data: Vec<EmbeddingData>,
    expected: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    if data.len() != expected {
        return Err(RfpError::Embedding(format!(
            "expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }
    data.sort_by_key(|d| d.index);
    data.into_iter()
        .map(|d| {
            if d.embedding.len() == dimension {
                Ok(d.embedding)
            } else {
                Err(RfpError::Embedding(format!(
                    "embedding dimension {} does not match configured {}",
                    d.embedding.len(),
                    dimension
                )))
            }
        })
        .collect()
}

async fn send_embeddings(
    request: reqwest::RequestBuilder,
    body: &EmbeddingRequest<'_>,
    label: &str,
    timeout: Duration,
    dimension: usize,
) -> Result<Vec<Vec<f32>>> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| match map_transport_error(label, e, timeout) {
            timeout @ RfpError::Timeout { .. } => timeout,
            other => RfpError::Embedding(other.to_string()),
        })?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        return Err(RfpError::Embedding(format!(
            "{} embedding error ({}): {}",
            label, status, text
        )));
    }

    let parsed: EmbeddingResponse = response
        .json()
        .await
        .map_err(|e| RfpError::Embedding(format!("Failed to parse {} embedding response: {}", label, e)))?;

    collect_vectors(parsed.data, body.input.len(), dimension)
}

// =============================================================================
// OpenAI-compatible Embedder
// =============================================================================

pub struct OpenAiEmbedder {
    api_key: SecretString,
    api_base: String,
    model: String,
    dimension: usize,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("model", &self.model)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl OpenAiEmbedder {
    pub fn new(
        api_base: &str,
        api_key: SecretString,
        config: &EmbeddingConfig,
        timeout: Duration,
    ) -> Result<Self> {
        let api_base = crate::config::validate_endpoint(api_base)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RfpError::Embedding(format!("Failed to create HTTP client: {}", e)))?;
        info!(
            "Embedding provider: openai (model: {}, dimension: {})",
            config.model, config.dimension
        );
        Ok(Self {
            api_key,
            api_base,
            model: config.model.clone(),
            dimension: config.dimension,
            timeout,
            client,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RfpError::Embedding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Requesting {} embeddings (model: {})", texts.len(), self.model);
        let request = self
            .client
            .post(format!("{}/embeddings", self.api_base.trim_end_matches('/')))
            .bearer_auth(self.api_key.expose_secret());
        let body = EmbeddingRequest {
            model: Some(&self.model),
            input: texts,
        };
        send_embeddings(request, &body, "OpenAI", self.timeout, self.dimension).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// =============================================================================
// Azure OpenAI Embedder
// =============================================================================

pub struct AzureEmbedder {
    api_key: SecretString,
    url: String,
    dimension: usize,
    timeout: Duration,
    client: reqwest::Client,
}

impl std::fmt::Debug for AzureEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureEmbedder")
            .field("api_key", &"[REDACTED]")
            .field("url", &self.url)
            .field("dimension", &self.dimension)
            .finish()
    }
}

impl AzureEmbedder {
    /// `config.model` names the embedding deployment.
    pub fn new(
        endpoint: &str,
        api_version: &str,
        api_key: SecretString,
        config: &EmbeddingConfig,
        timeout: Duration,
    ) -> Result<Self> {
        let endpoint = crate::config::validate_endpoint(endpoint)?;
        let url = format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            endpoint.trim_end_matches('/'),
            config.model,
            api_version
        );
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RfpError::Embedding(format!("Failed to create HTTP client: {}", e)))?;
        info!(
            "Embedding provider: azure (deployment: {}, dimension: {})",
            config.model, config.dimension
        );
        Ok(Self {
            api_key,
            url,
            dimension: config.dimension,
            timeout,
            client,
        })
    }
}

#[async_trait]
impl Embedder for AzureEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RfpError::Embedding("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!("Requesting {} embeddings (azure)", texts.len());
        let request = self
            .client
            .post(&self.url)
            .header("api-key", self.api_key.expose_secret());
        let body = EmbeddingRequest {
            model: None,
            input: texts,
        };
        send_embeddings(request, &body, "Azure OpenAI", self.timeout, self.dimension).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Times out for the first `failures` calls, then returns unit vectors
    struct FlakyEmbedder {
        failures: usize,
        calls: AtomicUsize,
    }

    impl FlakyEmbedder {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicUsize::new(0),
            })
        }

        fn next(&self) -> Result<()> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(RfpError::timeout("embedding", Duration::from_millis(1)))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            self.next()?;
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.next()?;
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn fast_policy(max_retries: usize) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retrying_embedder_recovers_after_timeout() {
        let flaky = FlakyEmbedder::new(1);
        let embedder = RetryingEmbedder::new(flaky.clone(), fast_policy(2));

        let vector = embedder.embed("hosting region").await.unwrap();
        assert_eq!(vector, vec![1.0, 0.0]);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
        assert_eq!(embedder.dimension(), 2);
    }

    #[tokio::test]
    async fn test_retrying_embedder_batch_recovers_after_timeout() {
        let flaky = FlakyEmbedder::new(2);
        let embedder = RetryingEmbedder::new(flaky.clone(), fast_policy(2));

        let texts = vec!["a".to_string(), "b".to_string()];
        let vectors = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(vectors.len(), 2);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retrying_embedder_gives_up_after_policy() {
        let flaky = FlakyEmbedder::new(5);
        let embedder = RetryingEmbedder::new(flaky.clone(), fast_policy(1));

        let err = embedder.embed("x").await.unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retrying_embedder_does_not_retry_other_errors() {
        struct Broken(AtomicUsize);

        #[async_trait]
        impl Embedder for Broken {
            async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(RfpError::Embedding("bad request".to_string()))
            }
            async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
                Err(RfpError::Embedding("bad request".to_string()))
            }
            fn dimension(&self) -> usize {
                2
            }
        }

        let broken = Arc::new(Broken(AtomicUsize::new(0)));
        let embedder = RetryingEmbedder::new(broken.clone(), fast_policy(3));
        assert!(matches!(
            embedder.embed("x").await,
            Err(RfpError::Embedding(_))
        ));
        assert_eq!(broken.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_collect_vectors_orders_by_index() {
        let data = vec![
            EmbeddingData {
                index: 1,
                embedding: vec![0.0, 1.0],
            },
            EmbeddingData {
                index: 0,
                embedding: vec![1.0, 0.0],
            },
        ];
        let vectors = collect_vectors(data, 2, 2).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_collect_vectors_rejects_wrong_dimension() {
        let data = vec![EmbeddingData {
            index: 0,
            embedding: vec![1.0; 3],
        }];
        assert!(matches!(
            collect_vectors(data, 1, 4),
            Err(RfpError::Embedding(_))
        ));
    }

    #[test]
    fn test_azure_url_uses_deployment() {
        let config = EmbeddingConfig {
            provider: ProviderKind::Azure,
            model: "text-embedding-3-large".to_string(),
            ..EmbeddingConfig::default()
        };
        let embedder = AzureEmbedder::new(
            "https://contoso.openai.azure.com",
            "2024-02-15-preview",
            SecretString::from("k".to_string()),
            &config,
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(
            embedder.url,
            "https://contoso.openai.azure.com/openai/deployments/text-embedding-3-large/embeddings?api-version=2024-02-15-preview"
        );
        assert_eq!(embedder.dimension(), 3072);
    }
}
