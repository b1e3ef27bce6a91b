//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (platform config dir) and project (.rfp-assistant/) level configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::ai::gateway::RetryPolicy;
use crate::ai::provider::{ModelRoute, ProviderKind};
use crate::constants::{cache, llm, memory, response, retrieval};
use crate::types::{Result, RfpError};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Call timeout, retry and sampling defaults
    pub llm: LlmConfig,

    /// Provider endpoints and key env vars
    pub providers: ProvidersConfig,

    /// Provider and model per stage
    pub models: ModelsConfig,

    pub embedding: EmbeddingConfig,
    pub memory: MemoryConfig,
    pub retrieval: RetrievalConfig,
    pub response: ResponseConfig,
    pub cache: CacheConfig,
    pub knowledge: KnowledgeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            llm: LlmConfig::default(),
            providers: ProvidersConfig::default(),
            models: ModelsConfig::default(),
            embedding: EmbeddingConfig::default(),
            memory: MemoryConfig::default(),
            retrieval: RetrievalConfig::default(),
            response: ResponseConfig::default(),
            cache: CacheConfig::default(),
            knowledge: KnowledgeConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `RfpError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        for (name, temperature) in [
            ("llm.temperature", self.llm.temperature),
            ("response.temperature", self.response.temperature),
        ] {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(RfpError::Config(format!(
                    "{} must be between 0.0 and 2.0, got {}",
                    name, temperature
                )));
            }
        }

        if self.llm.timeout_secs == 0 {
            return Err(RfpError::Config(
                "llm.timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.retrieval.chunk_size == 0 {
            return Err(RfpError::Config(
                "retrieval.chunk_size must be greater than 0".to_string(),
            ));
        }

        // The chunker still advances by at least one char
        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            warn!(
                "retrieval.chunk_overlap ({}) >= chunk_size ({}); chunking degrades to 1-char steps",
                self.retrieval.chunk_overlap, self.retrieval.chunk_size
            );
        }

        if self.cache.stage_capacity == 0 {
            return Err(RfpError::Config(
                "cache.stage_capacity must be greater than 0".to_string(),
            ));
        }

        if self.response.max_chars == 0 {
            return Err(RfpError::Config(
                "response.max_chars must be greater than 0".to_string(),
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(RfpError::Config(
                "embedding.dimension must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Validate an endpoint URL: http(s) only, returned without a trailing slash.
pub fn validate_endpoint(endpoint: &str) -> Result<String> {
    let url = url::Url::parse(endpoint)
        .map_err(|e| RfpError::Config(format!("Invalid endpoint URL '{}': {}", endpoint, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(RfpError::Config(format!(
            "Endpoint must use http or https scheme, got: {}",
            url.scheme()
        )));
    }

    if url.scheme() == "http"
        && let Some(host) = url.host_str()
        && !matches!(host, "localhost" | "127.0.0.1" | "::1")
    {
        warn!("Endpoint {} uses plain http; API keys will be sent unencrypted", host);
    }

    Ok(endpoint.trim_end_matches('/').to_string())
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Per-call timeout in seconds
    pub timeout_secs: u64,

    /// Extra attempts after a timeout
    pub max_retries: usize,

    /// Backoff base in milliseconds; doubles per retry
    pub retry_base_ms: u64,

    /// Default sampling temperature for analysis stages
    pub temperature: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            timeout_secs: llm::CALL_TIMEOUT_SECS,
            max_retries: llm::MAX_RETRIES,
            retry_base_ms: llm::BASE_DELAY_MS,
            temperature: llm::DEFAULT_TEMPERATURE,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_ms),
        }
    }
}

// =============================================================================
// Provider Configuration
// =============================================================================

/// API keys are never stored in config; only the env var names that hold them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub openai: OpenAiConfig,
    pub azure: AzureConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// OpenAI-compatible base URL
    pub api_base: String,
    /// Env var holding the bearer key
    pub api_key_env: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: llm::DEFAULT_OPENAI_BASE.to_string(),
            api_key_env: "HF_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    /// Resource endpoint, e.g. https://<name>.openai.azure.com
    pub endpoint: Option<String>,
    /// Env var consulted when `endpoint` is unset
    pub endpoint_env: String,
    pub api_version: String,
    pub api_key_env: String,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            endpoint_env: "AZURE_OPENAI_ENDPOINT".to_string(),
            api_version: llm::DEFAULT_AZURE_API_VERSION.to_string(),
            api_key_env: "AZURE_OPENAI_API_KEY".to_string(),
        }
    }
}

// =============================================================================
// Model Routes
// =============================================================================

/// Provider and model for each stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    pub extraction: ModelRoute,
    pub preprocess: ModelRoute,
    pub comparison: ModelRoute,
    pub requirements: ModelRoute,
    pub structure: ModelRoute,
    pub response: ModelRoute,
    pub clarity: ModelRoute,
    pub structured_response: ModelRoute,
    pub questions: ModelRoute,
    pub quality: ModelRoute,
    pub vision: ModelRoute,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        let chat = ModelRoute::azure("gpt-5-chat");
        Self {
            extraction: chat.clone(),
            preprocess: chat.clone(),
            comparison: chat.clone(),
            requirements: ModelRoute::openai("meta-llama/Llama-3.1-8B-Instruct"),
            structure: chat.clone(),
            response: chat.clone(),
            clarity: chat.clone(),
            structured_response: chat.clone(),
            questions: chat.clone(),
            quality: chat,
            vision: ModelRoute::openai("Qwen/Qwen2.5-VL-7B-Instruct"),
        }
    }
}

impl ModelsConfig {
    fn routes(&self) -> [&ModelRoute; 11] {
        [
            &self.extraction,
            &self.preprocess,
            &self.comparison,
            &self.requirements,
            &self.structure,
            &self.response,
            &self.clarity,
            &self.structured_response,
            &self.questions,
            &self.quality,
            &self.vision,
        ]
    }

    /// Provider kinds any stage routes to
    pub fn referenced_kinds(&self) -> HashSet<ProviderKind> {
        self.routes().iter().map(|r| r.provider).collect()
    }
}

// =============================================================================
// Embedding Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: ProviderKind,
    /// Model name, or deployment name on Azure
    pub model: String,
    pub dimension: usize,
    /// Overrides the provider endpoint for embeddings only
    pub endpoint: Option<String>,
    /// Overrides the provider key env var for embeddings only
    pub api_key_env: Option<String>,
    /// Texts per batch request
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Azure,
            model: "text-embedding-3-large".to_string(),
            dimension: retrieval::DEFAULT_DIMENSION,
            endpoint: None,
            api_key_env: None,
            batch_size: retrieval::EMBED_BATCH_SIZE,
        }
    }
}

// =============================================================================
// Memory Configuration
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    #[default]
    Token,
    Embedding,
}

impl std::str::FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "token" => Ok(Self::Token),
            "embedding" => Ok(Self::Embedding),
            _ => Err(format!(
                "Unknown retrieval mode: {}. Valid values: token, embedding",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Line-delimited JSON store
    pub store_path: PathBuf,
    pub retrieval_mode: RetrievalMode,
    pub embedding_cache_path: PathBuf,
    pub max_results: usize,
    /// Disable all memory reads and writes
    pub enabled: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(".rfp-assistant/memory/memories.jsonl"),
            retrieval_mode: RetrievalMode::Token,
            embedding_cache_path: PathBuf::from(".rfp-assistant/memory/embedding_cache.json"),
            max_results: memory::DEFAULT_MAX_RESULTS,
            enabled: true,
        }
    }
}

// =============================================================================
// Retrieval Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Folder of reference documents
    pub docs_dir: PathBuf,
    /// Base path; `.index` and `.meta.json` are appended
    pub index_path: PathBuf,
    pub query_cache_path: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks retrieved per drafted response
    pub chunks_per_response: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("docs"),
            index_path: PathBuf::from(".rfp-assistant/index/reference"),
            query_cache_path: PathBuf::from(".rfp-assistant/index/query_cache.json"),
            chunk_size: retrieval::DEFAULT_CHUNK_SIZE,
            chunk_overlap: retrieval::DEFAULT_CHUNK_OVERLAP,
            chunks_per_response: response::MAX_RAG_CHUNKS,
        }
    }
}

// =============================================================================
// Response / Cache / Knowledge
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Hard ceiling on drafted response length, truncation marker included
    pub max_chars: usize,
    pub temperature: f32,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            max_chars: response::DEFAULT_MAX_CHARS,
            temperature: response::DEFAULT_TEMPERATURE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entries per stage result cache
    pub stage_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stage_capacity: cache::DEFAULT_STAGE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeConfig {
    /// Catalog TOML replacing the built-in one
    pub catalog_path: Option<PathBuf>,
}
