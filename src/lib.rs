//! rfp-assistant - LLM Pipeline for RFP Analysis and Response Drafting
//!
//! Turns a raw tender document into structured requirements and drafted
//! answers through a chain of model-backed stages.
//!
//! ## Core Features
//!
//! - **Staged Pipeline**: extraction, preprocessing, requirements, structure
//!   detection, query building, response drafting
//! - **Confirmation Gate**: responses are drafted only from confirmed queries
//! - **JSON Recovery**: tolerant parsing of fenced, truncated or noisy output
//! - **Reference Retrieval**: flat L2 index over prior answers for examples
//! - **Local Memory**: line-delimited history of earlier runs
//! - **Knowledge Injection**: company capabilities and case studies in prompts
//!
//! ## Quick Start
//!
//! ```ignore
//! use rfp_assistant::{ConfigLoader, LlmGateway, RfpPipeline};
//!
//! let config = ConfigLoader::load()?;
//! let gateway = Arc::new(LlmGateway::from_config(&config)?);
//! let pipeline = RfpPipeline::new(gateway, &config);
//!
//! let output = pipeline.analyze(&rfp_text).await?;
//! let mut query = pipeline.build_query(&output);
//! query.confirm();
//! let response = pipeline.respond(&query, "").await?;
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: providers, gateway with retries, embeddings, JSON recovery
//! - [`pipeline`]: the stages and their orchestrator
//! - [`retrieval`]: document chunking and the reference index
//! - [`memory`]: local memory store
//! - [`knowledge`]: company profile and capability catalog
//! - [`config`]: layered configuration

pub mod ai;
pub mod cli;
pub mod config;
pub mod constants;
pub mod knowledge;
pub mod memory;
pub mod pipeline;
pub mod retrieval;
pub mod storage;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{Config, ConfigLoader, RetrievalMode};

// Error Types
pub use types::error::{Result, ResultExt, RfpError};

// Domain Types
pub use types::{
    BuildQuery, ConversationContext, DocumentRenderer, ExtractionResult, JsonRenderer,
    PreprocessResult, QualityAssessment, Question, RequirementItem, RequirementType,
    RequirementsResult, ResponseRecord, ResponseResult, SessionStore, Stage,
    StructureDetectionResult,
};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use pipeline::{PipelineOutput, RfpPipeline, validate_before_generation};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    // Gateway
    LlmGateway,
    // Providers
    LlmProvider,
    ModelRoute,
    ProviderKind,
    RetryPolicy,
    // Embeddings
    Embedder,
    SharedEmbedder,
    // Recovery
    JsonRecovery,
    // Timeout
    with_timeout,
};

// =============================================================================
// Retrieval / Memory / Knowledge Re-exports
// =============================================================================

pub use knowledge::KnowledgeBase;
pub use memory::MemoryStore;
pub use retrieval::ReferenceIndex;
