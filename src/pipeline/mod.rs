//! RFP Pipeline
//!
//! Stages that turn raw tender text into drafted responses:
//! - Extraction and preprocessing (run concurrently)
//! - Requirements splitting and structure detection
//! - Query building and the human confirmation gate
//! - Per-requirement and structured response drafting
//! - Clarification questions, quality assessment, pre-generation validation
//!
//! Each stage owns an LRU result cache and calls the [`LlmGateway`] through
//! [`ask`]. Model output goes through [`crate::ai::JsonRecovery`] before a
//! typed result is built.

pub mod cache;
pub mod extraction;
pub mod orchestrator;
pub mod preprocess;
pub mod prompts;
pub mod quality;
pub mod query;
pub mod questions;
pub mod requirements;
pub mod response;
pub mod structure;
pub mod structured_response;
pub mod validation;

pub use cache::{CacheStats, StageCache};
pub use extraction::ExtractionStage;
pub use orchestrator::{PipelineOutput, RfpPipeline};
pub use preprocess::PreprocessStage;
pub use quality::QualityStage;
pub use query::{
    NO_SOLUTION_REQUIREMENTS, NO_STRUCTURE_REQUIREMENTS, QueryBuilder, build_query,
    build_query_for_requirement,
};
pub use questions::QuestionStage;
pub use requirements::RequirementsStage;
pub use response::{ResponseStage, truncate_response};
pub use structure::StructureStage;
pub use structured_response::StructuredResponseStage;
pub use validation::validate_before_generation;

use crate::ai::{ChatMessage, LlmGateway, ModelRoute};
use crate::types::Result;

/// One system + user exchange through the gateway.
pub(crate) async fn ask(
    gateway: &LlmGateway,
    route: &ModelRoute,
    system: &str,
    user: String,
    temperature: f32,
    max_tokens: Option<u32>,
) -> Result<String> {
    let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
    gateway
        .complete(route, messages, temperature, max_tokens)
        .await
}
