//! AI Integration Layer
//!
//! Provider plumbing for the pipeline: chat completion providers behind a
//! retrying gateway, embedding providers, call timeouts, and recovery of
//! structured model output.

pub mod embedding;
pub mod gateway;
pub mod provider;
pub mod timeout;
pub mod validation;

#[cfg(test)]
pub(crate) mod mock;

pub use embedding::{
    AzureEmbedder, Embedder, OpenAiEmbedder, RetryingEmbedder, SharedEmbedder, cosine_similarity,
    create_embedder,
};
pub use gateway::{LlmGateway, RetryPolicy};
pub use provider::{
    AzureOpenAiProvider, ChatMessage, ChatRole, CompletionRequest, ContentPart, LlmProvider,
    MessageContent, ModelRoute, OpenAiProvider, ProviderKind, SharedProvider,
};
pub use timeout::with_timeout;
pub use validation::{JsonRecovery, Recovered, recover_json, recover_value};
