//! Response Agent
//!
//! Drafts the answer to one confirmed build query. Reference examples, the
//! knowledge catalog and long-term memory are optional enrichments; none of
//! them can fail the stage.
//!
//! Memory is consulted only when a small clarity check judges the
//! requirement unclear (or the check itself fails).

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cache::StageCache;
use super::{ask, prompts};
use crate::ai::{JsonRecovery, LlmGateway, ModelRoute};
use crate::config::ResponseConfig;
use crate::constants::response::{
    BOUNDARY_WINDOW_RATIO, CLARITY_MAX_TOKENS, KB_CONTEXT_CHARS, KB_QUERY_CHARS, MAX_OUTPUT_TOKENS,
    MAX_RAG_CHUNKS, MEMORY_RESULTS, MIN_OUTPUT_TOKENS, RAG_CHUNK_CHARS, RAG_QUERY_CHARS,
    TRUNCATION_MARKER,
};
use crate::knowledge::KnowledgeBase;
use crate::memory::MemoryStore;
use crate::retrieval::ReferenceIndex;
use crate::types::{
    BuildQuery, ResponseResult, Result, RfpError, char_len, json_string, json_string_array,
    truncate_chars, truncate_with_ellipsis,
};

const DEFAULT_COMPANY: &str = "the bidder";

/// Outcome of the clarity sub-check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Clarity {
    Clear,
    Unclear,
    Unknown,
}

pub struct ResponseStage {
    gateway: Arc<LlmGateway>,
    route: ModelRoute,
    clarity_route: ModelRoute,
    index: Option<Arc<ReferenceIndex>>,
    memory: Option<Arc<MemoryStore>>,
    knowledge: Option<Arc<KnowledgeBase>>,
    chunks_per_response: usize,
    max_chars: usize,
    temperature: f32,
    cache: StageCache<(String, String), ResponseResult>,
}

impl ResponseStage {
    pub fn new(
        gateway: Arc<LlmGateway>,
        route: ModelRoute,
        clarity_route: ModelRoute,
        config: &ResponseConfig,
        cache_capacity: usize,
    ) -> Self {
        Self {
            gateway,
            route,
            clarity_route,
            index: None,
            memory: None,
            knowledge: None,
            chunks_per_response: MAX_RAG_CHUNKS,
            max_chars: config.max_chars,
            temperature: config.temperature,
            cache: StageCache::new("response", cache_capacity),
        }
    }

    pub fn with_index(mut self, index: Arc<ReferenceIndex>, chunks_per_response: usize) -> Self {
        self.index = Some(index);
        self.chunks_per_response = chunks_per_response;
        self
    }

    pub fn with_memory(mut self, memory: Arc<MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<KnowledgeBase>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn cache(&self) -> &StageCache<(String, String), ResponseResult> {
        &self.cache
    }

    /// Draft a response for `query`, which must be confirmed.
    ///
    /// `qa_context` carries bidder answers from a clarification session and
    /// may be empty.
    pub async fn run(&self, query: &BuildQuery, qa_context: &str) -> Result<ResponseResult> {
        if !query.confirmed {
            return Err(RfpError::PreconditionFailed(
                "Build query must be confirmed before generating a response".to_string(),
            ));
        }

        let key = (query.query_text.clone(), qa_context.to_string());
        if let Some(cached) = self.cache.get(&key) {
            info!("Response: cache hit");
            return Ok(cached);
        }

        let requirement = query.solution_requirements_summary.as_str();
        info!(
            "Response: starting (requirement_chars={}, qa_context={})",
            char_len(requirement),
            !qa_context.is_empty()
        );

        let (examples, num_chunks) = self.reference_examples(query).await;
        let (company, knowledge) = match &self.knowledge {
            Some(kb) => (
                kb.catalog.company_name.clone(),
                kb.context_for(truncate_chars(requirement, KB_QUERY_CHARS), KB_CONTEXT_CHARS),
            ),
            None => (DEFAULT_COMPANY.to_string(), String::new()),
        };
        let (memory, memory_note) = self.related_memory(requirement).await;

        let system = prompts::response_system(&company);
        let user = prompts::ResponsePrompt {
            requirement,
            structure_summary: &query.response_structure_requirements_summary,
            company: &company,
            knowledge: &knowledge,
            examples: &examples,
            memory: &memory,
            qa_context,
        }
        .render();
        let max_tokens =
            prompts::output_budget(&system, &user, 100, MIN_OUTPUT_TOKENS, MAX_OUTPUT_TOKENS);

        let raw = ask(
            &self.gateway,
            &self.route,
            &system,
            user,
            self.temperature,
            Some(max_tokens),
        )
        .await?;

        let response_text = truncate_response(raw.trim(), self.max_chars);
        let rag_note = if num_chunks > 0 {
            format!("Generated with {} RAG chunks", num_chunks)
        } else {
            "Generated without RAG".to_string()
        };
        let result = ResponseResult {
            response_text,
            build_query_used: query.query_text.clone(),
            num_retrieved_chunks: num_chunks,
            notes: format!("{}. {}", rag_note, memory_note),
        };
        info!(
            "Response: finished (chars={}, rag_chunks={})",
            char_len(&result.response_text),
            num_chunks
        );

        self.cache.insert(key, result.clone());
        Ok(result)
    }

    /// Reference examples block and the number of chunks it holds.
    async fn reference_examples(&self, query: &BuildQuery) -> (String, usize) {
        let Some(index) = self.index.as_ref().filter(|i| i.is_ready()) else {
            debug!("Response: no reference index loaded");
            return (String::new(), 0);
        };

        let search = format!(
            "{}\n{}",
            truncate_chars(&query.solution_requirements_summary, RAG_QUERY_CHARS),
            truncate_chars(&query.response_structure_requirements_summary, RAG_QUERY_CHARS)
        );
        let k = self.chunks_per_response.min(MAX_RAG_CHUNKS);

        match index.search(&search, k).await {
            Ok(chunks) if !chunks.is_empty() => {
                let mut parts = vec!["RAG Examples (content only, ignore layout):".to_string()];
                parts.extend(chunks.iter().enumerate().map(|(i, chunk)| {
                    format!(
                        "[Ex{}] {}",
                        i + 1,
                        truncate_with_ellipsis(&chunk.chunk_text, RAG_CHUNK_CHARS)
                    )
                }));
                (parts.join("\n\n"), chunks.len())
            }
            Ok(_) => (String::new(), 0),
            Err(e) => {
                warn!("Response: reference retrieval failed, continuing without: {}", e);
                (String::new(), 0)
            }
        }
    }

    /// Memory snippets for unclear requirements, plus a note for the result.
    async fn related_memory(&self, requirement: &str) -> (String, String) {
        let Some(memory) = &self.memory else {
            return (String::new(), "Memory not configured.".to_string());
        };

        let clarity = self.check_clarity(requirement).await;
        if clarity == Clarity::Clear {
            return (
                String::new(),
                "Memory skipped (requirement is clear).".to_string(),
            );
        }

        match memory.search(requirement, MEMORY_RESULTS, None).await {
            Ok(hits) if !hits.is_empty() => {
                let snippets = hits
                    .iter()
                    .map(|hit| format!("- ({}) {}", hit.record.stage, hit.snippet))
                    .collect::<Vec<_>>()
                    .join("\n");
                let note = format!("Memory: {} related snippet(s) used.", hits.len());
                (snippets, note)
            }
            Ok(_) => (String::new(), "Memory: no related snippets.".to_string()),
            Err(e) => {
                warn!("Response: memory search failed, continuing without: {}", e);
                (String::new(), "Memory unavailable.".to_string())
            }
        }
    }

    async fn check_clarity(&self, requirement: &str) -> Clarity {
        let raw = match ask(
            &self.gateway,
            &self.clarity_route,
            prompts::CLARITY_SYSTEM,
            prompts::clarity_user(requirement),
            0.0,
            Some(CLARITY_MAX_TOKENS),
        )
        .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Response: clarity check failed, treating as unclear: {}", e);
                return Clarity::Unknown;
            }
        };

        let value = match JsonRecovery::recover(&raw) {
            Ok(recovered) => recovered.into_value(),
            Err(e) => {
                warn!("Response: clarity output unusable, treating as unclear: {}", e);
                return Clarity::Unknown;
            }
        };

        let clarity = match json_string(&value, "clarity")
            .unwrap_or_default()
            .trim()
            .to_lowercase()
            .as_str()
        {
            "clear" => Clarity::Clear,
            "unclear" => Clarity::Unclear,
            _ => Clarity::Unknown,
        };
        let questions = json_string_array(&value, "questions");
        debug!(
            "Response: clarity={:?}, {} clarifying question(s)",
            clarity,
            questions.len()
        );
        clarity
    }
}

/// Enforce the character ceiling, marker included.
///
/// Cuts after the last sentence or line break that falls in the final 20% of
/// the budget, else at the last whitespace in that window, else hard.
pub fn truncate_response(text: &str, max_chars: usize) -> String {
    if char_len(text) <= max_chars {
        return text.to_string();
    }

    let marker_chars = char_len(TRUNCATION_MARKER);
    if max_chars <= marker_chars {
        return truncate_chars(text, max_chars).to_string();
    }

    let budget = max_chars - marker_chars;
    let head = truncate_chars(text, budget);
    let window_start = (budget as f64 * BOUNDARY_WINDOW_RATIO) as usize;

    let mut boundary = None;
    let mut whitespace = None;
    for (pos, (idx, c)) in head.char_indices().enumerate().skip(window_start) {
        if c == '.' || c == '\n' {
            boundary = Some(idx + c.len_utf8());
        }
        if c.is_whitespace() && pos > 0 {
            whitespace = Some(idx);
        }
    }

    let cut = match boundary.or(whitespace) {
        Some(end) => head[..end].trim_end(),
        None => head,
    };
    format!("{}{}", cut, TRUNCATION_MARKER)
}
