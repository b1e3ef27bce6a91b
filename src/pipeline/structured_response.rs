//! Structured Response Agent
//!
//! Drafts one whole document that follows a tender's mandated section
//! structure. Only valid when an explicit structure was detected.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::cache::StageCache;
use super::{ask, prompts};
use crate::ai::{LlmGateway, ModelRoute};
use crate::constants::structured::{
    KB_CONTEXT_CHARS, KB_QUERY_CHARS, MAX_CHUNKS, MAX_EVIDENCE_CHARS, MAX_OUTPUT_TOKENS,
    MIN_OUTPUT_TOKENS, RESULTS_PER_QUERY, TOP_REQUIREMENTS,
};
use crate::knowledge::KnowledgeBase;
use crate::retrieval::{ReferenceIndex, RetrievedChunk};
use crate::types::{
    ExtractionResult, RequirementItem, ResponseResult, Result, RfpError,
    StructureDetectionResult, char_len, truncate_chars,
};

const EVIDENCE_HEADER: &str = "RAG Examples (for content reference only):";
const DEFAULT_COMPANY: &str = "the bidder";

/// Smallest remaining budget still worth a truncated chunk
const MIN_CHUNK_CHARS: usize = 100;

pub struct StructuredResponseStage {
    gateway: Arc<LlmGateway>,
    route: ModelRoute,
    index: Option<Arc<ReferenceIndex>>,
    knowledge: Option<Arc<KnowledgeBase>>,
    temperature: f32,
    cache: StageCache<String, ResponseResult>,
}

impl StructuredResponseStage {
    pub fn new(
        gateway: Arc<LlmGateway>,
        route: ModelRoute,
        temperature: f32,
        cache_capacity: usize,
    ) -> Self {
        Self {
            gateway,
            route,
            index: None,
            knowledge: None,
            temperature,
            cache: StageCache::new("structured_response", cache_capacity),
        }
    }

    pub fn with_index(mut self, index: Arc<ReferenceIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<KnowledgeBase>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub async fn run(
        &self,
        detection: &StructureDetectionResult,
        requirements: &[RequirementItem],
        extraction: &ExtractionResult,
        qa_context: &str,
    ) -> Result<ResponseResult> {
        if !detection.has_explicit_structure {
            return Err(RfpError::PreconditionFailed(
                "Structured response requires an explicit response structure".to_string(),
            ));
        }

        let key = serde_json::to_string(&(detection, requirements, &extraction.language, qa_context))?;
        if let Some(cached) = self.cache.get(&key) {
            info!("Structured response: cache hit");
            return Ok(cached);
        }

        info!(
            "Structured response: starting ({} sections, {} requirements)",
            detection.detected_sections.len(),
            requirements.len()
        );

        let chunks = self.gather_chunks(detection, requirements).await;
        let (evidence, used) = format_evidence(&chunks);

        let (company, knowledge) = match &self.knowledge {
            Some(kb) => (
                kb.catalog.company_name.clone(),
                kb.context_for(&knowledge_query(requirements), KB_CONTEXT_CHARS),
            ),
            None => (DEFAULT_COMPANY.to_string(), String::new()),
        };

        let system = prompts::structured_system(&company);
        let user = prompts::StructuredPrompt {
            structure_description: &detection.structure_description,
            sections: &detection.detected_sections,
            requirements,
            language: &extraction.language,
            company: &company,
            knowledge: &knowledge,
            evidence: &evidence,
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

        let result = ResponseResult {
            response_text: raw.trim().to_string(),
            build_query_used: format!(
                "Structured response following: {}",
                detection.detected_sections.join(", ")
            ),
            num_retrieved_chunks: used,
            notes: format!(
                "Generated structured response with {} sections, using {} RAG chunks",
                detection.detected_sections.len(),
                used
            ),
        };
        info!(
            "Structured response: finished (chars={}, rag_chunks={})",
            char_len(&result.response_text),
            used
        );

        self.cache.insert(key, result.clone());
        Ok(result)
    }

    /// Search on the structure, then per top requirement; unique chunks only.
    async fn gather_chunks(
        &self,
        detection: &StructureDetectionResult,
        requirements: &[RequirementItem],
    ) -> Vec<RetrievedChunk> {
        let Some(index) = self.index.as_ref().filter(|i| i.is_ready()) else {
            debug!("Structured response: no reference index loaded");
            return Vec::new();
        };

        let queries = std::iter::once(detection.structure_description.as_str()).chain(
            requirements
                .iter()
                .take(TOP_REQUIREMENTS)
                .map(|r| r.normalized_text.as_str()),
        );

        let mut seen = HashSet::new();
        let mut chunks = Vec::new();
        for query in queries {
            if chunks.len() >= MAX_CHUNKS {
                break;
            }
            if query.trim().is_empty() {
                continue;
            }
            match index.search(query, RESULTS_PER_QUERY).await {
                Ok(hits) => {
                    for hit in hits {
                        if chunks.len() >= MAX_CHUNKS {
                            break;
                        }
                        if seen.insert(crc32fast::hash(hit.chunk_text.as_bytes())) {
                            chunks.push(hit);
                        }
                    }
                }
                Err(e) => warn!("Structured response: retrieval failed for one query: {}", e),
            }
        }
        debug!("Structured response: {} unique chunk(s) gathered", chunks.len());
        chunks
    }
}

fn knowledge_query(requirements: &[RequirementItem]) -> String {
    requirements
        .iter()
        .take(TOP_REQUIREMENTS)
        .map(|r| truncate_chars(&r.normalized_text, KB_QUERY_CHARS))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Evidence block bounded by chunk count and total characters.
///
/// Returns the block and the number of chunks it holds.
fn format_evidence(chunks: &[RetrievedChunk]) -> (String, usize) {
    if chunks.is_empty() {
        return (String::new(), 0);
    }

    let mut parts = vec![EVIDENCE_HEADER.to_string()];
    let mut remaining = MAX_EVIDENCE_CHARS.saturating_sub(char_len(EVIDENCE_HEADER));

    for (i, chunk) in chunks.iter().take(MAX_CHUNKS).enumerate() {
        let entry = format!("[Ex{}] {}", i + 1, chunk.chunk_text.trim());
        // two chars for the separating newline pair
        let cost = char_len(&entry) + 2;
        if cost <= remaining {
            remaining -= cost;
            parts.push(entry);
            continue;
        }
        if remaining >= MIN_CHUNK_CHARS {
            let cut = truncate_chars(&entry, remaining - 5);
            parts.push(format!("{}...", cut));
        }
        break;
    }

    let used = parts.len() - 1;
    if used == 0 {
        return (String::new(), 0);
    }
    (parts.join("\n\n"), used)
}
