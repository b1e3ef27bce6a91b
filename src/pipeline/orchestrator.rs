//! Pipeline Orchestrator
//!
//! Wires the stages together. `analyze` runs extraction and preprocessing
//! concurrently, then requirements and structure detection. Downstream
//! operations take the analysis output as plain data, so each stage's
//! artifact survives a later stage's failure.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::{
    ExtractionStage, PreprocessStage, QualityStage, QueryBuilder, QuestionStage,
    RequirementsStage, ResponseStage, StructureStage, StructuredResponseStage,
    validate_before_generation,
};
use crate::ai::LlmGateway;
use crate::config::Config;
use crate::knowledge::KnowledgeBase;
use crate::memory::{MemoryPayload, MemoryStore};
use crate::retrieval::ReferenceIndex;
use crate::types::{
    BuildQuery, ExtractionResult, PreprocessResult, QualityAssessment, Question,
    RequirementItem, RequirementsResult, ResponseResult, Result, RfpError, Stage, char_len,
};

/// Everything `analyze` produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub extraction: ExtractionResult,
    pub preprocess: PreprocessResult,
    /// Structure detection is attached
    pub requirements: RequirementsResult,
}

/// A build query tied to the requirement it was built for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementQuery {
    pub requirement: RequirementItem,
    pub query: BuildQuery,
}

pub struct RfpPipeline {
    extraction: ExtractionStage,
    preprocess: PreprocessStage,
    requirements: RequirementsStage,
    structure: StructureStage,
    queries: QueryBuilder,
    response: ResponseStage,
    structured: StructuredResponseStage,
    questions: QuestionStage,
    quality: QualityStage,
    memory: Option<Arc<MemoryStore>>,
    chunks_per_response: usize,
}

impl RfpPipeline {
    pub fn new(gateway: Arc<LlmGateway>, config: &Config) -> Self {
        let models = &config.models;
        let capacity = config.cache.stage_capacity;

        Self {
            extraction: ExtractionStage::new(gateway.clone(), models.extraction.clone(), capacity),
            preprocess: PreprocessStage::new(
                gateway.clone(),
                models.preprocess.clone(),
                models.comparison.clone(),
                capacity,
            ),
            requirements: RequirementsStage::new(
                gateway.clone(),
                models.requirements.clone(),
                capacity,
            ),
            structure: StructureStage::new(gateway.clone(), models.structure.clone(), capacity),
            queries: QueryBuilder::new(capacity),
            response: ResponseStage::new(
                gateway.clone(),
                models.response.clone(),
                models.clarity.clone(),
                &config.response,
                capacity,
            ),
            structured: StructuredResponseStage::new(
                gateway.clone(),
                models.structured_response.clone(),
                config.response.temperature,
                capacity,
            ),
            questions: QuestionStage::new(gateway.clone(), models.questions.clone(), capacity),
            quality: QualityStage::new(gateway, models.quality.clone(), capacity),
            memory: None,
            chunks_per_response: config.retrieval.chunks_per_response,
        }
    }

    pub fn with_memory(mut self, memory: Arc<MemoryStore>) -> Self {
        self.response = self.response.with_memory(memory.clone());
        self.memory = Some(memory);
        self
    }

    pub fn with_index(mut self, index: Arc<ReferenceIndex>) -> Self {
        self.response = self
            .response
            .with_index(index.clone(), self.chunks_per_response);
        self.structured = self.structured.with_index(index);
        self
    }

    pub fn with_knowledge(mut self, knowledge: Arc<KnowledgeBase>) -> Self {
        self.questions = self.questions.with_company(knowledge.company.clone());
        self.response = self.response.with_knowledge(knowledge.clone());
        self.structured = self.structured.with_knowledge(knowledge);
        self
    }

    // =========================================================================
    // Analysis
    // =========================================================================

    pub async fn analyze(&self, text: &str) -> Result<PipelineOutput> {
        let started = Instant::now();
        info!("Pipeline: analyzing {} chars", char_len(text));

        let (extraction, preprocess) =
            tokio::join!(self.extraction.run(text), self.preprocess.run(text));
        let extraction = extraction.map_err(|e| RfpError::stage("extraction", e))?;
        let preprocess = preprocess.map_err(|e| RfpError::stage("preprocess", e))?;
        if !preprocess.comparison_agreement {
            info!("Pipeline: preprocess self-check flagged: {}", preprocess.comparison_notes);
        }

        let mut requirements = self
            .requirements
            .run(&preprocess.cleaned_text, &extraction)
            .await
            .map_err(|e| RfpError::stage("requirements", e))?;

        let detection = self
            .structure
            .run(&requirements.response_structure_requirements)
            .await;
        requirements.structure_detection = Some(detection);

        if let Some(memory) = &self.memory {
            memory
                .store(text, Stage::Preprocess, MemoryPayload::preprocess(&preprocess))
                .await;
            memory
                .store(
                    text,
                    Stage::Requirements,
                    MemoryPayload::requirements(&requirements, Some(&extraction.language)),
                )
                .await;
        }

        info!(
            "Pipeline: analysis finished in {:.1}s ({} solution, {} response-structure requirements)",
            started.elapsed().as_secs_f64(),
            requirements.solution_requirements.len(),
            requirements.response_structure_requirements.len()
        );
        Ok(PipelineOutput {
            extraction,
            preprocess,
            requirements,
        })
    }

    /// Problems that should block drafting; empty when ready.
    pub fn validate(&self, output: &PipelineOutput) -> Vec<String> {
        validate_before_generation(&output.extraction, &output.requirements)
    }

    // =========================================================================
    // Drafting
    // =========================================================================

    /// One unconfirmed query for the whole requirement set.
    pub fn build_query(&self, output: &PipelineOutput) -> BuildQuery {
        self.queries.build(&output.extraction, &output.requirements)
    }

    /// One unconfirmed query per solution requirement, in requirement order.
    pub fn build_queries(&self, output: &PipelineOutput) -> Vec<RequirementQuery> {
        let structure = &output.requirements.response_structure_requirements;
        output
            .requirements
            .solution_requirements
            .iter()
            .map(|item| RequirementQuery {
                requirement: item.clone(),
                query: self
                    .queries
                    .build_for_requirement(&output.extraction, item, structure),
            })
            .collect()
    }

    pub async fn respond(&self, query: &BuildQuery, qa_context: &str) -> Result<ResponseResult> {
        if query.confirmed
            && let Some(memory) = &self.memory
        {
            memory
                .store(
                    &query.query_text,
                    Stage::BuildQuery,
                    MemoryPayload::build_query(query),
                )
                .await;
        }
        self.response
            .run(query, qa_context)
            .await
            .map_err(|e| RfpError::stage("response", e))
    }

    pub async fn respond_structured(
        &self,
        output: &PipelineOutput,
        qa_context: &str,
    ) -> Result<ResponseResult> {
        let detection = output.requirements.structure_detection.as_ref().ok_or_else(|| {
            RfpError::stage(
                "structured_response",
                RfpError::PreconditionFailed("Structure detection has not run".to_string()),
            )
        })?;
        self.structured
            .run(
                detection,
                &output.requirements.solution_requirements,
                &output.extraction,
                qa_context,
            )
            .await
            .map_err(|e| RfpError::stage("structured_response", e))
    }

    pub async fn generate_questions(&self, output: &PipelineOutput) -> Vec<Question> {
        self.questions.run(&output.requirements).await
    }

    pub async fn assess(&self, requirement: &RequirementItem, response: &str) -> QualityAssessment {
        debug!("Pipeline: assessing response for {}", requirement.id);
        self.quality.assess(requirement, response).await
    }
}
