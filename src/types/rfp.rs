//! RFP pipeline artifacts.
//!
//! Every stage produces one of these as an immutable, cacheable value.
//! Downstream stages only read them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

// =============================================================================
// Extraction
// =============================================================================

/// Structured facts pulled from raw tender text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub language: String,
    #[serde(default)]
    pub cpv_codes: Vec<String>,
    #[serde(default)]
    pub other_codes: Vec<String>,
    #[serde(default)]
    pub key_requirements_summary: String,
    /// Extra structured fields; kept empty so large payloads never travel downstream
    #[serde(default)]
    pub raw_structured: Map<String, Value>,
    /// Always blank, the source text already travels with the caller
    #[serde(default)]
    pub translated_text: String,
}

impl Default for ExtractionResult {
    fn default() -> Self {
        Self::fallback()
    }
}

impl ExtractionResult {
    /// Minimal result used when the model output is unusable: English, no codes.
    pub fn fallback() -> Self {
        Self {
            language: "en".to_string(),
            cpv_codes: Vec::new(),
            other_codes: Vec::new(),
            key_requirements_summary: String::new(),
            raw_structured: Map::new(),
            translated_text: String::new(),
        }
    }

    /// Derive a minimal extraction from a preprocess result when no
    /// extraction call was made.
    pub fn from_preprocess(preprocess: &PreprocessResult) -> Self {
        Self {
            language: if preprocess.language.is_empty() {
                "en".to_string()
            } else {
                preprocess.language.clone()
            },
            key_requirements_summary: preprocess.key_requirements_summary.clone(),
            ..Self::fallback()
        }
    }
}

// =============================================================================
// Preprocess / Scope
// =============================================================================

/// Split of the tender text into the part a bidder needs and the boilerplate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessResult {
    pub language: String,
    pub cleaned_text: String,
    #[serde(default)]
    pub removed_text: String,
    #[serde(default)]
    pub key_requirements_summary: String,
    /// Advisory self-check flag; never blocks downstream stages
    pub comparison_agreement: bool,
    #[serde(default)]
    pub comparison_notes: String,
    #[serde(default)]
    pub rationale: String,
}

impl PreprocessResult {
    /// Keep everything: used when the model output cannot be trusted.
    pub fn passthrough(original: &str, notes: impl Into<String>) -> Self {
        Self {
            language: "en".to_string(),
            cleaned_text: original.to_string(),
            removed_text: String::new(),
            key_requirements_summary: String::new(),
            comparison_agreement: true,
            comparison_notes: notes.into(),
            rationale: String::new(),
        }
    }
}

// =============================================================================
// Requirements
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequirementType {
    Mandatory,
    Optional,
    #[default]
    Unspecified,
}

impl RequirementType {
    /// Lenient parse; anything unknown is `Unspecified`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "mandatory" => Self::Mandatory,
            "optional" => Self::Optional,
            _ => Self::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mandatory => "mandatory",
            Self::Optional => "optional",
            Self::Unspecified => "unspecified",
        }
    }

    /// Tag used in prompt listings, e.g. `[MANDATORY]`
    pub fn tag(&self) -> String {
        self.as_str().to_uppercase()
    }
}

impl fmt::Display for RequirementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One discrete requirement.
///
/// `source_text` is verbatim from the tender; restatement lives only in
/// `normalized_text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementItem {
    pub id: String,
    #[serde(rename = "type", default)]
    pub req_type: RequirementType,
    pub source_text: String,
    pub normalized_text: String,
    #[serde(default)]
    pub category: String,
}

impl RequirementItem {
    /// Build an item, defaulting `normalized_text` to `source_text` when blank.
    pub fn new(
        id: impl Into<String>,
        req_type: RequirementType,
        source_text: impl Into<String>,
        normalized_text: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        let source_text = source_text.into();
        let mut normalized_text = normalized_text.into();
        if normalized_text.trim().is_empty() {
            normalized_text = source_text.clone();
        }
        Self {
            id: id.into(),
            req_type,
            source_text,
            normalized_text,
            category: category.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RequirementsResult {
    pub solution_requirements: Vec<RequirementItem>,
    pub response_structure_requirements: Vec<RequirementItem>,
    #[serde(default)]
    pub notes: String,
    /// Attached after structure detection runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure_detection: Option<StructureDetectionResult>,
}

impl RequirementsResult {
    pub fn total(&self) -> usize {
        self.solution_requirements.len() + self.response_structure_requirements.len()
    }

    pub fn find(&self, id: &str) -> Option<&RequirementItem> {
        self.solution_requirements
            .iter()
            .chain(self.response_structure_requirements.iter())
            .find(|r| r.id == id)
    }
}

// =============================================================================
// Structure Detection
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructureType {
    Explicit,
    Implicit,
    #[serde(rename = "none")]
    Unstructured,
}

impl StructureType {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "explicit" => Self::Explicit,
            "implicit" => Self::Implicit,
            _ => Self::Unstructured,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Implicit => "implicit",
            Self::Unstructured => "none",
        }
    }
}

impl fmt::Display for StructureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the tender mandates an explicit response template.
///
/// Construct through [`StructureDetectionResult::reconciled`] or
/// [`StructureDetectionResult::none`], both of which keep
/// `has_explicit_structure == (structure_type == Explicit)` and never pair
/// detected sections with `Unstructured`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureDetectionResult {
    pub has_explicit_structure: bool,
    pub structure_type: StructureType,
    #[serde(default)]
    pub detected_sections: Vec<String>,
    #[serde(default)]
    pub structure_description: String,
    pub confidence: f64,
}

impl StructureDetectionResult {
    /// No structure, with the given description and confidence.
    pub fn none(description: impl Into<String>, confidence: f64) -> Self {
        Self {
            has_explicit_structure: false,
            structure_type: StructureType::Unstructured,
            detected_sections: Vec::new(),
            structure_description: description.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Reconcile model claims into a consistent result.
    ///
    /// A claimed explicit structure wins over the named type. A named
    /// "explicit" without the claim degrades to implicit (sections found) or
    /// none. Sections always lift `none` to implicit.
    pub fn reconciled(
        claims_explicit: bool,
        claimed_type: StructureType,
        detected_sections: Vec<String>,
        structure_description: impl Into<String>,
        confidence: f64,
    ) -> Self {
        let has_sections = !detected_sections.is_empty();
        let structure_type = if claims_explicit {
            StructureType::Explicit
        } else {
            match claimed_type {
                StructureType::Explicit if has_sections => StructureType::Implicit,
                StructureType::Explicit => StructureType::Unstructured,
                StructureType::Unstructured if has_sections => StructureType::Implicit,
                other => other,
            }
        };
        let confidence = if confidence.is_nan() {
            0.5
        } else {
            confidence.clamp(0.0, 1.0)
        };

        Self {
            has_explicit_structure: structure_type == StructureType::Explicit,
            structure_type,
            detected_sections,
            structure_description: structure_description.into(),
            confidence,
        }
    }
}

// =============================================================================
// Build Query / Response
// =============================================================================

/// Consolidated prompt payload awaiting human confirmation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildQuery {
    pub query_text: String,
    pub solution_requirements_summary: String,
    pub response_structure_requirements_summary: String,
    pub extraction_data: Map<String, Value>,
    /// Human-in-the-loop gate; the builder always leaves this false
    pub confirmed: bool,
}

impl BuildQuery {
    /// Record the external confirmation act.
    pub fn confirm(&mut self) {
        self.confirmed = true;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseResult {
    pub response_text: String,
    pub build_query_used: String,
    pub num_retrieved_chunks: usize,
    pub notes: String,
}

// =============================================================================
// Quality Assessment
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Completeness {
    Complete,
    Partial,
    Incomplete,
    Unknown,
}

impl Completeness {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "complete" => Self::Complete,
            "partial" => Self::Partial,
            "incomplete" => Self::Incomplete,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relevance {
    High,
    Medium,
    Low,
    Unknown,
}

impl Relevance {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Unknown,
        }
    }
}

/// Reviewer-style assessment of a drafted response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// 0-100
    pub score: u8,
    pub completeness: Completeness,
    pub relevance: Relevance,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

impl QualityAssessment {
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self {
            score: 50,
            completeness: Completeness::Unknown,
            relevance: Relevance::Unknown,
            issues: vec![format!("Quality assessment failed: {}", reason)],
            suggestions: Vec::new(),
        }
    }
}
