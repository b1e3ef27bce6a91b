//! Rendering boundary.
//!
//! Document generators (PDF, DOCX, Markdown) live outside this crate and
//! implement [`DocumentRenderer`]. Only a JSON export ships here.

use serde::{Deserialize, Serialize};

use super::error::Result;
use super::rfp::{ExtractionResult, QualityAssessment, RequirementsResult};

/// One drafted answer, ready for rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRecord {
    pub requirement_id: String,
    pub requirement_text: String,
    pub response_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<QualityAssessment>,
}

pub trait DocumentRenderer {
    /// Produce the rendered byte payload
    fn render(
        &self,
        records: &[ResponseRecord],
        requirements: &RequirementsResult,
        extraction: &ExtractionResult,
    ) -> Result<Vec<u8>>;

    /// File extension for the payload, without the dot
    fn extension(&self) -> &'static str;
}

/// Machine-readable export of the drafted responses
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer {
    pub pretty: bool,
}

#[derive(Serialize)]
struct Export<'a> {
    generated_at: chrono::DateTime<chrono::Utc>,
    language: &'a str,
    cpv_codes: &'a [String],
    requirement_count: usize,
    responses: &'a [ResponseRecord],
    requirements: &'a RequirementsResult,
}

impl DocumentRenderer for JsonRenderer {
    fn render(
        &self,
        records: &[ResponseRecord],
        requirements: &RequirementsResult,
        extraction: &ExtractionResult,
    ) -> Result<Vec<u8>> {
        let export = Export {
            generated_at: chrono::Utc::now(),
            language: &extraction.language,
            cpv_codes: &extraction.cpv_codes,
            requirement_count: requirements.total(),
            responses: records,
            requirements,
        };
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(&export)?
        } else {
            serde_json::to_vec(&export)?
        };
        Ok(bytes)
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}
