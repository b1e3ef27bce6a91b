pub mod dialogue;
pub mod error;
pub mod render;
pub mod rfp;
pub mod utils;

pub use dialogue::{Answer, ConversationContext, Priority, Question, SessionStore};
pub use error::{Result, ResultExt, RfpError};
pub use render::{DocumentRenderer, JsonRenderer, ResponseRecord};
pub use rfp::{
    BuildQuery, Completeness, ExtractionResult, PreprocessResult, QualityAssessment, Relevance,
    RequirementItem, RequirementType, RequirementsResult, ResponseResult,
    StructureDetectionResult, StructureType,
};
pub use utils::{
    char_len, fingerprint, json_bool, json_f64, json_string, json_string_array, json_string_or,
    json_text, tail_chars, truncate_chars, truncate_with_ellipsis,
};

// =============================================================================
// Domain Newtypes
// =============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type-safe wrapper for clarification session IDs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Pipeline stage tag carried by memory records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preprocess,
    Requirements,
    BuildQuery,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preprocess => "preprocess",
            Self::Requirements => "requirements",
            Self::BuildQuery => "build_query",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = RfpError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "preprocess" => Ok(Self::Preprocess),
            "requirements" => Ok(Self::Requirements),
            "build_query" => Ok(Self::BuildQuery),
            other => Err(RfpError::Config(format!(
                "Unknown stage: {}. Supported: preprocess, requirements, build_query",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_parse_and_display() {
        assert_eq!("build-query".parse::<Stage>().unwrap(), Stage::BuildQuery);
        assert_eq!(Stage::Preprocess.to_string(), "preprocess");
        assert!("scope".parse::<Stage>().is_err());
        assert_eq!(
            serde_json::to_value(Stage::BuildQuery).unwrap(),
            serde_json::json!("build_query")
        );
    }
}
