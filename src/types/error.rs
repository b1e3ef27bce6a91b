//! Unified Error Type System
//!
//! Centralized error types for the whole crate.
//!
//! ## Error Classes
//!
//! - **Timeout**: transient provider failure, the only class the gateway retries
//! - **LlmApi**: generic provider failure, surfaced immediately
//! - **MalformedOutput**: model output that JSON recovery could not salvage
//! - **PreconditionFailed**: caller contract violation caught before any provider call
//! - **NotReady**: retrieval index used before it was built or loaded
//! - **Stage**: a fatal stage failure wrapped with the stage name

use std::time::Duration;
use thiserror::Error;

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum RfpError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // LLM Errors
    // -------------------------------------------------------------------------
    /// Generic provider failure (HTTP status, transport, empty content)
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// Operation timeout with context
    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Embedding provider failure
    #[error("Embedding error: {0}")]
    Embedding(String),

    // -------------------------------------------------------------------------
    // Pipeline Errors
    // -------------------------------------------------------------------------
    /// Model output could not be parsed even after repair and field recovery
    #[error("Malformed model output{}: {message}", offset.map(|o| format!(" at byte {}", o)).unwrap_or_default())]
    MalformedOutput {
        offset: Option<usize>,
        message: String,
    },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Not ready: {0}")]
    NotReady(String),

    /// Fatal failure inside a named pipeline stage
    #[error("Stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<RfpError>,
    },

    // -------------------------------------------------------------------------
    // Domain Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type Result<T> = std::result::Result<T, RfpError>;

// =============================================================================
// Helper Functions
// =============================================================================

impl RfpError {
    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Wrap an error with the name of the stage that produced it.
    ///
    /// Already-wrapped errors keep their innermost stage name.
    pub fn stage(stage: impl Into<String>, source: RfpError) -> Self {
        match source {
            Self::Stage { .. } => source,
            other => Self::Stage {
                stage: stage.into(),
                source: Box::new(other),
            },
        }
    }

    /// Create a malformed output error
    pub fn malformed(offset: Option<usize>, message: impl Into<String>) -> Self {
        Self::MalformedOutput {
            offset,
            message: message.into(),
        }
    }

    /// Timeouts are the only retryable class
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Stage { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    pub fn is_precondition(&self) -> bool {
        match self {
            Self::PreconditionFailed(_) => true,
            Self::Stage { source, .. } => source.is_precondition(),
            _ => false,
        }
    }

    /// Name of the failing stage, if this error was raised by one
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            Self::Stage { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| RfpError::Storage(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| RfpError::Storage(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_is_retryable_class() {
        let err = RfpError::timeout("chat completion", Duration::from_secs(120));
        assert!(err.is_timeout());
        assert!(!RfpError::LlmApi("500".to_string()).is_timeout());
    }

    #[test]
    fn test_stage_wrapping_keeps_inner_stage() {
        let inner = RfpError::stage("requirements", RfpError::malformed(Some(12), "eof"));
        let outer = RfpError::stage("pipeline", inner);
        assert_eq!(outer.stage_name(), Some("requirements"));
    }

    #[test]
    fn test_stage_wrapping_preserves_predicates() {
        let err = RfpError::stage(
            "response",
            RfpError::PreconditionFailed("unconfirmed".to_string()),
        );
        assert!(err.is_precondition());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_malformed_display_includes_offset() {
        let err = RfpError::malformed(Some(42), "expected value");
        assert_eq!(
            err.to_string(),
            "Malformed model output at byte 42: expected value"
        );

        let err = RfpError::malformed(None, "no fields");
        assert_eq!(err.to_string(), "Malformed model output: no fields");
    }

    #[test]
    fn test_with_context() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::other("disk full"));
        let err = res.with_context("writing memory record").unwrap_err();
        assert!(err.to_string().contains("writing memory record: disk full"));
    }
}
