//! CLI Common Utilities
//!
//! Shared initialization and context management for CLI commands.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::ai::{LlmGateway, create_embedder};
use crate::config::{Config, ConfigLoader};
use crate::knowledge::KnowledgeBase;
use crate::memory::MemoryStore;
use crate::pipeline::RfpPipeline;
use crate::retrieval::{PlainTextExtractor, ReferenceIndex, TextExtractor, is_viable_text};
use crate::types::{Result, RfpError};

/// Project data directory name
pub const PROJECT_DIR: &str = ".rfp-assistant";

/// Clarification sessions, relative to the project directory
pub const SESSIONS_PATH: &str = "sessions";

/// Default export file, relative to the project directory
pub const RESPONSES_PATH: &str = "responses.json";

/// Command execution context
///
/// Loaded configuration plus the resources built from it.
#[derive(Clone)]
pub struct CommandContext {
    pub config: Config,
    pub project_dir: PathBuf,
}

impl CommandContext {
    pub fn load() -> Result<Self> {
        let config = ConfigLoader::load()?;
        config.validate()?;
        Ok(Self {
            config,
            project_dir: PathBuf::from(PROJECT_DIR),
        })
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.project_dir.join(SESSIONS_PATH)
    }

    pub fn responses_path(&self) -> PathBuf {
        self.project_dir.join(RESPONSES_PATH)
    }

    pub fn gateway(&self) -> Result<Arc<LlmGateway>> {
        Ok(Arc::new(LlmGateway::from_config(&self.config)?))
    }

    /// Memory store when enabled. Embedding mode falls back to token
    /// scoring when no embedder can be configured.
    pub fn memory(&self) -> Option<Arc<MemoryStore>> {
        if !self.config.memory.enabled {
            return None;
        }
        let embedder = match create_embedder(&self.config) {
            Ok(embedder) => Some(embedder),
            Err(e) => {
                warn!("Embedder unavailable for memory: {}", e);
                None
            }
        };
        Some(Arc::new(MemoryStore::from_config(&self.config.memory, embedder)))
    }

    /// Reference index without loading it
    pub fn reference_index(&self) -> Result<ReferenceIndex> {
        let embedder = create_embedder(&self.config)?;
        Ok(ReferenceIndex::new(&self.config.retrieval, embedder))
    }

    /// The previously built index, or `None` when it cannot be loaded
    pub fn loaded_index(&self) -> Option<Arc<ReferenceIndex>> {
        let mut index = match self.reference_index() {
            Ok(index) => index,
            Err(e) => {
                warn!("Reference index unavailable: {}", e);
                return None;
            }
        };
        match index.load() {
            Ok(stats) => {
                info!("Reference index ready ({} vectors)", stats.num_vectors);
                Some(Arc::new(index))
            }
            Err(e) => {
                warn!("Reference index not loaded, drafting without examples: {}", e);
                None
            }
        }
    }

    pub fn knowledge(&self) -> Result<Arc<KnowledgeBase>> {
        Ok(Arc::new(KnowledgeBase::load(&self.config.knowledge)?))
    }

    /// Fully wired pipeline
    pub fn pipeline(&self) -> Result<RfpPipeline> {
        let mut pipeline =
            RfpPipeline::new(self.gateway()?, &self.config).with_knowledge(self.knowledge()?);
        if let Some(memory) = self.memory() {
            pipeline = pipeline.with_memory(memory);
        }
        if let Some(index) = self.loaded_index() {
            pipeline = pipeline.with_index(index);
        }
        Ok(pipeline)
    }
}

/// Read an RFP document through the plain-text extractor
pub fn read_document(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(RfpError::Config(format!(
            "Document not found: {}",
            path.display()
        )));
    }
    let text = PlainTextExtractor.extract(path)?;
    if !is_viable_text(&text) {
        warn!(
            "{} yielded very little text; it may need OCR before analysis",
            path.display()
        );
    }
    Ok(text)
}

/// Write `bytes` to `path`, creating parent directories
pub fn write_output(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_document_missing() {
        let err = read_document(Path::new("/nonexistent/rfp.txt")).unwrap_err();
        assert!(err.to_string().contains("Document not found"));
    }

    #[test]
    fn test_read_document_and_write_output() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("rfp.txt");
        std::fs::write(&doc, "Tender for case management services.").unwrap();
        assert_eq!(
            read_document(&doc).unwrap(),
            "Tender for case management services."
        );

        let out = dir.path().join("nested/out.json");
        write_output(&out, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "{}");
    }
}
