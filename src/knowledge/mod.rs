//! Vendor Knowledge
//!
//! Static company knowledge injected into stage prompts: a capability catalog
//! matched against requirement text, and a company profile used to suppress
//! questions the bidder can already answer. The content is data, loaded from
//! TOML; a default catalog is compiled in.

mod catalog;
mod company;

pub use catalog::{Accelerator, Capability, CaseStudy, KnowledgeCatalog};
pub use company::CompanyProfile;

use std::fs;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::KnowledgeConfig;
use crate::types::{Result, RfpError};

const DEFAULT_CATALOG: &str = include_str!("default_catalog.toml");

#[derive(Deserialize)]
struct CatalogFile {
    company: CompanySection,
    #[serde(default)]
    capabilities: Vec<Capability>,
    #[serde(default)]
    case_studies: Vec<CaseStudy>,
    #[serde(default)]
    accelerators: Vec<Accelerator>,
}

#[derive(Deserialize)]
struct CompanySection {
    #[serde(flatten)]
    profile: CompanyProfile,
    #[serde(default)]
    overview: String,
    #[serde(default)]
    differentiators: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeBase {
    pub catalog: KnowledgeCatalog,
    pub company: CompanyProfile,
}

impl KnowledgeBase {
    pub fn builtin() -> Result<Self> {
        Self::from_toml(DEFAULT_CATALOG)
    }

    /// The configured catalog file, or the built-in one.
    pub fn load(config: &KnowledgeConfig) -> Result<Self> {
        match &config.catalog_path {
            Some(path) => {
                debug!("Loading knowledge catalog from {}", path.display());
                let content = fs::read_to_string(path).map_err(|e| {
                    RfpError::Config(format!("Cannot read catalog {}: {}", path.display(), e))
                })?;
                Self::from_toml(&content)
            }
            None => Self::builtin(),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content)
            .map_err(|e| RfpError::Config(format!("Invalid knowledge catalog: {}", e)))?;

        let kb = Self {
            catalog: KnowledgeCatalog {
                company_name: file.company.profile.name.clone(),
                overview: file.company.overview,
                differentiators: file.company.differentiators,
                capabilities: file.capabilities,
                case_studies: file.case_studies,
                accelerators: file.accelerators,
            },
            company: file.company.profile,
        };
        info!(
            "Knowledge base loaded: {} capabilities, {} case studies, {} accelerators",
            kb.catalog.capabilities.len(),
            kb.catalog.case_studies.len(),
            kb.catalog.accelerators.len()
        );
        Ok(kb)
    }

    /// Prompt block for `requirement`, at most `max_chars` plus an ellipsis.
    pub fn context_for(&self, requirement: &str, max_chars: usize) -> String {
        self.catalog.format_for_prompt(requirement, max_chars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_catalog_parses() {
        let kb = KnowledgeBase::builtin().unwrap();
        assert_eq!(kb.company.name, "Northwind Digital");
        assert_eq!(kb.catalog.company_name, "Northwind Digital");
        assert!(!kb.catalog.overview.is_empty());
        assert!(kb.catalog.capabilities.len() >= 2);
        assert!(kb.catalog.accelerators.len() >= 2);
    }

    #[test]
    fn test_load_custom_catalog() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("kb.toml");
        fs::write(
            &path,
            "[company]\nname = \"Acme\"\noverview = \"We build things.\"\n\n[[capabilities]]\nname = \"Widgets\"\ndescription = \"All widgets\"\n",
        )
        .unwrap();

        let kb = KnowledgeBase::load(&KnowledgeConfig {
            catalog_path: Some(path),
        })
        .unwrap();
        assert_eq!(kb.company.name, "Acme");
        assert_eq!(kb.catalog.capabilities.len(), 1);
        assert!(kb.catalog.case_studies.is_empty());
        assert!(kb.context_for("anything", 10_000).starts_with("ACME COMPANY OVERVIEW:"));
    }

    #[test]
    fn test_invalid_catalog_is_config_error() {
        assert!(matches!(
            KnowledgeBase::from_toml("company = 3"),
            Err(RfpError::Config(_))
        ));
    }
}
