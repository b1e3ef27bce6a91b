//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (platform config dir, e.g. ~/.config/rfp-assistant/config.toml)
//! 3. Project config (.rfp-assistant/config.toml)
//! 4. Environment variables (RFP_ASSISTANT_* prefix, `__` between levels)

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::types::Config;
use crate::types::{Result, RfpError};

const PROJECT_DIR: &str = ".rfp-assistant";
const ENV_PREFIX: &str = "RFP_ASSISTANT_";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain using Figment:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        Self::load_from(Self::global_config_path(), Self::project_config_path())
    }

    /// Resolution chain with explicit file locations
    pub fn load_from(global: Option<PathBuf>, project: PathBuf) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        if project.exists() {
            debug!("Loading project config from: {}", project.display());
            figment = figment.merge(Toml::file(&project));
        }

        // e.g. RFP_ASSISTANT_RESPONSE__MAX_CHARS -> response.max_chars
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(true));

        let config: Config = figment
            .extract()
            .map_err(|e| RfpError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file only
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .extract()
            .map_err(|e| RfpError::Config(format!("Configuration error: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    /// Platform config directory for rfp-assistant
    pub fn global_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "rfp-assistant").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get path to global config file
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Get path to project config file
    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    /// Get project data directory
    pub fn project_dir() -> PathBuf {
        PathBuf::from(PROJECT_DIR)
    }

    // =========================================================================
    // Config Commands
    // =========================================================================

    /// Show config file paths
    pub fn show_path() {
        println!("Configuration paths:");
        println!();

        if let Some(global) = Self::global_config_path() {
            let exists = if global.exists() { "✓" } else { "✗" };
            println!("  Global:  {} {}", exists, global.display());
        } else {
            println!("  Global:  (not available)");
        }

        let project = Self::project_config_path();
        let exists = if project.exists() { "✓" } else { "✗" };
        println!("  Project: {} {}", exists, project.display());
    }

    /// Show current effective configuration
    pub fn show_config(as_json: bool) -> Result<()> {
        let config = Self::load()?;

        if as_json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config).map_err(|e| RfpError::Config(e.to_string()))?
            );
        }

        Ok(())
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Initialize global configuration
    pub fn init_global(force: bool) -> Result<PathBuf> {
        let global_dir = Self::global_dir().ok_or_else(|| {
            RfpError::Config("Cannot determine global config directory".to_string())
        })?;

        fs::create_dir_all(&global_dir)?;

        let config_path = global_dir.join("config.toml");
        if !config_path.exists() || force {
            fs::write(&config_path, Self::default_global_config())?;
            info!("Created global config: {}", config_path.display());
        } else {
            info!("Global config exists: {}", config_path.display());
        }

        Ok(global_dir)
    }

    /// Initialize project configuration in the current directory
    pub fn init_project() -> Result<PathBuf> {
        Self::init_project_in(Path::new("."))
    }

    /// Initialize project configuration under `base`
    pub fn init_project_in(base: &Path) -> Result<PathBuf> {
        let project_dir = base.join(PROJECT_DIR);

        fs::create_dir_all(&project_dir)?;
        fs::create_dir_all(project_dir.join("memory"))?;
        fs::create_dir_all(project_dir.join("index"))?;
        fs::create_dir_all(project_dir.join("sessions"))?;

        let config_path = project_dir.join("config.toml");
        if !config_path.exists() {
            fs::write(&config_path, Self::default_project_config())?;
            info!("Created project config: {}", config_path.display());
        }

        Ok(project_dir)
    }

    // =========================================================================
    // Internal
    // =========================================================================

    fn default_global_config() -> String {
        r#"# rfp-assistant Global Configuration
# User-wide defaults. Project settings in .rfp-assistant/config.toml override these.

version = "1.0"

[llm]
timeout_secs = 120
max_retries = 2

[providers.openai]
api_base = "https://router.huggingface.co/v1"
api_key_env = "HF_TOKEN"

[providers.azure]
endpoint_env = "AZURE_OPENAI_ENDPOINT"
api_key_env = "AZURE_OPENAI_API_KEY"
api_version = "2024-02-15-preview"
"#
        .to_string()
    }

    fn default_project_config() -> String {
        r#"# rfp-assistant Project Configuration
# Project-specific settings that override global defaults.

version = "1.0"

[memory]
retrieval_mode = "token"

[retrieval]
docs_dir = "docs"
chunk_size = 1000
chunk_overlap = 200

[response]
max_chars = 10000

# Route a stage to another provider or model
# [models.requirements]
# provider = "openai"
# model = "meta-llama/Llama-3.1-8B-Instruct"
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::ProviderKind;
    use crate::config::RetrievalMode;
    use tempfile::TempDir;

    #[test]
    fn test_load_without_files_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config =
            ConfigLoader::load_from(None, temp_dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.retrieval.chunk_size, 1000);
    }

    #[test]
    fn test_project_overrides_global() {
        let temp_dir = TempDir::new().unwrap();
        let global = temp_dir.path().join("global.toml");
        let project = temp_dir.path().join("project.toml");
        fs::write(&global, "[retrieval]\nchunk_size = 800\nchunk_overlap = 100\n").unwrap();
        fs::write(
            &project,
            "[retrieval]\nchunk_overlap = 50\n\n[memory]\nretrieval_mode = \"embedding\"\n\n[models.structure]\nprovider = \"openai\"\nmodel = \"m\"\n",
        )
        .unwrap();

        let config = ConfigLoader::load_from(Some(global), project).unwrap();
        assert_eq!(config.retrieval.chunk_size, 800);
        assert_eq!(config.retrieval.chunk_overlap, 50);
        assert_eq!(config.memory.retrieval_mode, RetrievalMode::Embedding);
        assert_eq!(config.models.structure.provider, ProviderKind::OpenAi);
    }

    #[test]
    fn test_invalid_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.toml");
        fs::write(&path, "[cache]\nstage_capacity = 0\n").unwrap();
        assert!(matches!(
            ConfigLoader::load_from_file(&path),
            Err(RfpError::Config(_))
        ));
    }

    #[test]
    fn test_init_project_in() {
        let temp_dir = TempDir::new().unwrap();
        let dir = ConfigLoader::init_project_in(temp_dir.path()).unwrap();

        assert!(dir.join("config.toml").exists());
        assert!(dir.join("memory").exists());
        assert!(dir.join("index").exists());
        let config = ConfigLoader::load_from_file(&dir.join("config.toml")).unwrap();
        assert_eq!(config.response.max_chars, 10_000);
    }

    #[test]
    fn test_env_override() {
        let temp_dir = TempDir::new().unwrap();
        // SAFETY: variable name is unique to this test
        unsafe {
            std::env::set_var("RFP_ASSISTANT_RESPONSE__MAX_CHARS", "4321");
        }
        let config = ConfigLoader::load_from(None, temp_dir.path().join("none.toml")).unwrap();
        unsafe {
            std::env::remove_var("RFP_ASSISTANT_RESPONSE__MAX_CHARS");
        }
        assert_eq!(config.response.max_chars, 4321);
    }
}
