//! Init Command
//!
//! Initialize rfp-assistant in the current directory.

use crate::cli::ui::Output;
use crate::cli::util::PROJECT_DIR;
use crate::config::ConfigLoader;
use crate::types::{Result, RfpError};

pub fn run(force: bool) -> Result<()> {
    let root = std::env::current_dir()?;
    let project_dir = root.join(PROJECT_DIR);

    if project_dir.exists() && !force {
        return Err(RfpError::Config(
            "Already initialized. Use --force to overwrite.".to_string(),
        ));
    }

    ConfigLoader::init_project_in(&root)?;

    // Never overwrite an existing global config here
    if let Err(e) = ConfigLoader::init_global(false) {
        tracing::debug!("Global config init skipped: {}", e);
    }

    let out = Output::new();
    out.success(&format!("Initialized rfp-assistant in {}/", PROJECT_DIR));
    println!();
    println!("Next steps:");
    println!("  1. Export HF_TOKEN (or configure Azure in {}/config.toml)", PROJECT_DIR);
    println!("  2. Put reference answers in docs/ and run 'rfp-assistant index build'");
    println!("  3. Run 'rfp-assistant analyze <rfp.txt>'");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_project_layout_created() {
        let dir = TempDir::new().unwrap();
        let project = ConfigLoader::init_project_in(dir.path()).unwrap();
        assert!(project.ends_with(PROJECT_DIR));
        assert!(project.join("config.toml").exists());
        assert!(project.join("sessions").is_dir());
    }
}
