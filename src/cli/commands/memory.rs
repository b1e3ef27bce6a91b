//! Memory Command
//!
//! Inspects the local memory of earlier pipeline runs.
//!
//! Usage:
//!   rfp-assistant memory search <query> [--stage requirements] [-n 5]

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::types::{Result, RfpError, Stage};

pub async fn search(query: &str, stage: Option<&str>, limit: Option<usize>) -> Result<()> {
    let ctx = CommandContext::load()?;
    let out = Output::new();
    let stage = stage.map(str::parse::<Stage>).transpose()?;

    let memory = ctx
        .memory()
        .ok_or_else(|| RfpError::Config("Memory is disabled in configuration".to_string()))?;
    let limit = limit.unwrap_or(ctx.config.memory.max_results);

    let hits = memory.search(query, limit, stage).await?;
    if hits.is_empty() {
        out.info("No related memories");
        return Ok(());
    }

    for hit in &hits {
        out.section(&format!(
            "{} [{}] score {:.3}",
            hit.record.created_at.format("%Y-%m-%d %H:%M"),
            hit.record.stage,
            hit.score
        ));
        println!("{}", hit.snippet);
    }
    out.info(&format!(
        "{} hit(s) from {}",
        hits.len(),
        memory.path().display()
    ));
    Ok(())
}
