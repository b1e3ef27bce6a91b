//! Index Command
//!
//! Builds and queries the reference-document index used for drafting
//! examples.
//!
//! Usage:
//!   rfp-assistant index build [--docs <dir>]
//!   rfp-assistant index stats [-f json]
//!   rfp-assistant index search <query> [-k 5]

use std::path::PathBuf;

use crate::cli::ui::Output;
use crate::cli::util::CommandContext;
use crate::retrieval::{IndexStats, ReferenceIndex};
use crate::types::{Result, truncate_with_ellipsis};

pub async fn build(docs_dir: Option<PathBuf>) -> Result<()> {
    let mut ctx = CommandContext::load()?;
    if let Some(dir) = docs_dir {
        ctx.config.retrieval.docs_dir = dir;
    }
    let out = Output::new();

    let mut index = ctx.reference_index()?;
    let stats = index.build().await?;
    out.success("Reference index built");
    print_stats(&out, &stats);
    Ok(())
}

pub fn stats(format: &str) -> Result<()> {
    let ctx = CommandContext::load()?;
    let out = Output::new();
    let mut index = ctx.reference_index()?;

    // An index that was never built still reports its configuration
    let stats = if index_exists(&index) {
        index.load()?
    } else {
        index.stats()
    };

    if format == "json" {
        return out.json(&stats);
    }
    out.header("Reference index");
    print_stats(&out, &stats);
    if !stats.built {
        out.info("Run 'rfp-assistant index build' to create it");
    }
    Ok(())
}

pub async fn search(query: &str, k: usize) -> Result<()> {
    let ctx = CommandContext::load()?;
    let out = Output::new();
    let mut index = ctx.reference_index()?;
    index.load()?;

    let hits = index.search(query, k).await?;
    if hits.is_empty() {
        out.info("No matching chunks");
        return Ok(());
    }
    for hit in &hits {
        out.section(&format!(
            "#{} {} (chunk {}, distance {:.4})",
            hit.rank, hit.file_name, hit.chunk_index, hit.distance
        ));
        println!("{}", truncate_with_ellipsis(&hit.chunk_text, 600));
    }
    Ok(())
}

fn index_exists(index: &ReferenceIndex) -> bool {
    crate::retrieval::index::index_file(index.index_path()).exists()
}

fn print_stats(out: &Output, stats: &IndexStats) {
    out.field("Built", stats.built);
    out.field("Vectors", stats.num_vectors);
    out.field("Files", stats.num_files);
    out.field("Dimension", stats.dimension);
    out.field("Path", stats.index_path.display());
}
