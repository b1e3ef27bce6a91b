//! Analyze Command
//!
//! Runs extraction, preprocessing, requirements and structure detection on
//! one RFP document and reports the result.
//!
//! Usage:
//!   rfp-assistant analyze <file> [-f text] [-o out.json]

use std::path::{Path, PathBuf};

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, read_document, write_output};
use crate::pipeline::PipelineOutput;
use crate::types::{Result, truncate_with_ellipsis};

pub async fn run(file: &Path, format: &str, output_path: Option<PathBuf>) -> Result<()> {
    let ctx = CommandContext::load()?;
    let pipeline = ctx.pipeline()?;
    let text = read_document(file)?;
    let out = Output::new();

    let analysis = pipeline.analyze(&text).await?;
    let problems = pipeline.validate(&analysis);

    if let Some(path) = &output_path {
        write_output(path, &serde_json::to_vec_pretty(&analysis)?)?;
        out.success(&format!("Analysis written to {}", path.display()));
    }

    if format == "json" {
        if output_path.is_none() {
            out.json(&analysis)?;
        }
        return Ok(());
    }

    print_summary(&out, &analysis);
    if problems.is_empty() {
        out.success("Ready for response drafting");
    } else {
        out.section("Validation");
        for problem in &problems {
            out.warning(problem);
        }
    }
    Ok(())
}

fn print_summary(out: &Output, analysis: &PipelineOutput) {
    let extraction = &analysis.extraction;
    let requirements = &analysis.requirements;

    out.header("RFP Analysis");
    out.field("Language", &extraction.language);
    if !extraction.cpv_codes.is_empty() {
        out.field("CPV codes", extraction.cpv_codes.join(", "));
    }
    out.field(
        "Preprocess",
        if analysis.preprocess.comparison_agreement {
            "models agree"
        } else {
            "models disagree"
        },
    );

    out.section(&format!(
        "Solution requirements ({})",
        requirements.solution_requirements.len()
    ));
    for item in &requirements.solution_requirements {
        println!(
            "  [{}] {:<8} {}",
            item.req_type.tag(),
            item.id,
            truncate_with_ellipsis(&item.normalized_text, 100)
        );
    }

    if !requirements.response_structure_requirements.is_empty() {
        out.section(&format!(
            "Response structure requirements ({})",
            requirements.response_structure_requirements.len()
        ));
        for item in &requirements.response_structure_requirements {
            println!(
                "  [{}] {:<8} {}",
                item.req_type.tag(),
                item.id,
                truncate_with_ellipsis(&item.normalized_text, 100)
            );
        }
    }

    if let Some(detection) = &requirements.structure_detection {
        out.section("Structure");
        out.field("Type", detection.structure_type.as_str());
        out.field("Confidence", format!("{:.2}", detection.confidence));
        if !detection.detected_sections.is_empty() {
            out.field("Sections", detection.detected_sections.join(" | "));
        }
    }
}
