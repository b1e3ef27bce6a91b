//! Draft Command
//!
//! Analyzes an RFP, shows the build query for every solution requirement,
//! and drafts responses once the queries are confirmed.
//!
//! Usage:
//!   rfp-assistant draft <file>                       # review queries only
//!   rfp-assistant draft <file> --confirm [-s session.json] [-o out.json]

use std::path::PathBuf;
use tracing::warn;

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, read_document, write_output};
use crate::pipeline::{PipelineOutput, RfpPipeline};
use crate::types::{
    ConversationContext, DocumentRenderer, JsonRenderer, ResponseRecord, Result, RfpError,
    truncate_with_ellipsis,
};

/// Pseudo requirement id for the single structured response
pub const STRUCTURED_RESPONSE_ID: &str = "STRUCTURED";

pub struct DraftOptions {
    pub file: PathBuf,
    /// Treat the shown queries as reviewed and generate
    pub confirm: bool,
    /// Clarification session whose answers feed the drafts
    pub session_file: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub skip_quality: bool,
}

pub async fn run(options: DraftOptions) -> Result<()> {
    let ctx = CommandContext::load()?;
    let pipeline = ctx.pipeline()?;
    let out = Output::new();

    let text = read_document(&options.file)?;
    let analysis = pipeline.analyze(&text).await?;

    let problems = pipeline.validate(&analysis);
    if !problems.is_empty() {
        out.section("Validation");
        for problem in &problems {
            out.error(problem);
        }
        return Err(RfpError::PreconditionFailed(format!(
            "Analysis failed validation with {} problem(s)",
            problems.len()
        )));
    }

    let queries = pipeline.build_queries(&analysis);
    if !options.confirm {
        out.header("Build queries");
        for entry in &queries {
            out.section(&entry.requirement.id);
            println!("{}", entry.query.query_text);
        }
        println!();
        out.info("Review the queries above, then re-run with --confirm to draft responses");
        return Ok(());
    }

    let qa_context = match &options.session_file {
        Some(path) => load_qa_context(path)?,
        None => String::new(),
    };

    let mut records = Vec::new();
    for entry in queries {
        let mut query = entry.query;
        query.confirm();

        let response = match pipeline.respond(&query, &qa_context).await {
            Ok(response) => response,
            Err(e) => {
                out.error(&format!("{}: {}", entry.requirement.id, e));
                continue;
            }
        };

        let quality = if options.skip_quality {
            None
        } else {
            Some(pipeline.assess(&entry.requirement, &response.response_text).await)
        };
        match &quality {
            Some(q) => out.success(&format!(
                "{}: drafted ({} chars, quality {})",
                entry.requirement.id,
                response.response_text.chars().count(),
                q.score
            )),
            None => out.success(&format!(
                "{}: drafted ({} chars)",
                entry.requirement.id,
                response.response_text.chars().count()
            )),
        }

        records.push(ResponseRecord {
            requirement_id: entry.requirement.id.clone(),
            requirement_text: entry.requirement.source_text.clone(),
            response_text: response.response_text,
            quality,
        });
    }

    if let Some(record) = structured_record(&pipeline, &analysis, &qa_context, &out).await {
        records.push(record);
    }

    if records.is_empty() {
        return Err(RfpError::stage(
            "response",
            RfpError::LlmApi("No response could be drafted".to_string()),
        ));
    }

    let renderer = JsonRenderer { pretty: true };
    let bytes = renderer.render(&records, &analysis.requirements, &analysis.extraction)?;
    let path = options.output.unwrap_or_else(|| ctx.responses_path());
    write_output(&path, &bytes)?;
    out.success(&format!(
        "{} response(s) written to {}",
        records.len(),
        path.display()
    ));
    Ok(())
}

/// One response following the RFP's mandated layout, when it has one
async fn structured_record(
    pipeline: &RfpPipeline,
    analysis: &PipelineOutput,
    qa_context: &str,
    out: &Output,
) -> Option<ResponseRecord> {
    let detection = analysis.requirements.structure_detection.as_ref()?;
    if !detection.has_explicit_structure {
        return None;
    }

    match pipeline.respond_structured(analysis, qa_context).await {
        Ok(response) => {
            out.success(&format!(
                "Structured response drafted ({} sections)",
                detection.detected_sections.len()
            ));
            Some(ResponseRecord {
                requirement_id: STRUCTURED_RESPONSE_ID.to_string(),
                requirement_text: truncate_with_ellipsis(&detection.structure_description, 500),
                response_text: response.response_text,
                quality: None,
            })
        }
        Err(e) => {
            warn!("Structured response failed: {}", e);
            out.error(&format!("Structured response: {}", e));
            None
        }
    }
}

fn load_qa_context(path: &std::path::Path) -> Result<String> {
    let session = ConversationContext::load(path)?;
    let pending = session.unanswered().len();
    if pending > 0 {
        warn!(
            "Session {} has {} unanswered question(s)",
            session.session_id, pending
        );
    }
    Ok(session.qa_context())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Priority, Question};
    use tempfile::TempDir;

    #[test]
    fn test_qa_context_from_session_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");

        let mut session = ConversationContext::new(Some("SOL-01".to_string()));
        let question = Question::new("Which region hosts data?", "", "hosting", Priority::High);
        let qid = question.question_id.clone();
        session.add_question(question);
        session.add_question(Question::new("Team size?", "", "team", Priority::Low));
        session.submit_answer(&qid, "Frankfurt").unwrap();
        session.save(&path).unwrap();

        let qa = load_qa_context(&path).unwrap();
        assert_eq!(qa, "Q: Which region hosts data?\nA: Frankfurt");
    }

    #[test]
    fn test_missing_session_file_is_error() {
        assert!(load_qa_context(std::path::Path::new("/nonexistent/session.json")).is_err());
    }
}
