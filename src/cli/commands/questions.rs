//! Questions Command
//!
//! Generates clarification questions for an RFP and records answers in a
//! session file that `draft --session-file` reads back.
//!
//! Usage:
//!   rfp-assistant questions ask <file> [-s session.json]
//!   rfp-assistant questions answer -s session.json <question_id> <text>
//!   rfp-assistant questions show -s session.json

use std::path::{Path, PathBuf};

use crate::cli::ui::Output;
use crate::cli::util::{CommandContext, read_document};
use crate::types::{ConversationContext, Question, Result};

pub async fn ask(file: &Path, session_file: Option<PathBuf>) -> Result<()> {
    let ctx = CommandContext::load()?;
    let pipeline = ctx.pipeline()?;
    let out = Output::new();

    let text = read_document(file)?;
    let analysis = pipeline.analyze(&text).await?;
    let questions = pipeline.generate_questions(&analysis).await;

    if questions.is_empty() {
        out.success("No clarification needed");
        return Ok(());
    }

    let mut session = ConversationContext::new(None);
    for question in questions {
        session.add_question(question);
    }
    let path = session_file.unwrap_or_else(|| {
        ctx.sessions_dir()
            .join(format!("{}.json", session.session_id))
    });
    session.save(&path)?;

    print_questions(&out, &session.questions);
    println!();
    out.success(&format!(
        "{} question(s) saved to {}",
        session.questions.len(),
        path.display()
    ));
    out.info("Answer with: rfp-assistant questions answer -s <session> <question_id> <text>");
    Ok(())
}

pub fn answer(session_file: &Path, question_id: &str, text: &str) -> Result<()> {
    let out = Output::new();
    let mut session = ConversationContext::load(session_file)?;
    session.submit_answer(question_id, text)?;
    session.save(session_file)?;

    let pending = session.unanswered().len();
    out.success(&format!("Answer recorded ({} question(s) still open)", pending));
    Ok(())
}

pub fn show(session_file: &Path) -> Result<()> {
    let out = Output::new();
    let session = ConversationContext::load(session_file)?;

    out.header(&format!("Session {}", session.session_id));
    print_questions(&out, &session.questions);
    for question in &session.questions {
        if let Some(answer) = session.answer_for(&question.question_id) {
            out.section(&question.question_text);
            println!("{}", answer.answer_text);
        }
    }
    Ok(())
}

fn print_questions(out: &Output, questions: &[Question]) {
    out.section("Clarification questions");
    for q in questions {
        let marker = if q.answered { "✓" } else { " " };
        println!(
            "  {} [{:?}] {} ({})",
            marker,
            q.priority,
            q.question_text,
            q.requirement_id.as_deref().unwrap_or("-")
        );
        println!("      id: {}", q.question_id);
        if !q.context.is_empty() {
            println!("      {}", q.context);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Priority;
    use tempfile::TempDir;

    #[test]
    fn test_answer_updates_session_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        let mut session = ConversationContext::new(None);
        let question = Question::new("Team size?", "", "team", Priority::High);
        let qid = question.question_id.clone();
        session.add_question(question);
        session.save(&path).unwrap();

        answer(&path, &qid, "Eight consultants").unwrap();

        let reloaded = ConversationContext::load(&path).unwrap();
        assert!(reloaded.unanswered().is_empty());
        assert_eq!(
            reloaded.answer_for(&qid).unwrap().answer_text,
            "Eight consultants"
        );
    }

    #[test]
    fn test_answer_unknown_question_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        ConversationContext::new(None).save(&path).unwrap();
        assert!(answer(&path, "missing", "x").is_err());
    }
}
