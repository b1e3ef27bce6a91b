//! Preprocess / Scope Stage
//!
//! Splits tender text into the part a bidder needs and administrative
//! boilerplate, then audits the split.
//!
//! ## Policy
//!
//! - Output that cannot be parsed, or a cleaned text under 100 characters,
//!   keeps the whole original
//! - Removed sections that mention the buyer's rights, remedies, termination,
//!   audit or penalties are restored to the cleaned text
//! - The comparison self-check is advisory: its failure never fails the stage

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{info, warn};

use super::cache::StageCache;
use super::{ask, prompts};
use crate::ai::{JsonRecovery, LlmGateway, ModelRoute};
use crate::constants::preprocess::{
    COMPARISON_HEAD_CHARS, COMPARISON_MAX_TOKENS, COMPARISON_MIN_TOKENS,
    COMPARISON_REMOVED_CHARS, COMPARISON_TAIL_CHARS, MAX_INPUT_CHARS, MAX_LISTED_MISSING,
    MAX_OUTPUT_TOKENS, MIN_CLEANED_CHARS, MIN_OUTPUT_TOKENS, REMOVED_SECTION_MARKER,
    REMOVED_SECTION_SEPARATOR, SKIP_COMPARISON_RATIO,
};
use crate::types::{
    PreprocessResult, Result, char_len, json_bool, json_string, json_string_array, json_text,
    tail_chars, truncate_chars, truncate_with_ellipsis,
};

static PROTECTED_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(rights?|remed(y|ies)|terminat\w*|audit\w*|penalt(y|ies))\b")
        .expect("valid protected-clause pattern")
});
static RIGHTS_RESERVED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)all\s+rights\s+reserved").expect("valid notice pattern"));

const OMITTED_MIDDLE: &str = "\n\n[... middle section omitted ...]\n\n";

pub struct PreprocessStage {
    gateway: Arc<LlmGateway>,
    route: ModelRoute,
    comparison_route: ModelRoute,
    cache: StageCache<String, PreprocessResult>,
}

impl PreprocessStage {
    pub fn new(
        gateway: Arc<LlmGateway>,
        route: ModelRoute,
        comparison_route: ModelRoute,
        cache_capacity: usize,
    ) -> Self {
        Self {
            gateway,
            route,
            comparison_route,
            cache: StageCache::new("preprocess", cache_capacity),
        }
    }

    pub fn cache(&self) -> &StageCache<String, PreprocessResult> {
        &self.cache
    }

    pub async fn run(&self, text: &str) -> Result<PreprocessResult> {
        let key = text.to_string();
        if let Some(cached) = self.cache.get(&key) {
            info!("Preprocess: cache hit (input_chars={})", char_len(text));
            return Ok(cached);
        }

        info!("Preprocess: starting (input_chars={})", char_len(text));
        let input = truncate_chars(text, MAX_INPUT_CHARS);
        let user = prompts::preprocess_user(input);
        let max_tokens = prompts::output_budget(
            prompts::PREPROCESS_SYSTEM,
            &user,
            100,
            MIN_OUTPUT_TOKENS,
            MAX_OUTPUT_TOKENS,
        );

        let raw = ask(
            &self.gateway,
            &self.route,
            prompts::PREPROCESS_SYSTEM,
            user,
            0.0,
            Some(max_tokens),
        )
        .await?;

        let mut result = parse_preprocess(&raw, input);
        let restored = restore_protected(&mut result);
        self.self_check(input, &mut result).await;
        if !restored.is_empty() {
            result.comparison_agreement = false;
            result.comparison_notes = format!(
                "Restored {} protected section(s) to the cleaned text: {}. {}",
                restored.len(),
                restored.join("; "),
                result.comparison_notes
            )
            .trim_end()
            .to_string();
        }

        info!(
            "Preprocess: finished (cleaned_chars={}, removed_chars={}, agreement={})",
            char_len(&result.cleaned_text),
            char_len(&result.removed_text),
            result.comparison_agreement
        );

        self.cache.insert(key, result.clone());
        Ok(result)
    }

    /// Coverage check, plus a comparison call when the split removed more than 5%.
    async fn self_check(&self, original: &str, result: &mut PreprocessResult) {
        let original_chars = char_len(original);
        let cleaned_chars = char_len(&result.cleaned_text);
        let ratio = if original_chars == 0 {
            0.0
        } else {
            cleaned_chars as f64 / original_chars as f64
        };
        let coverage = ratio * 100.0;

        if ratio >= SKIP_COMPARISON_RATIO || result.cleaned_text == original {
            info!("Preprocess: {:.1}% coverage, skipping comparison", coverage);
            result.comparison_agreement = true;
            result.comparison_notes = format!("Using full original text ({:.1}% coverage).", coverage);
            return;
        }

        let user = prompts::comparison_user(
            &sample(original),
            original_chars,
            &sample(&result.cleaned_text),
            cleaned_chars,
            coverage,
            &truncate_with_ellipsis(&result.removed_text, COMPARISON_REMOVED_CHARS),
        );
        let max_tokens = prompts::output_budget(
            prompts::COMPARISON_SYSTEM,
            &user,
            500,
            COMPARISON_MIN_TOKENS,
            COMPARISON_MAX_TOKENS,
        );

        let outcome = ask(
            &self.gateway,
            &self.comparison_route,
            prompts::COMPARISON_SYSTEM,
            user,
            0.0,
            Some(max_tokens),
        )
        .await;

        match outcome {
            Ok(raw) => {
                let (agreement, notes) = comparison_verdict(&raw, coverage);
                info!(
                    "Preprocess: comparison done (agreement={}, coverage={:.1}%)",
                    agreement, coverage
                );
                result.comparison_agreement = agreement;
                result.comparison_notes = notes;
            }
            Err(e) => {
                warn!("Preprocess: comparison failed (non-critical): {}", e);
                result.comparison_agreement = true;
                result.comparison_notes = format!(
                    "Comparison step skipped due to timeout/error (non-critical). Coverage: {:.1}%.",
                    coverage
                );
            }
        }
    }
}

/// Parse the split, keeping the whole input when the output is unusable.
pub fn parse_preprocess(raw: &str, original: &str) -> PreprocessResult {
    let value = match JsonRecovery::recover(raw) {
        Ok(recovered) if !recovered.partial => recovered.into_value(),
        Ok(_) | Err(_) => {
            warn!("Preprocess: unusable model output, keeping original text");
            return PreprocessResult::passthrough(
                original,
                "Preprocess output could not be parsed; using original text.",
            );
        }
    };

    let cleaned = match json_text(&value, "cleaned_text", "\n\n") {
        text if text.trim().is_empty() => json_text(&value, "necessary_text", "\n\n"),
        text => text,
    };
    if char_len(cleaned.trim()) < MIN_CLEANED_CHARS {
        warn!(
            "Preprocess: cleaned text too short ({} chars), keeping original text",
            char_len(&cleaned)
        );
        return PreprocessResult::passthrough(
            original,
            "Cleaned text was too short; using original text.",
        );
    }

    PreprocessResult {
        language: json_string(&value, "language")
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| "en".to_string()),
        cleaned_text: cleaned,
        removed_text: json_text(&value, "removed_text", REMOVED_SECTION_SEPARATOR),
        key_requirements_summary: json_text(&value, "key_requirements_summary", "\n"),
        comparison_agreement: json_bool(&value, "comparison_agreement", true),
        comparison_notes: json_text(&value, "comparison_notes", " "),
        rationale: json_text(&value, "rationale", " "),
    }
}

/// Move protected removed sections back into the cleaned text.
///
/// Returns a short label for each restored section.
fn restore_protected(result: &mut PreprocessResult) -> Vec<String> {
    if result.removed_text.trim().is_empty() {
        return Vec::new();
    }

    let mut kept = Vec::new();
    let mut restored = Vec::new();
    for section in result
        .removed_text
        .split(REMOVED_SECTION_MARKER)
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        let scrubbed = RIGHTS_RESERVED.replace_all(section, "");
        if PROTECTED_CLAUSE.is_match(&scrubbed) {
            restored.push(section);
        } else {
            kept.push(section);
        }
    }

    if restored.is_empty() {
        return Vec::new();
    }

    warn!(
        "Preprocess: restoring {} removed section(s) covering buyer rights or remedies",
        restored.len()
    );
    for section in &restored {
        result.cleaned_text.push_str("\n\n");
        result.cleaned_text.push_str(section);
    }
    let labels = restored
        .iter()
        .map(|s| truncate_with_ellipsis(s.lines().next().unwrap_or_default().trim(), 60))
        .collect();
    result.removed_text = kept.join(REMOVED_SECTION_SEPARATOR);
    labels
}

fn sample(text: &str) -> String {
    if char_len(text) > COMPARISON_HEAD_CHARS {
        format!(
            "{}{}{}",
            truncate_chars(text, COMPARISON_HEAD_CHARS),
            OMITTED_MIDDLE,
            tail_chars(text, COMPARISON_TAIL_CHARS)
        )
    } else {
        text.to_string()
    }
}

/// Agreement flag and notes from the comparison output.
fn comparison_verdict(raw: &str, coverage: f64) -> (bool, String) {
    let value = match JsonRecovery::recover(raw) {
        Ok(recovered) if !recovered.partial && !recovered.value.is_empty() => {
            recovered.into_value()
        }
        _ => {
            warn!("Preprocess: comparison returned invalid data");
            return (
                true,
                format!(
                    "Comparison validation returned invalid data. Coverage: {:.1}%.",
                    coverage
                ),
            );
        }
    };

    let agreement = json_bool(&value, "agreement", true);
    let missing = json_string_array(&value, "missing_items");
    let notes = json_text(&value, "notes", " ");

    let text = if !missing.is_empty() {
        let mut text = format!(
            "Missing items: {}",
            missing
                .iter()
                .take(MAX_LISTED_MISSING)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
        if missing.len() > MAX_LISTED_MISSING {
            text.push_str(&format!(" (and {} more)", missing.len() - MAX_LISTED_MISSING));
        }
        if !notes.is_empty() {
            text.push_str(&format!(". {}", notes));
        }
        text
    } else if !notes.is_empty() {
        notes
    } else {
        format!("Validation passed. Coverage: {:.1}%.", coverage)
    };

    (agreement, text)
}
