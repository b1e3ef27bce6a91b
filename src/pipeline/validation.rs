//! Pre-generation validation.
//!
//! Cheap structural checks run before any response is drafted, so broken
//! analysis results are reported instead of silently producing poor drafts.

use std::collections::{BTreeSet, HashSet};

use super::query::build_query_for_requirement;
use crate::constants::validation::{MIN_QUERY_CHARS, MIN_SOURCE_CHARS};
use crate::types::{ExtractionResult, RequirementItem, RequirementsResult, char_len};

/// Every problem found, in check order. Empty means ready to generate.
pub fn validate_before_generation(
    extraction: &ExtractionResult,
    requirements: &RequirementsResult,
) -> Vec<String> {
    let mut errors = Vec::new();

    let language = extraction.language.trim();
    if language.is_empty() {
        errors.push("Extraction result missing language".to_string());
    } else if char_len(language) < 2 {
        errors.push(format!("Invalid language code: {}", language));
    }

    let solution = &requirements.solution_requirements;
    if solution.is_empty() {
        errors.push("No solution requirements found".to_string());
        return errors;
    }

    for (idx, req) in solution.iter().enumerate() {
        if req.id.trim().is_empty() {
            errors.push(format!("Solution requirement {} missing ID", idx));
            continue;
        }
        if req.source_text.trim().is_empty() {
            errors.push(format!(
                "Solution requirement {} ({}) missing source_text",
                idx, req.id
            ));
        } else if char_len(req.source_text.trim()) < MIN_SOURCE_CHARS {
            errors.push(format!(
                "Solution requirement {} ({}) source_text too short (likely incomplete)",
                idx, req.id
            ));
        }
        if req.category.trim().is_empty() {
            errors.push(format!(
                "Solution requirement {} ({}) missing category",
                idx, req.id
            ));
        }
    }

    for (idx, req) in requirements.response_structure_requirements.iter().enumerate() {
        if req.id.trim().is_empty() {
            errors.push(format!("Response structure requirement {} missing ID", idx));
        } else if req.source_text.trim().is_empty() {
            errors.push(format!(
                "Response structure requirement {} missing source_text",
                idx
            ));
        }
    }

    let test_query = build_query_for_requirement(
        extraction,
        &solution[0],
        &requirements.response_structure_requirements,
    );
    if char_len(&test_query.query_text) < MIN_QUERY_CHARS {
        errors.push("Build query test failed - generated query text too short".to_string());
    }
    if test_query.solution_requirements_summary.trim().is_empty() {
        errors.push("Build query test failed - missing solution requirements summary".to_string());
    }

    if let Some(dupes) = duplicate_ids(solution) {
        errors.push(format!("Duplicate solution requirement IDs found: {}", dupes));
    }
    if let Some(dupes) = duplicate_ids(&requirements.response_structure_requirements) {
        errors.push(format!(
            "Duplicate response structure requirement IDs found: {}",
            dupes
        ));
    }

    errors
}

fn duplicate_ids(items: &[RequirementItem]) -> Option<String> {
    let mut seen = HashSet::new();
    let dupes: BTreeSet<&str> = items
        .iter()
        .map(|r| r.id.as_str())
        .filter(|id| !id.is_empty() && !seen.insert(*id))
        .collect();
    if dupes.is_empty() {
        None
    } else {
        Some(dupes.into_iter().collect::<Vec<_>>().join(", "))
    }
}
