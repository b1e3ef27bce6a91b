//! Query Builder
//!
//! Pure text composition, no model call. The resulting [`BuildQuery`] is
//! always unconfirmed; confirmation is an explicit act of the caller.

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::cache::StageCache;
use crate::types::{BuildQuery, ExtractionResult, RequirementItem, RequirementsResult};

pub const NO_SOLUTION_REQUIREMENTS: &str = "No solution requirements found.";
pub const NO_STRUCTURE_REQUIREMENTS: &str = "No response structure requirements found.";

const SOLUTION_HEADING: &str = "SOLUTION REQUIREMENTS (What the buyer wants):";
const SINGLE_SOLUTION_HEADING: &str = "SOLUTION REQUIREMENT (What the buyer wants):";

/// Query covering every requirement as `[id] source_text` lines.
pub fn build_query(extraction: &ExtractionResult, requirements: &RequirementsResult) -> BuildQuery {
    let solution = listing(&requirements.solution_requirements, NO_SOLUTION_REQUIREMENTS);
    let structure = listing(
        &requirements.response_structure_requirements,
        NO_STRUCTURE_REQUIREMENTS,
    );
    compose(SOLUTION_HEADING, solution, structure, extraction)
}

/// Query for a single solution requirement against the shared structure rules.
pub fn build_query_for_requirement(
    extraction: &ExtractionResult,
    item: &RequirementItem,
    structure_items: &[RequirementItem],
) -> BuildQuery {
    let structure = if structure_items.is_empty() {
        NO_STRUCTURE_REQUIREMENTS.to_string()
    } else {
        structure_items
            .iter()
            .map(|r| r.source_text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    };
    compose(
        SINGLE_SOLUTION_HEADING,
        item.source_text.clone(),
        structure,
        extraction,
    )
}

fn listing(items: &[RequirementItem], empty: &str) -> String {
    if items.is_empty() {
        return empty.to_string();
    }
    items
        .iter()
        .map(|r| format!("[{}] {}", r.id, r.source_text))
        .collect::<Vec<_>>()
        .join("\n")
}

fn compose(
    heading: &str,
    solution_summary: String,
    structure_summary: String,
    extraction: &ExtractionResult,
) -> BuildQuery {
    let summary = if extraction.key_requirements_summary.trim().is_empty() {
        "None"
    } else {
        extraction.key_requirements_summary.as_str()
    };
    let rule = "-".repeat(80);
    let banner = "=".repeat(80);
    let language = format!("Language: {}", extraction.language);

    let lines: [&str; 17] = [
        "RFP RESPONSE GENERATION QUERY",
        &banner,
        "",
        heading,
        &rule,
        &solution_summary,
        "",
        "RESPONSE STRUCTURE REQUIREMENTS (How to respond):",
        &rule,
        &structure_summary,
        "",
        "EXTRACTION DATA:",
        &rule,
        &language,
        "",
        "KEY REQUIREMENTS SUMMARY:",
        summary,
    ];
    let query_text = lines.join("\n");

    let mut extraction_data = Map::new();
    extraction_data.insert(
        "language".to_string(),
        Value::String(extraction.language.clone()),
    );
    extraction_data.insert(
        "key_requirements_summary".to_string(),
        Value::String(extraction.key_requirements_summary.clone()),
    );

    BuildQuery {
        query_text,
        solution_requirements_summary: solution_summary,
        response_structure_requirements_summary: structure_summary,
        extraction_data,
        confirmed: false,
    }
}

// =============================================================================
// Cached Builder
// =============================================================================

/// Query builder with result caches keyed by the serialized inputs.
///
/// Cached queries are returned unconfirmed even if a caller confirmed an
/// earlier copy.
pub struct QueryBuilder {
    whole: StageCache<String, BuildQuery>,
    single: StageCache<String, BuildQuery>,
}

impl QueryBuilder {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            whole: StageCache::new("build_query", cache_capacity),
            single: StageCache::new("build_query_single", cache_capacity),
        }
    }

    pub fn build(&self, extraction: &ExtractionResult, requirements: &RequirementsResult) -> BuildQuery {
        let key = serde_json::to_string(&(extraction, requirements)).ok();
        if let Some(key) = &key
            && let Some(cached) = self.whole.get(key)
        {
            debug!("Build query: cache hit");
            return cached;
        }

        let query = build_query(extraction, requirements);
        info!(
            "Build query: composed ({} chars, {} solution requirements)",
            query.query_text.len(),
            requirements.solution_requirements.len()
        );
        if let Some(key) = key {
            self.whole.insert(key, query.clone());
        }
        query
    }

    pub fn build_for_requirement(
        &self,
        extraction: &ExtractionResult,
        item: &RequirementItem,
        structure_items: &[RequirementItem],
    ) -> BuildQuery {
        let key = serde_json::to_string(&(extraction, item, structure_items)).ok();
        if let Some(key) = &key
            && let Some(cached) = self.single.get(key)
        {
            debug!("Build query ({}): cache hit", item.id);
            return cached;
        }

        let query = build_query_for_requirement(extraction, item, structure_items);
        debug!("Build query ({}): composed ({} chars)", item.id, query.query_text.len());
        if let Some(key) = key {
            self.single.insert(key, query.clone());
        }
        query
    }
}
