//! Stage Prompts
//!
//! System instructions and user payload builders for every LLM-backed stage.
//!
//! ## Conventions
//!
//! 1. **JSON contracts**: each structured stage names its output fields explicitly
//! 2. **Verbatim input**: tender text is fenced, never paraphrased into the prompt
//! 3. **Vendor name**: drafting prompts take the company name from the catalog

use crate::types::{RequirementItem, truncate_chars};

// =============================================================================
// Extraction
// =============================================================================

pub const EXTRACTION_SYSTEM: &str = r#"You read tender documents and record the facts they state.

Return one JSON object with:
- language: ISO 639-1 code of the document language (e.g. "en", "de")
- cpv_codes: array of procurement classification codes exactly as written, with their label (e.g. "CPV 72000000-5")
- other_codes: array of other reference codes written in the document, formatted "TYPE: VALUE"
- key_requirements_summary: 10 to 15 short bullet points covering what the buyer wants

Only record codes that are printed in the document. Never guess a code, a date or a reference number. Do not add metadata fields."#;

pub fn extraction_user(text: &str) -> String {
    format!(
        "RFP document:\n\n```rfp_text\n{}\n```\n\n\
         Extract ONLY what is explicitly written in the document above. \
         Leave cpv_codes and other_codes empty when none are printed.",
        text
    )
}

// =============================================================================
// Preprocess / Scope
// =============================================================================

pub const PREPROCESS_SYSTEM: &str = r#"You prepare tender text for requirement analysis by separating substance from administration.

Keep: requirements, scope, objectives, deliverables, evaluation criteria, timelines that bind the bidder, and any instructions about how the response must be structured.
Remove: contact details, e-mail addresses, postal addresses, phone numbers, signatures, headers and footers, document metadata, and generic legal boilerplate.

Never remove clauses that describe the rights or remedies of the buyer or contracting authority. Termination rights, penalties, audit rights and inspection rights are commercial terms and always stay in the kept text.

Return one JSON object with:
- language: ISO 639-1 code of the text
- cleaned_text: the full text with the removed parts taken out (typically 80 to 95 percent of the input)
- removed_text: array of the removed sections, each copied verbatim
- key_requirements_summary: short bullet list of the main requirements
- rationale: one or two sentences on what was removed and why"#;

pub fn preprocess_user(text: &str) -> String {
    format!("FULL RAW RFP TEXT:\n{}\n", text)
}

pub const COMPARISON_SYSTEM: &str = r#"You audit a cleaned copy of a tender document against its original.

Confirm that only administrative material was removed and that no requirement, scope statement, objective, evaluation criterion, technical specification or response-structure instruction went missing. Check the removed text for substantive content that should have stayed.

Return one JSON object with:
- agreement: true when only administrative material was removed
- missing_items: array of short descriptions of substantive content missing from the cleaned text (empty when nothing is missing)
- notes: what you checked and what you found"#;

pub fn comparison_user(
    original_sample: &str,
    original_chars: usize,
    cleaned_sample: &str,
    cleaned_chars: usize,
    coverage_pct: f64,
    removed_excerpt: &str,
) -> String {
    format!(
        "ORIGINAL RFP TEXT (sample, {} chars in total):\n{}\n\n\
         CLEANED TEXT (sample, {} chars in total, {:.1}% of original):\n{}\n\n\
         REMOVED TEXT (excerpt):\n{}\n\n\
         Check whether substantive content is missing from the cleaned text and whether the \
         removed text holds anything other than administrative material.",
        original_chars,
        original_sample,
        cleaned_chars,
        coverage_pct,
        cleaned_sample,
        if removed_excerpt.is_empty() {
            "(none)"
        } else {
            removed_excerpt
        }
    )
}

// =============================================================================
// Requirements
// =============================================================================

pub const REQUIREMENTS_SYSTEM: &str = r#"You split tender text into requirements.

Two groups:
1. solution_requirements: what the buyer wants delivered (functional, technical, security, service, commercial)
2. response_structure_requirements: how the bid must be written and submitted (sections, format, page limits, order)

Rules:
- Capture whole requirement statements. A requirement may span several sentences when they describe one need.
- Split only where the document itself separates needs: numbered items, bullets, paragraphs, headings.
- Keep every requirement; group related sentences instead of dropping them.
- source_text is copied verbatim from the document. Restate it in normalized_text.

Each item has: id, type ("mandatory", "optional" or "unspecified"), source_text, normalized_text, category.
Return one JSON object with: solution_requirements, response_structure_requirements, notes."#;

pub fn requirements_user(text: &str, structured_info: &str) -> String {
    format!(
        "=== SCOPED RFP TEXT ===\n{}\n\n\
         === STRUCTURED INFO (JSON) ===\n{}\n\n\
         Split the scoped text into solution and response-structure requirements.",
        text, structured_info
    )
}

// =============================================================================
// Structure Detection
// =============================================================================

pub const STRUCTURE_SYSTEM: &str = r#"You decide whether a tender mandates an explicit response structure.

Explicit structure: the tender names the sections or chapters a response must contain, supplies a template, or fixes the order of named sections.
Not explicit: formatting rules (fonts, margins, page numbers), tone, file format, delivery method, or general advice to be well organised.

Return one JSON object with:
- has_explicit_structure: boolean
- structure_type: "explicit", "implicit" or "none"
- detected_sections: ordered array of required section names (empty unless explicit)
- structure_description: one paragraph describing the required structure
- confidence: number between 0.0 and 1.0"#;

pub fn structure_user(items: &[RequirementItem]) -> String {
    let listing = items
        .iter()
        .map(|item| format!("[{}] {}", item.req_type.tag(), item.source_text))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "RESPONSE STRUCTURE REQUIREMENTS:\n\n{}\n\n\
         Does the tender mandate an explicit response structure? Answer in the requested JSON format.",
        listing
    )
}

// =============================================================================
// Clarity Check
// =============================================================================

pub const CLARITY_SYSTEM: &str = r#"You judge whether a single tender requirement can be answered from its own text.

"clear": the requirement states what is needed with enough detail to draft a response.
"unclear": it depends on context defined elsewhere, uses undefined references, or is too vague to answer.

Return one JSON object with:
- clarity: "clear" or "unclear"
- questions: array of short clarifying questions (empty when clear)"#;

pub fn clarity_user(requirement: &str) -> String {
    format!("REQUIREMENT:\n{}\n\nIs this requirement clear on its own?", requirement)
}

// =============================================================================
// Response Drafting
// =============================================================================

const QA_RULES: &str = "\
- The answers above were written by the bidder and are authoritative.
- Use them in full. Do not shorten lists of projects, certifications or team members.
- Work the details into the narrative rather than repeating the questions.";

pub fn response_system(company: &str) -> String {
    format!(
        "You write tender responses on behalf of {company}.\n\n\
         Rules:\n\
         - Answer only the requirement you are given. No executive summary, overview or introduction.\n\
         - Open by showing you understand the requirement, then answer it in depth.\n\
         - Use {company} capabilities, case studies and accelerators where they fit.\n\
         - Bidder-supplied answers are authoritative: use them in full, never condensed.\n\
         - Never invent numbers, metrics, team sizes or client names. When the requirement asks for \
         something you were not given, say that it will be provided.\n\
         - Reference examples are for facts only. Do not copy their structure.\n\
         - Plain text only; formatting is applied later.\n\
         - Aim for 800 to 1500 words."
    )
}

/// Inputs for the per-requirement drafting prompt
#[derive(Debug, Default)]
pub struct ResponsePrompt<'a> {
    pub requirement: &'a str,
    pub structure_summary: &'a str,
    pub company: &'a str,
    pub knowledge: &'a str,
    pub examples: &'a str,
    pub memory: &'a str,
    pub qa_context: &'a str,
}

impl ResponsePrompt<'_> {
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = vec![
            "REQUIREMENT TO ADDRESS:".to_string(),
            self.requirement.to_string(),
            String::new(),
        ];

        if !self.structure_summary.is_empty()
            && self.structure_summary != super::query::NO_STRUCTURE_REQUIREMENTS
        {
            parts.push("RESPONSE STRUCTURE GUIDANCE (document-level formatting only):".to_string());
            parts.push(self.structure_summary.to_string());
            parts.push(
                "These apply to the whole document. Do not add document sections to this answer."
                    .to_string(),
            );
            parts.push(String::new());
        }

        if !self.knowledge.is_empty() {
            parts.push(format!(
                "{} CONTEXT: {}",
                self.company.to_uppercase(),
                self.knowledge
            ));
            parts.push(String::new());
        }

        if !self.examples.is_empty() {
            parts.push(format!("PRIOR RFP EXAMPLES (for content only): {}", self.examples));
            parts.push(String::new());
        }

        if !self.memory.is_empty() {
            parts.push("RELATED CONTEXT FROM EARLIER ANALYSES:".to_string());
            parts.push(self.memory.to_string());
            parts.push(String::new());
        }

        if !self.qa_context.is_empty() {
            push_qa_block(&mut parts, self.qa_context);
        }

        parts.extend(
            [
                "TASK: Write a complete, detailed response to the requirement above.",
                "",
                "The response should:",
                "1. Acknowledge briefly what the requirement asks for",
                "2. Address every aspect of the requirement",
                "3. Use the bidder's answers in full where they are given",
                "4. Give concrete detail: capabilities, methods, examples",
                "5. Avoid executive summaries, generic introductions and conclusions",
                "",
                "Write the response now:",
            ]
            .map(String::from),
        );

        parts.join("\n")
    }
}

fn push_qa_block(parts: &mut Vec<String>, qa_context: &str) {
    let rule = "=".repeat(80);
    parts.push(rule.clone());
    parts.push("BIDDER-PROVIDED INFORMATION (use in full):".to_string());
    parts.push(rule);
    parts.push(qa_context.to_string());
    parts.push(String::new());
    parts.push(QA_RULES.to_string());
    parts.push(String::new());
}

// =============================================================================
// Structured Response
// =============================================================================

pub fn structured_system(company: &str) -> String {
    format!(
        "You write complete tender responses on behalf of {company}, following the structure \
         the tender mandates.\n\n\
         Rules:\n\
         - Include every required section, in the required order, with the required names.\n\
         - Map each solution requirement to the section where it belongs and answer it in depth.\n\
         - Use {company} capabilities, case studies and accelerators with concrete detail.\n\
         - Bidder-supplied answers are authoritative: use them in full, never condensed.\n\
         - Never invent numbers, metrics, team sizes or client names. When something is missing, \
         say that it will be provided.\n\
         - Each major section should be as thorough as a standalone answer would be."
    )
}

/// Inputs for the whole-document drafting prompt
#[derive(Debug, Default)]
pub struct StructuredPrompt<'a> {
    pub structure_description: &'a str,
    pub sections: &'a [String],
    pub requirements: &'a [RequirementItem],
    pub language: &'a str,
    pub company: &'a str,
    pub knowledge: &'a str,
    pub evidence: &'a str,
    pub qa_context: &'a str,
}

impl StructuredPrompt<'_> {
    pub fn render(&self) -> String {
        let mut parts: Vec<String> = vec![
            "RFP RESPONSE STRUCTURE REQUIREMENTS:".to_string(),
            self.structure_description.to_string(),
            String::new(),
            "REQUIRED SECTIONS (in order):".to_string(),
        ];
        parts.extend(
            self.sections
                .iter()
                .enumerate()
                .map(|(i, section)| format!("{}. {}", i + 1, section)),
        );
        parts.push(String::new());

        parts.push("SOLUTION REQUIREMENTS TO ADDRESS:".to_string());
        parts.extend(
            self.requirements
                .iter()
                .map(|req| format!("- [{}] {}", req.req_type.tag(), req.normalized_text)),
        );
        parts.push(String::new());

        if !self.language.is_empty() && self.language != "en" {
            parts.push(format!("TENDER LANGUAGE: {}", self.language));
            parts.push(String::new());
        }

        if !self.knowledge.is_empty() {
            parts.push(format!("{} CONTEXT:", self.company.to_uppercase()));
            parts.push(self.knowledge.to_string());
            parts.push(String::new());
        }

        if !self.evidence.is_empty() {
            parts.push(self.evidence.to_string());
            parts.push(String::new());
        }

        if !self.qa_context.is_empty() {
            push_qa_block(&mut parts, self.qa_context);
        }

        parts.extend(
            [
                "TASK: Write the complete response document following the structure above.",
                "",
                "The document must:",
                "1. Contain every required section in the stated order",
                "2. Answer the relevant solution requirements inside each section",
                "3. Use the bidder's answers in full where they are given",
                "4. Give specific detail, metrics and examples throughout",
                "",
                "Write the document now:",
            ]
            .map(String::from),
        );

        parts.join("\n")
    }
}

// =============================================================================
// Clarification Questions
// =============================================================================

pub const QUESTION_SYSTEM: &str = r#"You help a bidder answer a tender. For one requirement, you decide what the bidder must tell you about their own offer before a credible response can be written.

The tender is the source of truth. Never ask the bidder to explain what the tender means. Ask what the bidder can offer, commit to or evidence: capacity, service levels, team and resourcing, certifications, comparable projects, timelines, pricing.

When a requirement explicitly asks for information (a team structure, resourcing numbers, certifications, previous projects, timelines), ask for it. That information cannot be invented.

Do not ask about anything listed as known company information.

Be selective. Ask only when the answer would materially change the response. Zero questions is a good answer. One or two is usually enough.

Each question has:
- question_text: the question, addressed to the bidder
- context: why the answer matters for this requirement
- category: technical, business, implementation, commercial, timeline, resources, ...
- priority: "high", "medium" or "low"

Return a JSON array of questions, or [] when none are needed."#;

pub fn question_user(
    requirement: &RequirementItem,
    other_requirements: &str,
    structure_summary: &str,
    known_info: &str,
) -> String {
    format!(
        "REQUIREMENT TO ANALYZE:\n\
         ID: {id}\n\
         Type: {ty}\n\
         Category: {category}\n\
         Requirement Text: {normalized}\n\
         Original Source: {source}\n\n\
         OTHER REQUIREMENTS (for reference):\n{others}\n\n\
         RESPONSE STRUCTURE REQUIREMENTS:\n{structure}\n\n\
         {known}\n\n\
         What must the bidder tell you about their offer to answer requirement {id} completely? \
         Return a JSON array of questions, or [] if nothing is needed.",
        id = requirement.id,
        ty = requirement.req_type,
        category = requirement.category,
        normalized = requirement.normalized_text,
        source = requirement.source_text,
        others = truncate_chars(other_requirements, 1000),
        structure = truncate_chars(structure_summary, 500),
        known = known_info,
    )
}

// =============================================================================
// Quality Assessment
// =============================================================================

pub const QUALITY_SYSTEM: &str = r#"You review tender responses. For a requirement and its drafted response, judge how well the response answers the requirement. Be strict but fair."#;

pub fn quality_user(requirement: &str, response: &str) -> String {
    format!(
        "REQUIREMENT:\n{}\n\nRESPONSE:\n{}\n\n\
         Return one JSON object with:\n\
         - score: 0-100, how well the response answers the requirement\n\
         - completeness: \"complete\", \"partial\" or \"incomplete\"\n\
         - relevance: \"high\", \"medium\" or \"low\"\n\
         - issues: array of specific problems or gaps\n\
         - suggestions: array of improvements",
        requirement, response
    )
}

/// Output-token budget derived from prompt size.
///
/// Input tokens are estimated at four characters per token plus `overhead`;
/// the result is `ceiling` capped by the context window, never below `floor`.
pub fn output_budget(system: &str, user: &str, overhead: usize, floor: u32, ceiling: u32) -> u32 {
    use crate::constants::llm::{CONTEXT_WINDOW_TOKENS, OUTPUT_RESERVE_TOKENS};

    let estimated = (system.len() / 4 + user.len() / 4 + overhead) as u32;
    let available = CONTEXT_WINDOW_TOKENS
        .saturating_sub(estimated)
        .saturating_sub(OUTPUT_RESERVE_TOKENS);
    ceiling.min(available).max(floor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequirementType;

    #[test]
    fn test_extraction_user_fences_text() {
        let prompt = extraction_user("Tender body");
        assert!(prompt.starts_with("RFP document:\n\n```rfp_text\nTender body\n```"));
    }

    #[test]
    fn test_structure_user_lists_tags() {
        let items = vec![
            RequirementItem::new("RESP-01", RequirementType::Mandatory, "Use sections A, B", "", "format"),
            RequirementItem::new("RESP-02", RequirementType::Optional, "Max 20 pages", "", "format"),
        ];
        let prompt = structure_user(&items);
        assert!(prompt.contains("[MANDATORY] Use sections A, B\n\n[OPTIONAL] Max 20 pages"));
    }

    #[test]
    fn test_response_prompt_skips_empty_blocks() {
        let prompt = ResponsePrompt {
            requirement: "Provide 24/7 support.",
            structure_summary: crate::pipeline::query::NO_STRUCTURE_REQUIREMENTS,
            company: "Northwind Digital",
            ..Default::default()
        }
        .render();
        assert!(prompt.starts_with("REQUIREMENT TO ADDRESS:\nProvide 24/7 support."));
        assert!(!prompt.contains("STRUCTURE GUIDANCE"));
        assert!(!prompt.contains("BIDDER-PROVIDED"));
        assert!(!prompt.contains("PRIOR RFP EXAMPLES"));
    }

    #[test]
    fn test_structured_prompt_numbers_sections() {
        let sections = vec!["Executive Summary".to_string(), "Pricing".to_string()];
        let prompt = StructuredPrompt {
            structure_description: "Two sections",
            sections: &sections,
            company: "Northwind Digital",
            qa_context: "Q: team?\nA: six people",
            ..Default::default()
        }
        .render();
        assert!(prompt.contains("1. Executive Summary\n2. Pricing"));
        assert!(prompt.contains("Q: team?\nA: six people"));
    }

    #[test]
    fn test_output_budget_bounds() {
        // tiny prompt: ceiling applies
        assert_eq!(output_budget("", "", 100, 1000, 2000), 2000);
        // prompt larger than the window: floor applies
        let huge = "x".repeat(200_000);
        assert_eq!(output_budget("", &huge, 100, 1000, 2000), 1000);
    }
}
