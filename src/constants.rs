//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// LLM gateway constants
pub mod llm {
    /// Per-call timeout (seconds)
    pub const CALL_TIMEOUT_SECS: u64 = 120;

    /// Extra attempts after the first, timeouts only
    pub const MAX_RETRIES: usize = 2;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 1000;

    /// Backoff multiplier
    pub const BACKOFF_FACTOR: f32 = 2.0;

    /// Default sampling temperature
    pub const DEFAULT_TEMPERATURE: f32 = 0.2;

    /// Default OpenAI-compatible endpoint
    pub const DEFAULT_OPENAI_BASE: &str = "https://router.huggingface.co/v1";

    /// Default Azure OpenAI API version
    pub const DEFAULT_AZURE_API_VERSION: &str = "2024-02-15-preview";

    /// Context window assumed when sizing output budgets (tokens)
    pub const CONTEXT_WINDOW_TOKENS: u32 = 32_769;

    /// Headroom kept free of the output budget (tokens)
    pub const OUTPUT_RESERVE_TOKENS: u32 = 1000;
}

/// Extraction stage constants
pub mod extraction {
    /// Markers that make a numeric code credible as a classification code
    pub const CODE_MARKERS: &[&str] = &[
        "cpv",
        "unspsc",
        "naics",
        "nuts",
        "code:",
        "code ",
        "classification",
    ];

    /// Bare digit strings at least this long without a marker are dropped
    pub const MIN_BARE_CODE_DIGITS: usize = 6;

    pub const MIN_OUTPUT_TOKENS: u32 = 2000;
    pub const MAX_OUTPUT_TOKENS: u32 = 6000;
}

/// Preprocess/scope stage constants
pub mod preprocess {
    /// Input is truncated to this many characters before prompting
    pub const MAX_INPUT_CHARS: usize = 50_000;

    /// Cleaned text shorter than this is treated as a failed split
    pub const MIN_CLEANED_CHARS: usize = 100;

    /// Cleaned/original ratio at or above which the comparison call is skipped
    pub const SKIP_COMPARISON_RATIO: f64 = 0.95;

    /// Comparison sample: head of the original
    pub const COMPARISON_HEAD_CHARS: usize = 3000;

    /// Comparison sample: tail of the original
    pub const COMPARISON_TAIL_CHARS: usize = 1000;

    /// Missing items listed in the notes before "(and N more)"
    pub const MAX_LISTED_MISSING: usize = 5;

    /// Separator joining list-valued removed text
    pub const REMOVED_SECTION_SEPARATOR: &str = "\n\n---REMOVED SECTION---\n\n";

    /// Marker the model may leave between removed sections in a single string
    pub const REMOVED_SECTION_MARKER: &str = "---REMOVED SECTION---";

    /// Removed excerpt shown to the comparison call
    pub const COMPARISON_REMOVED_CHARS: usize = 1000;

    pub const MIN_OUTPUT_TOKENS: u32 = 4000;
    pub const MAX_OUTPUT_TOKENS: u32 = 8000;
    pub const COMPARISON_MIN_TOKENS: u32 = 1000;
    pub const COMPARISON_MAX_TOKENS: u32 = 2000;
}

/// Structure detection constants
pub mod structure {
    pub const MAX_TOKENS: u32 = 1000;
    pub const DEFAULT_CONFIDENCE: f64 = 0.5;
}

/// Response agent constants
pub mod response {
    /// Hard ceiling on drafted response length (characters, marker included)
    pub const DEFAULT_MAX_CHARS: usize = 10_000;

    pub const TRUNCATION_MARKER: &str = "\n\n[Response truncated for length]";

    /// A sentence/line boundary must fall in the last 20% of the budget
    pub const BOUNDARY_WINDOW_RATIO: f64 = 0.8;

    /// Chars of each summary used for the retrieval query
    pub const RAG_QUERY_CHARS: usize = 400;

    /// Upper bound on retrieved chunks per response
    pub const MAX_RAG_CHUNKS: usize = 4;

    /// Per-chunk truncation in the evidence block
    pub const RAG_CHUNK_CHARS: usize = 800;

    /// Requirement prefix used to match knowledge entries
    pub const KB_QUERY_CHARS: usize = 300;

    /// Knowledge context ceiling
    pub const KB_CONTEXT_CHARS: usize = 600;

    /// Memory snippets pulled for unclear requirements
    pub const MEMORY_RESULTS: usize = 3;

    pub const DEFAULT_TEMPERATURE: f32 = 0.3;

    pub const MIN_OUTPUT_TOKENS: u32 = 500;
    pub const MAX_OUTPUT_TOKENS: u32 = 2500;

    /// Output budget of the clarity sub-check
    pub const CLARITY_MAX_TOKENS: u32 = 300;
}

/// Structured response agent constants
pub mod structured {
    /// Solution requirements that each get their own retrieval query
    pub const TOP_REQUIREMENTS: usize = 3;

    pub const MAX_CHUNKS: usize = 5;

    /// Total evidence block budget (characters)
    pub const MAX_EVIDENCE_CHARS: usize = 4000;

    /// Results requested per retrieval query
    pub const RESULTS_PER_QUERY: usize = 3;

    /// Requirement prefix used to match knowledge entries
    pub const KB_QUERY_CHARS: usize = 100;

    pub const KB_CONTEXT_CHARS: usize = 1000;

    pub const MIN_OUTPUT_TOKENS: u32 = 1000;
    pub const MAX_OUTPUT_TOKENS: u32 = 8000;
}

/// Vector retrieval constants
pub mod retrieval {
    pub const DEFAULT_CHUNK_SIZE: usize = 1000;
    pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

    /// Embedding dimension of the default model
    pub const DEFAULT_DIMENSION: usize = 3072;

    /// Texts per embedding batch request
    pub const EMBED_BATCH_SIZE: usize = 64;

    /// Extracted text below this many non-whitespace chars is not viable
    pub const MIN_VIABLE_CHARS: usize = 100;

    /// Supported reference document extensions
    pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "docx", "doc", "txt"];

    /// Magic bytes at the head of a persisted index file
    pub const INDEX_MAGIC: &[u8; 4] = b"RFPX";
}

/// Memory store constants
pub mod memory {
    /// Tokens shown before the first match in a snippet
    pub const SNIPPET_BEFORE: usize = 8;

    /// Tokens shown from the first match onward
    pub const SNIPPET_AFTER: usize = 24;

    pub const DEFAULT_MAX_RESULTS: usize = 5;

    /// Characters of cleaned text kept in a preprocess snapshot
    pub const SNAPSHOT_EXCERPT_CHARS: usize = 4000;

    /// `source` value written into record metadata
    pub const RECORD_SOURCE: &str = "rfp-assistant";
}

/// Cache constants
pub mod cache {
    /// Default capacity of each stage's result cache
    pub const DEFAULT_STAGE_CAPACITY: usize = 128;
}

/// Clarification question constants
pub mod questions {
    /// Questions kept per requirement
    pub const MAX_PER_REQUIREMENT: usize = 3;

    pub const MAX_TOKENS: u32 = 1500;
}

/// Quality assessment constants
pub mod quality {
    pub const MAX_TOKENS: u32 = 800;

    /// Score used when the model omits one or the call fails
    pub const NEUTRAL_SCORE: u8 = 50;
}

/// Pre-generation validation constants
pub mod validation {
    /// Requirement source text shorter than this is likely incomplete
    pub const MIN_SOURCE_CHARS: usize = 10;

    /// A single-requirement query shorter than this signals a broken template
    pub const MIN_QUERY_CHARS: usize = 100;
}

/// Knowledge catalog constants
pub mod knowledge {
    /// Entries used when nothing matches
    pub const FALLBACK_ENTRIES: usize = 2;

    /// Case studies kept after scoring
    pub const MAX_CASE_STUDIES: usize = 2;

    /// Differentiators listed in prompt context
    pub const MAX_DIFFERENTIATORS: usize = 5;
}
