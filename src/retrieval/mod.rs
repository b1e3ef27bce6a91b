//! Vector Retrieval
//!
//! Semantic search over a folder of reference documents. Documents are split
//! into overlapping character windows, embedded, and held in a flat L2 index
//! persisted as `{base}.index` plus `{base}.meta.json`.

pub mod chunker;
pub mod extract;
pub mod index;
mod system;

pub use chunker::chunk_text;
pub use extract::{PlainTextExtractor, TextExtractor, is_viable_text};
pub use index::{ChunkMeta, FlatL2Index};
pub use system::{IndexStats, ReferenceIndex, RetrievedChunk};
