//! Long-Term Memory
//!
//! Append-only snapshots of earlier pipeline outputs, searchable by free text.
//! Token mode scores raw term-frequency density; embedding mode rescores the
//! token candidates by cosine similarity and falls back to the token ranking
//! when no embedding is available.

mod record;
mod store;

pub use record::{MemoryMessage, MemoryPayload, MemoryRecord};
pub use store::{MemoryHit, MemoryStore};
