//! Overlapping fixed-size character windows.

use tracing::{debug, warn};

/// Split `text` into windows of `size` characters, each starting
/// `size - overlap` after the previous one.
///
/// Text no longer than `size` is a single chunk. An overlap at or above
/// `size` degrades to a step of one character.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let size = size.max(1);
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();

    if len <= size {
        return vec![text.to_string()];
    }

    let step = if overlap >= size {
        warn!(
            "Chunk overlap {} is not below chunk size {}, stepping by 1",
            overlap, size
        );
        1
    } else {
        size - overlap
    };

    let mut chunks = Vec::with_capacity(len / step + 1);
    let mut start = 0;
    loop {
        let end = (start + size).min(len);
        chunks.push(chars[start..end].iter().collect());
        if end >= len {
            break;
        }
        start += step;
    }

    debug!(
        "Chunked {} chars into {} chunk(s) (size={}, overlap={})",
        len,
        chunks.len(),
        size,
        overlap
    );
    chunks
}
