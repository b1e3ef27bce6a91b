//! Document text extraction boundary.
//!
//! PDF and Office formats are handled by an external extractor plugged in
//! through [`TextExtractor`]; the crate itself only reads plain text.

use std::fs;
use std::path::Path;

use crate::constants::retrieval::MIN_VIABLE_CHARS;
use crate::types::{Result, RfpError};

pub trait TextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<String>;

    fn supports(&self, path: &Path) -> bool;
}

/// Reads `.txt` and `.md` files as UTF-8
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, path: &Path) -> Result<String> {
        if !self.supports(path) {
            return Err(RfpError::Unsupported(format!(
                "No text extractor for {}",
                path.display()
            )));
        }
        Ok(fs::read_to_string(path)?)
    }

    fn supports(&self, path: &Path) -> bool {
        matches!(
            extension(path).as_deref(),
            Some("txt") | Some("md") | Some("markdown")
        )
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// False when the text is too short to be a real extraction, so the caller
/// can route the document to a fallback (e.g. OCR).
pub fn is_viable_text(text: &str) -> bool {
    text.chars().filter(|c| !c.is_whitespace()).count() >= MIN_VIABLE_CHARS
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reads_txt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("Notes.TXT");
        fs::write(&path, "hello").unwrap();
        assert_eq!(PlainTextExtractor.extract(&path).unwrap(), "hello");
    }

    #[test]
    fn test_pdf_is_unsupported() {
        let path = Path::new("tender.pdf");
        assert!(!PlainTextExtractor.supports(path));
        assert!(matches!(
            PlainTextExtractor.extract(path),
            Err(RfpError::Unsupported(_))
        ));
    }

    #[test]
    fn test_viability_ignores_whitespace() {
        assert!(!is_viable_text(&" a".repeat(99)));
        assert!(is_viable_text(&"a ".repeat(100)));
    }
}
