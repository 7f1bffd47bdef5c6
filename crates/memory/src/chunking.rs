//! Splits document text into overlapping, boundary-aware chunks.

use ragent_core::error::RetrievalError;
use text_splitter::{ChunkConfig, TextSplitter};

/// Character-budgeted splitter that prefers paragraph, sentence and word
/// boundaries over hard cuts.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, RetrievalError> {
        ChunkConfig::new(chunk_size).with_overlap(overlap).map_err(invalid_config)?;
        Ok(Self { chunk_size, overlap })
    }

    /// Trimmed, non-empty chunks in document order.
    pub fn split(&self, text: &str) -> Result<Vec<String>, RetrievalError> {
        let config = ChunkConfig::new(self.chunk_size)
            .with_overlap(self.overlap)
            .map_err(invalid_config)?;
        Ok(TextSplitter::new(config)
            .chunks(text)
            .filter(|chunk| !chunk.trim().is_empty())
            .map(String::from)
            .collect())
    }
}

fn invalid_config(e: text_splitter::ChunkConfigError) -> RetrievalError {
    RetrievalError::Storage(format!("invalid chunking configuration: {e}"))
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = Chunker::default().split("Quarterly revenue grew 12%.").unwrap();
        assert_eq!(chunks, vec!["Quarterly revenue grew 12%."]);
    }

    #[test]
    fn long_text_respects_chunk_size() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(100);
        let chunks = Chunker::new(120, 20).unwrap().split(&text).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 120));
    }

    #[test]
    fn blank_text_has_no_chunks() {
        assert!(Chunker::default().split("  \n\n  ").unwrap().is_empty());
    }

    #[test]
    fn overlap_must_fit_inside_chunk() {
        assert!(Chunker::new(50, 50).is_err());
    }
}
