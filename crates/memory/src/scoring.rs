//! Relevance scoring for document chunks.
//!
//! - Cosine similarity for embedding vectors
//! - A small TF-IDF keyword scorer used when no embedding model is configured

use std::collections::{HashMap, HashSet};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1]; 0.0 when lengths differ or either vector is
/// empty or all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on", "or",
    "that", "the", "this", "to", "was", "what", "with",
];

/// Lowercased alphanumeric terms, stopwords removed.
pub fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

/// Scores a fixed set of chunk texts against free-text queries.
pub struct KeywordScorer {
    chunk_terms: Vec<HashMap<String, usize>>,
    document_frequency: HashMap<String, usize>,
}

impl KeywordScorer {
    pub fn new<'a>(chunks: impl IntoIterator<Item = &'a str>) -> Self {
        let mut chunk_terms = Vec::new();
        let mut document_frequency: HashMap<String, usize> = HashMap::new();

        for chunk in chunks {
            let mut counts: HashMap<String, usize> = HashMap::new();
            for term in terms(chunk) {
                *counts.entry(term).or_default() += 1;
            }
            for term in counts.keys() {
                *document_frequency.entry(term.clone()).or_default() += 1;
            }
            chunk_terms.push(counts);
        }

        Self {
            chunk_terms,
            document_frequency,
        }
    }

    /// One score per chunk, in construction order. Zero when nothing overlaps.
    pub fn score(&self, query: &str) -> Vec<f32> {
        let query_terms: HashSet<String> = terms(query).into_iter().collect();
        let total = self.chunk_terms.len() as f32;

        self.chunk_terms
            .iter()
            .map(|counts| {
                query_terms
                    .iter()
                    .filter_map(|term| {
                        let tf = *counts.get(term)? as f32;
                        let df = *self.document_frequency.get(term)? as f32;
                        let idf = ((total + 1.0) / (df + 0.5)).ln();
                        Some((1.0 + tf.ln()) * idf)
                    })
                    .sum()
            })
            .collect()
    }
}
