//! Retrieval traits: the boundary between the orchestration loop and the
//! document index.
//!
//! [`Retriever`] is all the loop needs. [`DocumentIndex`] adds the
//! management operations the HTTP API exposes (ingest, list, delete).

use crate::error::RetrievalError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A passage returned for a query, ranked by return order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub text: String,

    /// Filename of the document the passage came from
    pub source_id: String,

    /// Backend-specific relevance; higher is better
    #[serde(default)]
    pub score: f32,
}

/// Outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    pub filename: String,
    pub chunks: usize,
    pub collection: String,
}

#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `k` passages from `collection` relevant to `text`.
    async fn query(
        &self,
        text: &str,
        collection: &str,
        k: usize,
    ) -> std::result::Result<Vec<RetrievedPassage>, RetrievalError>;
}

#[async_trait]
pub trait DocumentIndex: Retriever {
    /// Chunk and index `text` under `filename` in `collection`.
    async fn ingest(
        &self,
        collection: &str,
        filename: &str,
        text: &str,
    ) -> std::result::Result<IngestReport, RetrievalError>;

    /// Sorted, de-duplicated source filenames in `collection`.
    async fn list_documents(&self, collection: &str) -> std::result::Result<Vec<String>, RetrievalError>;

    /// Remove every chunk of `filename`. Returns `false` when nothing matched.
    async fn delete_document(&self, collection: &str, filename: &str) -> std::result::Result<bool, RetrievalError>;
}
