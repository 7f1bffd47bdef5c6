//! In-memory, per-collection document index.
//!
//! Documents are split by [`Chunker`] and kept grouped by collection. Queries
//! rank chunks with the keyword scorer, or with cosine similarity when an
//! embedding model is attached. A non-empty collection always yields its top
//! `k` chunks, even when nothing scores above zero.
//!
//! With [`InMemoryDocumentIndex::with_persistence`] every collection is
//! mirrored to a JSON-lines file, one chunk per line, rewritten on each
//! ingest or delete and loaded again at startup.

use crate::chunking::Chunker;
use crate::extract::{extension_of, is_supported_file};
use crate::scoring::{KeywordScorer, cosine_similarity};
use async_trait::async_trait;
use ragent_config::RetrievalConfig;
use ragent_core::error::RetrievalError;
use ragent_core::provider::{EmbeddingRequest, Provider};
use ragent_core::retrieval::{DocumentIndex, IngestReport, RetrievedPassage, Retriever};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocumentChunk {
    source: String,
    text: String,
    content_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedding: Option<Vec<f32>>,
}

struct Embedder {
    provider: Arc<dyn Provider>,
    model: String,
}

impl Embedder {
    async fn embed(&self, inputs: Vec<String>) -> Result<Vec<Vec<f32>>, RetrievalError> {
        let expected = inputs.len();
        let response = self
            .provider
            .embed(EmbeddingRequest {
                model: self.model.clone(),
                inputs,
            })
            .await
            .map_err(|e| RetrievalError::EmbeddingFailed(e.to_string()))?;

        if response.embeddings.len() != expected {
            return Err(RetrievalError::EmbeddingFailed(format!(
                "expected {expected} embeddings, got {}",
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }
}

pub struct InMemoryDocumentIndex {
    collections: RwLock<HashMap<String, Vec<DocumentChunk>>>,
    chunker: Chunker,
    embedder: Option<Embedder>,
    store_dir: Option<PathBuf>,
}

impl InMemoryDocumentIndex {
    pub fn new(chunker: Chunker) -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            chunker,
            embedder: None,
            store_dir: None,
        }
    }

    /// Mirror collections to `<dir>/<hex(collection)>.jsonl`, loading any
    /// that already exist. Corrupt lines are skipped with a warning.
    pub fn with_persistence(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let loaded = load_collections(&dir);
        let chunks: usize = loaded.values().map(Vec::len).sum();
        info!(dir = %dir.display(), collections = loaded.len(), chunks, "Document index loaded");
        self.collections = RwLock::new(loaded);
        self.store_dir = Some(dir);
        self
    }

    pub fn from_config(config: &RetrievalConfig) -> Result<Self, RetrievalError> {
        Ok(Self::new(Chunker::new(config.chunk_size, config.chunk_overlap)?))
    }

    /// Score by embedding similarity, computing vectors with `provider`.
    pub fn with_embedder(mut self, provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        self.embedder = Some(Embedder {
            provider,
            model: model.into(),
        });
        self
    }

    /// Number of chunks currently held for `collection`.
    pub async fn chunk_count(&self, collection: &str) -> usize {
        self.collections.read().await.get(collection).map_or(0, Vec::len)
    }

    pub async fn collections(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().await.keys().cloned().collect();
        names.sort();
        names
    }
}

fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

const COLLECTION_FILE_EXT: &str = "jsonl";

/// Collection names come from request paths, so file names are hex-encoded.
fn collection_file(dir: &Path, collection: &str) -> PathBuf {
    dir.join(format!("{}.{COLLECTION_FILE_EXT}", hex::encode(collection)))
}

fn load_collections(dir: &Path) -> HashMap<String, Vec<DocumentChunk>> {
    let mut collections = HashMap::new();
    let Ok(entries) = std::fs::read_dir(dir) else {
        return collections;
    };

    for path in entries.filter_map(|e| e.ok()).map(|e| e.path()) {
        if path.extension().and_then(|e| e.to_str()) != Some(COLLECTION_FILE_EXT) {
            continue;
        }
        let Some(name) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| hex::decode(s).ok())
            .and_then(|b| String::from_utf8(b).ok())
        else {
            warn!(file = %path.display(), "Skipping index file with unrecognised name");
            continue;
        };
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping unreadable index file");
                continue;
            }
        };

        let chunks: Vec<DocumentChunk> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(chunk) => Some(chunk),
                Err(e) => {
                    warn!(collection = %name, error = %e, "Skipping corrupted index entry");
                    None
                }
            })
            .collect();
        if !chunks.is_empty() {
            collections.insert(name, chunks);
        }
    }
    collections
}

/// Rewrite one collection's file, or remove it once the collection is empty.
async fn flush_collection(dir: &Path, collection: &str, chunks: &[DocumentChunk]) -> Result<(), RetrievalError> {
    let path = collection_file(dir, collection);
    if chunks.is_empty() {
        return match tokio::fs::remove_file(&path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
                Err(RetrievalError::Storage(format!("failed to remove {}: {e}", path.display())))
            }
            _ => Ok(()),
        };
    }

    let mut content = String::new();
    for chunk in chunks {
        let line = serde_json::to_string(chunk)
            .map_err(|e| RetrievalError::Storage(format!("failed to serialize chunk: {e}")))?;
        content.push_str(&line);
        content.push('\n');
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| RetrievalError::Storage(format!("failed to create index directory: {e}")))?;
    let staging = path.with_extension("tmp");
    tokio::fs::write(&staging, content)
        .await
        .map_err(|e| RetrievalError::Storage(format!("failed to write {}: {e}", staging.display())))?;
    tokio::fs::rename(&staging, &path)
        .await
        .map_err(|e| RetrievalError::Storage(format!("failed to replace {}: {e}", path.display())))?;
    Ok(())
}

#[async_trait]
impl Retriever for InMemoryDocumentIndex {
    async fn query(&self, text: &str, collection: &str, k: usize) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        // Embed before taking the lock.
        let query_embedding = match &self.embedder {
            Some(embedder) => embedder.embed(vec![text.to_string()]).await?.pop(),
            None => None,
        };

        let collections = self.collections.read().await;
        let Some(chunks) = collections.get(collection).filter(|c| !c.is_empty()) else {
            debug!(collection, "Query against empty collection");
            return Ok(Vec::new());
        };

        let scores: Vec<f32> = match &query_embedding {
            Some(query) => chunks
                .iter()
                .map(|c| c.embedding.as_deref().map_or(0.0, |e| cosine_similarity(e, query)))
                .collect(),
            None => KeywordScorer::new(chunks.iter().map(|c| c.text.as_str())).score(text),
        };

        let mut ranked: Vec<(usize, f32)> = scores.into_iter().enumerate().collect();
        // Stable sort keeps document order among ties.
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(k);

        Ok(ranked
            .into_iter()
            .map(|(i, score)| RetrievedPassage {
                text: chunks[i].text.clone(),
                source_id: chunks[i].source.clone(),
                score,
            })
            .collect())
    }
}

#[async_trait]
impl DocumentIndex for InMemoryDocumentIndex {
    async fn ingest(&self, collection: &str, filename: &str, text: &str) -> Result<IngestReport, RetrievalError> {
        if !is_supported_file(filename) {
            return Err(RetrievalError::UnsupportedFormat(extension_of(filename)));
        }

        let hash = content_hash(text);
        {
            let collections = self.collections.read().await;
            let existing: Vec<&DocumentChunk> = collections
                .get(collection)
                .map(|chunks| chunks.iter().filter(|c| c.source == filename).collect())
                .unwrap_or_default();
            if !existing.is_empty() && existing.iter().all(|c| c.content_hash == hash) {
                debug!(collection, filename, "Document unchanged, skipping re-index");
                return Ok(IngestReport {
                    filename: filename.to_string(),
                    chunks: existing.len(),
                    collection: collection.to_string(),
                });
            }
        }

        let pieces = self.chunker.split(text)?;
        if pieces.is_empty() {
            return Err(RetrievalError::InvalidDocument(format!("'{filename}' contains no text")));
        }

        let embeddings: Vec<Option<Vec<f32>>> = match &self.embedder {
            Some(embedder) => embedder.embed(pieces.clone()).await?.into_iter().map(Some).collect(),
            None => vec![None; pieces.len()],
        };

        let new_chunks: Vec<DocumentChunk> = pieces
            .into_iter()
            .zip(embeddings)
            .map(|(text, embedding)| DocumentChunk {
                source: filename.to_string(),
                text,
                content_hash: hash.clone(),
                embedding,
            })
            .collect();
        let count = new_chunks.len();

        let mut collections = self.collections.write().await;
        let chunks = collections.entry(collection.to_string()).or_default();
        chunks.retain(|c| c.source != filename);
        chunks.extend(new_chunks);
        if let Some(dir) = &self.store_dir {
            flush_collection(dir, collection, chunks).await?;
        }

        info!(collection, filename, chunks = count, "Indexed document");
        Ok(IngestReport {
            filename: filename.to_string(),
            chunks: count,
            collection: collection.to_string(),
        })
    }

    async fn list_documents(&self, collection: &str) -> Result<Vec<String>, RetrievalError> {
        let collections = self.collections.read().await;
        let sources: BTreeSet<&str> = collections
            .get(collection)
            .map(|chunks| chunks.iter().map(|c| c.source.as_str()).collect())
            .unwrap_or_default();
        Ok(sources.into_iter().map(String::from).collect())
    }

    async fn delete_document(&self, collection: &str, filename: &str) -> Result<bool, RetrievalError> {
        let mut collections = self.collections.write().await;
        let Some(chunks) = collections.get_mut(collection) else {
            return Ok(false);
        };
        let before = chunks.len();
        chunks.retain(|c| c.source != filename);
        let removed = before - chunks.len();
        if removed == 0 {
            return Ok(false);
        }
        if let Some(dir) = &self.store_dir {
            flush_collection(dir, collection, chunks).await?;
        }
        if chunks.is_empty() {
            collections.remove(collection);
        }
        info!(collection, filename, chunks = removed, "Deleted document");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ragent_core::error::ProviderError;
    use ragent_core::provider::{EmbeddingResponse, ProviderRequest, ProviderResponse};

    fn index() -> InMemoryDocumentIndex {
        InMemoryDocumentIndex::new(Chunker::default())
    }

    #[tokio::test]
    async fn ingest_and_query_ranks_relevant_document_first() {
        let idx = index();
        idx.ingest("default", "menu.txt", "The cafeteria serves pasta on Fridays.").await.unwrap();
        idx.ingest("default", "report.md", "Q3 revenue grew 12 percent year over year.").await.unwrap();

        let hits = idx.query("How much did revenue grow?", "default", 4).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].source_id, "report.md");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn non_empty_collection_always_returns_top_k() {
        let idx = index();
        idx.ingest("default", "a.txt", "alpha").await.unwrap();
        let hits = idx.query("completely unrelated words", "default", 4).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn collections_are_isolated() {
        let idx = index();
        idx.ingest("work", "plan.txt", "roadmap").await.unwrap();
        assert!(idx.query("roadmap", "personal", 4).await.unwrap().is_empty());
        assert_eq!(idx.list_documents("work").await.unwrap(), vec!["plan.txt"]);
        assert!(idx.list_documents("personal").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_documents_is_sorted_and_unique() {
        let idx = InMemoryDocumentIndex::new(Chunker::new(40, 5).unwrap());
        idx.ingest("c", "zeta.txt", &"long sentence about things. ".repeat(10)).await.unwrap();
        idx.ingest("c", "alpha.md", "short").await.unwrap();
        assert!(idx.chunk_count("c").await > 2);
        assert_eq!(idx.list_documents("c").await.unwrap(), vec!["alpha.md", "zeta.txt"]);
    }

    #[tokio::test]
    async fn reingest_replaces_previous_chunks() {
        let idx = index();
        idx.ingest("c", "doc.txt", "old content").await.unwrap();
        idx.ingest("c", "doc.txt", "new content").await.unwrap();
        let hits = idx.query("content", "c", 4).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "new content");
    }

    #[tokio::test]
    async fn unchanged_document_is_not_reindexed() {
        let idx = index();
        let first = idx.ingest("c", "doc.txt", "same").await.unwrap();
        let second = idx.ingest("c", "doc.txt", "same").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(idx.chunk_count("c").await, 1);
    }

    #[tokio::test]
    async fn delete_removes_every_chunk() {
        let idx = InMemoryDocumentIndex::new(Chunker::new(40, 5).unwrap());
        idx.ingest("c", "big.txt", &"many words in here. ".repeat(20)).await.unwrap();
        idx.ingest("c", "keep.txt", "keep me").await.unwrap();

        assert!(idx.delete_document("c", "big.txt").await.unwrap());
        assert_eq!(idx.list_documents("c").await.unwrap(), vec!["keep.txt"]);
        assert_eq!(idx.chunk_count("c").await, 1);
    }

    #[tokio::test]
    async fn delete_missing_document_reports_false() {
        let idx = index();
        assert!(!idx.delete_document("c", "nope.txt").await.unwrap());
        idx.ingest("c", "a.txt", "x").await.unwrap();
        assert!(!idx.delete_document("c", "nope.txt").await.unwrap());
    }

    #[tokio::test]
    async fn unsupported_and_empty_documents_are_rejected() {
        let idx = index();
        let err = idx.ingest("c", "slides.pptx", "binary").await.unwrap_err();
        assert!(matches!(err, RetrievalError::UnsupportedFormat(ref e) if e == ".pptx"));
        let err = idx.ingest("c", "blank.txt", "   ").await.unwrap_err();
        assert!(matches!(err, RetrievalError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn persisted_collections_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let idx = index().with_persistence(dir.path());
            idx.ingest("team notes", "report.md", "Q3 revenue grew 12 percent.").await.unwrap();
            idx.ingest("team notes", "menu.txt", "Pasta on Fridays.").await.unwrap();
            idx.ingest("../escape", "a.txt", "alpha").await.unwrap();
            assert!(idx.delete_document("team notes", "menu.txt").await.unwrap());
            assert!(idx.delete_document("../escape", "a.txt").await.unwrap());
        }
        assert!(!dir.path().join("../escape.jsonl").exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        let restarted = index().with_persistence(dir.path());
        assert_eq!(restarted.collections().await, vec!["team notes"]);
        assert_eq!(restarted.list_documents("team notes").await.unwrap(), vec!["report.md"]);
        let hits = restarted.query("revenue", "team notes", 4).await.unwrap();
        assert_eq!(hits[0].text, "Q3 revenue grew 12 percent.");
    }

    #[tokio::test]
    async fn corrupt_index_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = r#"{"source":"a.txt","text":"alpha","content_hash":"00"}"#;
        std::fs::write(collection_file(dir.path(), "c"), format!("{good}\nnot json\n")).unwrap();
        std::fs::write(dir.path().join("stray.jsonl"), good).unwrap();

        let idx = index().with_persistence(dir.path());
        assert_eq!(idx.collections().await, vec!["c"]);
        assert_eq!(idx.chunk_count("c").await, 1);
    }

    /// Embeds text as [count of 'a', count of 'b'].
    struct LetterEmbedder;

    #[async_trait]
    impl Provider for LetterEmbedder {
        fn name(&self) -> &str {
            "letters"
        }
        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("embeddings only".into()))
        }
        async fn embed(&self, request: EmbeddingRequest) -> Result<EmbeddingResponse, ProviderError> {
            Ok(EmbeddingResponse {
                embeddings: request
                    .inputs
                    .iter()
                    .map(|t| vec![t.matches('a').count() as f32, t.matches('b').count() as f32])
                    .collect(),
                model: request.model,
            })
        }
    }

    #[tokio::test]
    async fn embedder_ranks_by_cosine_similarity() {
        let idx = index().with_embedder(Arc::new(LetterEmbedder), "letters");
        idx.ingest("c", "a.txt", "aaaa").await.unwrap();
        idx.ingest("c", "b.txt", "bbbb").await.unwrap();

        let hits = idx.query("bb", "c", 1).await.unwrap();
        assert_eq!(hits[0].source_id, "b.txt");
        assert!((hits[0].score - 1.0).abs() < 1e-6);
    }
}
