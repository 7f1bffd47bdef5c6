//! State that outlives a single query.
//!
//! - [`ConversationStore`]: per-conversation turn history with a pluggable
//!   [`EvictionPolicy`]
//! - [`InMemoryDocumentIndex`]: per-collection chunked documents scored by
//!   keyword overlap or, when an embedding model is configured, by cosine
//!   similarity, optionally mirrored to disk
//! - [`extract_text`]: text from `.txt`, `.md`, `.pdf` and `.docx` uploads

pub mod chunking;
pub mod conversation;
pub mod document_index;
pub mod eviction;
pub mod extract;
pub mod scoring;

pub use chunking::Chunker;
pub use conversation::ConversationStore;
pub use document_index::InMemoryDocumentIndex;
pub use eviction::{EvictionPolicy, LruEviction, SessionStats, TtlEviction, Unbounded, policy_from_config};
pub use extract::{SUPPORTED_EXTENSIONS, extract_text, is_supported_file};
pub use scoring::{KeywordScorer, cosine_similarity};
