//! # Ragent Core
//!
//! Domain types, traits, and error definitions for the Ragent
//! retrieval-augmented agent. Every collaborator the orchestration loop
//! talks to (completion provider, tools, document retrieval) is defined as a
//! trait here; implementations live in their respective crates.

pub mod error;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod tool;

pub use error::{Error, Result};
pub use message::{ConversationId, Role, Turn};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk};
pub use retrieval::{DocumentIndex, IngestReport, RetrievedPassage, Retriever};
pub use tool::{Tool, ToolDescriptor, ToolRegistry, ToolResult};
