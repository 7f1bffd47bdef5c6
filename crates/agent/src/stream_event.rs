//! Events emitted by the orchestration loop.
//!
//! The gateway forwards each event as one SSE `data:` frame, so the serde
//! shape here is the wire protocol:
//! - `token`: partial text from the model
//! - `action`: a tool is about to run
//! - `action_result`: truncated tool output
//! - `sources`: passages the answer was grounded on
//! - `done`: the query finished and history was updated
//! - `error`: the query was abandoned

use ragent_core::RetrievedPassage;
use serde::{Deserialize, Serialize};

/// Passage excerpts are cut to this many characters.
pub const SOURCE_EXCERPT_CHARS: usize = 200;

/// A source reference attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: String,
    pub content: String,
}

impl SourceRef {
    pub fn from_passage(passage: &RetrievedPassage) -> Self {
        Self {
            source: passage.source_id.clone(),
            content: truncate_chars(&passage.text, SOURCE_EXCERPT_CHARS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    Token { content: String },

    Action { action: String },

    ActionResult { result: String },

    Sources { sources: Vec<SourceRef> },

    Done { conversation_id: String },

    Error { error: String },
}

impl OrchestrationEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::Action { .. } => "action",
            Self::ActionResult { .. } => "action_result",
            Self::Sources { .. } => "sources",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// `done` and `error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

/// First `max` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
