//! Conversation turn types.
//!
//! A [`Turn`] is the unit that flows between the conversation store, the
//! prompt assembler and the completion provider. Its serialized form is the
//! `{"role", "content"}` object chat-completion endpoints expect.

use serde::{Deserialize, Serialize};

/// Identifier used when the caller does not name a conversation.
pub const DEFAULT_CONVERSATION: &str = "default";

/// Caller-chosen identifier of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self(DEFAULT_CONVERSATION.to_string())
    }
}

/// Blank input falls back to the `"default"` sentinel.
impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            Self::default()
        } else {
            Self(trimmed.to_string())
        }
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        if s.trim().len() == s.len() && !s.is_empty() {
            Self(s)
        } else {
            Self::from(s.as_str())
        }
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Per-call instructions; never stored in a conversation.
    System,
    User,
    Assistant,
}

/// One role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_serializes_as_chat_message() {
        let json = serde_json::to_value(Turn::user("hi")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hi"}));
    }

    #[test]
    fn blank_conversation_id_uses_sentinel() {
        assert_eq!(ConversationId::from("  ").as_str(), "default");
        assert_eq!(ConversationId::from("abc").as_str(), "abc");
        assert_eq!(ConversationId::default().to_string(), DEFAULT_CONVERSATION);
    }

    #[test]
    fn conversion_traits_trim_and_default() {
        let owned: ConversationId = String::from(" chat-1 ").into();
        assert_eq!(owned.as_str(), "chat-1");
        let blank: ConversationId = String::new().into();
        assert_eq!(blank, ConversationId::default());
        let borrowed: ConversationId = "chat-1".into();
        assert_eq!(borrowed, owned);
    }

    #[test]
    fn conversation_id_is_transparent_in_json() {
        let id: ConversationId = serde_json::from_str("\"chat-7\"").unwrap();
        assert_eq!(id, ConversationId::from("chat-7"));
    }
}
