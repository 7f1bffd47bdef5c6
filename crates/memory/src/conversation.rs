//! Per-conversation turn history.
//!
//! The session map sits behind an `RwLock` and every session behind its own
//! `Mutex`, so work on one conversation id is serialized while different
//! ids proceed independently. Locks are plain `std::sync` primitives and are
//! never held across an `.await`.

use crate::eviction::{EvictionPolicy, SessionStats, Unbounded, policy_from_config};
use ragent_config::ConversationConfig;
use ragent_core::message::{ConversationId, Turn};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use tracing::debug;

struct Session {
    turns: Vec<Turn>,
    last_access: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            turns: Vec::new(),
            last_access: Instant::now(),
        }
    }
}

type SessionHandle = Arc<Mutex<Session>>;

/// Process-lifetime store of user/assistant turns keyed by conversation id.
///
/// System turns are built per call and never stored. Older turns stay in
/// the store; [`ConversationStore::recent`] only surfaces the tail.
pub struct ConversationStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
    policy: Box<dyn EvictionPolicy>,
}

impl ConversationStore {
    pub fn new(policy: Box<dyn EvictionPolicy>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// A store that never evicts.
    pub fn unbounded() -> Self {
        Self::new(Box::new(Unbounded))
    }

    pub fn from_config(config: &ConversationConfig) -> Self {
        Self::new(policy_from_config(config))
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub fn append(&self, id: &ConversationId, turn: Turn) {
        self.with_session(id, |session| session.turns.push(turn));
    }

    /// Append both halves of a completed exchange under one lock acquisition.
    pub fn append_exchange(&self, id: &ConversationId, user: Turn, assistant: Turn) {
        self.with_session(id, |session| {
            session.turns.push(user);
            session.turns.push(assistant);
        });
    }

    /// The last `max_turns` turns in order; empty for unknown ids.
    pub fn recent(&self, id: &ConversationId, max_turns: usize) -> Vec<Turn> {
        let Some(handle) = self.existing(id) else {
            return Vec::new();
        };
        let mut session = handle.lock().unwrap_or_else(PoisonError::into_inner);
        session.last_access = Instant::now();
        let start = session.turns.len().saturating_sub(max_turns);
        session.turns[start..].to_vec()
    }

    /// Total stored turns for `id`.
    pub fn len(&self, id: &ConversationId) -> usize {
        self.existing(id)
            .map(|h| h.lock().unwrap_or_else(PoisonError::into_inner).turns.len())
            .unwrap_or(0)
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.existing(id).is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn existing(&self, id: &ConversationId) -> Option<SessionHandle> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id.as_str())
            .cloned()
    }

    fn with_session(&self, id: &ConversationId, update: impl FnOnce(&mut Session)) {
        let handle = match self.existing(id) {
            Some(handle) => handle,
            None => self.create(id),
        };
        let mut session = handle.lock().unwrap_or_else(PoisonError::into_inner);
        session.last_access = Instant::now();
        update(&mut session);
    }

    /// Insert a session for `id`, evicting whatever the policy selects first.
    fn create(&self, id: &ConversationId) -> SessionHandle {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);

        // Another caller may have created it between our read and write.
        if let Some(handle) = sessions.get(id.as_str()) {
            return handle.clone();
        }

        let stats: Vec<SessionStats> = sessions
            .iter()
            .map(|(key, handle)| {
                let session = handle.lock().unwrap_or_else(PoisonError::into_inner);
                SessionStats {
                    id: key.clone(),
                    last_access: session.last_access,
                    turns: session.turns.len(),
                }
            })
            .collect();

        for victim in self.policy.select_victims(&stats, Instant::now()) {
            if sessions.remove(&victim).is_some() {
                debug!(conversation_id = %victim, policy = self.policy.name(), "Evicted conversation");
            }
        }

        let handle = Arc::new(Mutex::new(Session::new()));
        sessions.insert(id.as_str().to_string(), handle.clone());
        handle
    }
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::unbounded()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::LruEviction;

    fn id(s: &str) -> ConversationId {
        ConversationId::from(s)
    }

    #[test]
    fn append_then_recent_preserves_order() {
        let store = ConversationStore::unbounded();
        let a = Turn::user("A");
        let b = Turn::assistant("B");
        store.append(&id("c1"), a.clone());
        store.append(&id("c1"), b.clone());
        assert_eq!(store.recent(&id("c1"), 6), vec![a, b]);
    }

    #[test]
    fn window_excludes_but_retains_older_turns() {
        let store = ConversationStore::unbounded();
        for i in 0..5 {
            store.append_exchange(&id("c1"), Turn::user(format!("q{i}")), Turn::assistant(format!("a{i}")));
        }
        let recent = store.recent(&id("c1"), 6);
        assert_eq!(recent.len(), 6);
        assert_eq!(recent[0].content, "q2");
        assert_eq!(recent[5].content, "a4");
        assert_eq!(store.len(&id("c1")), 10);
    }

    #[test]
    fn unknown_conversation_is_empty_and_not_created() {
        let store = ConversationStore::unbounded();
        assert!(store.recent(&id("ghost"), 6).is_empty());
        assert!(!store.contains(&id("ghost")));
        assert_eq!(store.session_count(), 0);
    }

    #[test]
    fn conversations_are_isolated() {
        let store = ConversationStore::unbounded();
        store.append(&id("a"), Turn::user("for a"));
        store.append(&id("b"), Turn::user("for b"));
        assert_eq!(store.recent(&id("a"), 6)[0].content, "for a");
        assert_eq!(store.len(&id("b")), 1);
    }

    #[test]
    fn lru_evicts_least_recently_used_conversation() {
        let store = ConversationStore::new(Box::new(LruEviction::new(2)));
        store.append(&id("first"), Turn::user("1"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.append(&id("second"), Turn::user("2"));
        std::thread::sleep(std::time::Duration::from_millis(5));
        // Touch "first" so "second" becomes the LRU entry.
        store.recent(&id("first"), 6);
        std::thread::sleep(std::time::Duration::from_millis(5));
        store.append(&id("third"), Turn::user("3"));

        assert_eq!(store.session_count(), 2);
        assert!(store.contains(&id("first")));
        assert!(!store.contains(&id("second")));
        assert!(store.contains(&id("third")));
    }

    #[test]
    fn concurrent_appends_to_one_conversation_are_not_lost() {
        let store = Arc::new(ConversationStore::unbounded());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store.append_exchange(
                            &ConversationId::from("shared"),
                            Turn::user(format!("{t}-{i}")),
                            Turn::assistant("ok"),
                        );
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let turns = store.recent(&id("shared"), usize::MAX);
        assert_eq!(turns.len(), 400);
        // Exchanges are never interleaved.
        for pair in turns.chunks(2) {
            assert_eq!(pair[0].role, ragent_core::Role::User);
            assert_eq!(pair[1].role, ragent_core::Role::Assistant);
        }
    }
}
