//! Policies deciding which whole conversations leave the store.

use ragent_config::{ConversationConfig, EvictionKind};
use std::time::{Duration, Instant};

/// Snapshot of one stored conversation, handed to a policy.
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub id: String,
    pub last_access: Instant,
    pub turns: usize,
}

/// Consulted by the store right before a new conversation is created.
pub trait EvictionPolicy: Send + Sync {
    fn name(&self) -> &str;

    /// Ids to remove so that one more conversation can be admitted.
    fn select_victims(&self, sessions: &[SessionStats], now: Instant) -> Vec<String>;
}

/// Keeps everything for the life of the process.
pub struct Unbounded;

impl EvictionPolicy for Unbounded {
    fn name(&self) -> &str {
        "none"
    }

    fn select_victims(&self, _sessions: &[SessionStats], _now: Instant) -> Vec<String> {
        Vec::new()
    }
}

/// Caps the number of conversations, dropping the least recently used.
pub struct LruEviction {
    max_sessions: usize,
}

impl LruEviction {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            max_sessions: max_sessions.max(1),
        }
    }
}

impl EvictionPolicy for LruEviction {
    fn name(&self) -> &str {
        "lru"
    }

    fn select_victims(&self, sessions: &[SessionStats], _now: Instant) -> Vec<String> {
        if sessions.len() < self.max_sessions {
            return Vec::new();
        }
        let excess = sessions.len() + 1 - self.max_sessions;

        let mut by_age: Vec<&SessionStats> = sessions.iter().collect();
        by_age.sort_by_key(|s| s.last_access);
        by_age.into_iter().take(excess).map(|s| s.id.clone()).collect()
    }
}

/// Drops conversations that have been idle longer than `idle`.
pub struct TtlEviction {
    idle: Duration,
}

impl TtlEviction {
    pub fn new(idle: Duration) -> Self {
        Self { idle }
    }
}

impl EvictionPolicy for TtlEviction {
    fn name(&self) -> &str {
        "ttl"
    }

    fn select_victims(&self, sessions: &[SessionStats], now: Instant) -> Vec<String> {
        sessions
            .iter()
            .filter(|s| now.saturating_duration_since(s.last_access) > self.idle)
            .map(|s| s.id.clone())
            .collect()
    }
}

/// Build the policy named in configuration.
pub fn policy_from_config(config: &ConversationConfig) -> Box<dyn EvictionPolicy> {
    match config.eviction {
        EvictionKind::None => Box::new(Unbounded),
        EvictionKind::Lru => Box::new(LruEviction::new(config.max_sessions)),
        EvictionKind::Ttl => Box::new(TtlEviction::new(Duration::from_secs(config.idle_ttl_secs))),
    }
}
