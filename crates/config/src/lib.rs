//! Configuration loading, validation, and management for Ragent.
//!
//! Loads configuration from `~/.ragent/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.ragent/config.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub conversations: ConversationConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// Completion backend settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// "ollama" or "openai" (any OpenAI-compatible endpoint)
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_provider() -> String {
    "ollama".into()
}
fn default_base_url() -> String {
    "http://localhost:11434/v1".into()
}
fn default_model() -> String {
    "phi3:mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    2048
}
fn default_request_timeout() -> u64 {
    120
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl std::fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelConfig")
            .field("provider", &self.provider)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &redact(&self.api_key))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Used when a query does not say whether to retrieve
    #[serde(default = "default_true")]
    pub enabled_by_default: bool,

    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Embedding model served by the completion backend; keyword scoring when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    #[serde(default = "default_collection")]
    pub default_collection: String,
}

fn default_true() -> bool {
    true
}
fn default_top_k() -> usize {
    4
}
fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    50
}
fn default_collection() -> String {
    "default".into()
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            enabled_by_default: true,
            top_k: default_top_k(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            embedding_model: None,
            default_collection: default_collection(),
        }
    }
}

/// How whole conversations are dropped from the in-process store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionKind {
    /// Keep every conversation for the process lifetime
    None,
    /// Drop the least recently used conversation past `max_sessions`
    Lru,
    /// Drop conversations idle longer than `idle_ttl_secs`
    Ttl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    /// Stored turns replayed into each model call
    #[serde(default = "default_replay_turns")]
    pub replay_turns: usize,

    #[serde(default = "default_eviction")]
    pub eviction: EvictionKind,

    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,
}

fn default_replay_turns() -> usize {
    6
}
fn default_eviction() -> EvictionKind {
    EvictionKind::Lru
}
fn default_max_sessions() -> usize {
    1000
}
fn default_idle_ttl() -> u64 {
    3600
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            replay_turns: default_replay_turns(),
            eviction: default_eviction(),
            max_sessions: default_max_sessions(),
            idle_ttl_secs: default_idle_ttl(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackendKind {
    /// DuckDuckGo HTML results, falling back to the Instant Answer API
    DuckDuckGo,
    /// Brave Search API (needs `search_api_key`)
    Brave,
    /// Tavily search API (needs `search_api_key`)
    Tavily,
    /// Never leaves the process; always reports no results
    Offline,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_search_backend")]
    pub search_backend: SearchBackendKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_api_key: Option<String>,

    #[serde(default = "default_search_timeout")]
    pub search_timeout_secs: u64,

    /// Results requested when the classifier forces a search
    #[serde(default = "default_forced_results")]
    pub forced_search_max_results: usize,

    /// Characters of tool output echoed in `action_result` events
    #[serde(default = "default_preview_chars")]
    pub result_preview_chars: usize,
}

fn default_search_backend() -> SearchBackendKind {
    SearchBackendKind::DuckDuckGo
}
fn default_search_timeout() -> u64 {
    10
}
fn default_forced_results() -> usize {
    3
}
fn default_preview_chars() -> usize {
    200
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            search_backend: default_search_backend(),
            search_api_key: None,
            search_timeout_secs: default_search_timeout(),
            forced_search_max_results: default_forced_results(),
            result_preview_chars: default_preview_chars(),
        }
    }
}

impl std::fmt::Debug for ToolsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolsConfig")
            .field("search_backend", &self.search_backend)
            .field("search_api_key", &redact(&self.search_api_key))
            .field("search_timeout_secs", &self.search_timeout_secs)
            .field("forced_search_max_results", &self.forced_search_max_results)
            .field("result_preview_chars", &self.result_preview_chars)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:5173".into()]
}
fn default_max_upload() -> usize {
    20 * 1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            cors_origins: default_cors_origins(),
            max_upload_bytes: default_max_upload(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Uploaded files are kept under `<data_dir>/uploads`, indexed
    /// chunks under `<data_dir>/index`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    AppConfig::config_dir().join("data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.ragent/config.toml),
    /// then apply environment overrides:
    /// - `RAGENT_API_KEY`
    /// - `RAGENT_BASE_URL`
    /// - `RAGENT_MODEL`
    /// - `RAGENT_DATA_DIR`
    /// - `RAGENT_SEARCH_API_KEY`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Overlay values found by `lookup` (normally the process environment).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("RAGENT_API_KEY").filter(|k| !k.is_empty()) {
            self.model.api_key = Some(key);
        }
        if let Some(url) = lookup("RAGENT_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(model) = lookup("RAGENT_MODEL") {
            self.model.model = model;
        }
        if let Some(dir) = lookup("RAGENT_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Some(key) = lookup("RAGENT_SEARCH_API_KEY").filter(|k| !k.is_empty()) {
            self.tools.search_api_key = Some(key);
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".ragent")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(ConfigError::ValidationError(
                "model.temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.model.base_url.trim().is_empty() {
            return Err(ConfigError::ValidationError("model.base_url must not be empty".into()));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::ValidationError("retrieval.top_k must be at least 1".into()));
        }
        if self.retrieval.chunk_size == 0 || self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            return Err(ConfigError::ValidationError(
                "retrieval.chunk_overlap must be smaller than a non-zero retrieval.chunk_size".into(),
            ));
        }
        let replay = self.conversations.replay_turns;
        if replay == 0 || replay % 2 != 0 {
            return Err(ConfigError::ValidationError(
                "conversations.replay_turns must be a positive even number".into(),
            ));
        }
        if self.conversations.eviction == EvictionKind::Lru && self.conversations.max_sessions == 0 {
            return Err(ConfigError::ValidationError(
                "conversations.max_sessions must be at least 1 with lru eviction".into(),
            ));
        }
        if self.conversations.eviction == EvictionKind::Ttl && self.conversations.idle_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "conversations.idle_ttl_secs must be at least 1 with ttl eviction".into(),
            ));
        }
        let keyed = matches!(self.tools.search_backend, SearchBackendKind::Brave | SearchBackendKind::Tavily);
        if keyed && self.tools.search_api_key.as_deref().is_none_or(str::is_empty) {
            return Err(ConfigError::ValidationError(
                "tools.search_api_key is required for the brave and tavily search backends".into(),
            ));
        }
        Ok(())
    }

    pub fn has_api_key(&self) -> bool {
        self.model.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
