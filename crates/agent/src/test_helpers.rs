//! Scripted collaborators for orchestration tests.

use async_trait::async_trait;
use ragent_core::error::{ProviderError, RetrievalError};
use ragent_core::provider::{ChunkReceiver, Usage};
use ragent_core::{Provider, ProviderRequest, ProviderResponse, RetrievedPassage, Retriever, ToolRegistry, Turn};
use ragent_tools::registry_with_search;
use ragent_tools::web_search::{SearchHit, StaticSearchBackend};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

enum Script {
    Tokens(Vec<String>),
    /// Emit these tokens, then break the stream.
    FailAfter(Vec<String>),
}

/// Streams one scripted response per call and records every request.
/// Calls beyond the script fail with `ModelNotFound`.
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(responses: Vec<Vec<&str>>) -> Self {
        let scripts = responses
            .into_iter()
            .map(|tokens| Script::Tokens(tokens.into_iter().map(String::from).collect()))
            .collect();
        Self {
            scripts: Mutex::new(scripts),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_after(self, tokens: Vec<&str>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Script::FailAfter(tokens.into_iter().map(String::from).collect()));
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_script(&self, request: ProviderRequest) -> Option<Script> {
        self.requests.lock().unwrap().push(request);
        self.scripts.lock().unwrap().pop_front()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let text = match self.next_script(request) {
            Some(Script::Tokens(tokens)) => tokens.concat(),
            _ => return Err(ProviderError::ModelNotFound("mock-model".into())),
        };
        Ok(ProviderResponse {
            message: Turn::assistant(text),
            usage: Some(Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            }),
            model: "mock-model".into(),
        })
    }

    async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        let (tokens, fail) = match self.next_script(request) {
            Some(Script::Tokens(tokens)) => (tokens, false),
            Some(Script::FailAfter(tokens)) => (tokens, true),
            None => return Err(ProviderError::ModelNotFound("mock-model".into())),
        };

        let (tx, rx) = mpsc::channel(tokens.len() + 1);
        for content in tokens {
            let _ = tx.try_send(Ok(ragent_core::StreamChunk {
                content: Some(content),
                ..Default::default()
            }));
        }
        let last = if fail {
            Err(ProviderError::StreamInterrupted("connection reset".into()))
        } else {
            Ok(ragent_core::StreamChunk {
                done: true,
                ..Default::default()
            })
        };
        let _ = tx.try_send(last);
        Ok(rx)
    }
}

/// Refuses every request.
pub struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }

    async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
        Err(ProviderError::Network("connection refused".into()))
    }
}

/// Returns the same passages for every query, or fails.
pub struct StaticRetriever {
    passages: Option<Vec<RetrievedPassage>>,
}

impl StaticRetriever {
    pub fn new(passages: Vec<(&str, &str)>) -> Self {
        let passages = passages
            .into_iter()
            .map(|(source, text)| RetrievedPassage {
                text: text.into(),
                source_id: source.into(),
                score: 1.0,
            })
            .collect();
        Self {
            passages: Some(passages),
        }
    }

    pub fn failing() -> Self {
        Self { passages: None }
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn query(&self, _text: &str, _collection: &str, k: usize) -> Result<Vec<RetrievedPassage>, RetrievalError> {
        match &self.passages {
            Some(passages) => Ok(passages.iter().take(k).cloned().collect()),
            None => Err(RetrievalError::Storage("index offline".into())),
        }
    }
}

/// The built-in tools with a canned search backend.
pub fn registry() -> ToolRegistry {
    registry_with_search(Arc::new(StaticSearchBackend::new(vec![SearchHit::new(
        "Paris forecast",
        "Sunny, 24°C",
        "https://example.com/paris",
    )])))
}
