//! The per-query orchestration loop.
//!
//! ```text
//! CLASSIFY ─┬─ forced ──▶ web_search ─▶ GENERATE (one pass) ───────────────┐
//!           └─ RETRIEVE ─▶ GENERATE ─▶ directive? ─ yes ─▶ EXECUTE ─▶ GENERATE
//!                                          │ no                              │
//!                                          ▼                                 ▼
//!                                       FINALIZE ◀──────────────────────────┘
//! ```
//!
//! Every query runs in its own task and reports through an event channel.
//! A completion failure in any pass ends the query with a single `error`
//! event; the conversation store is only written once an answer is complete.

use crate::classifier::{classify, clean_search_query};
use crate::directive;
use crate::prompt;
use crate::stream_event::{OrchestrationEvent, SourceRef, truncate_chars};
use ragent_config::AppConfig;
use ragent_core::error::ProviderError;
use ragent_core::{ConversationId, Provider, ProviderRequest, RetrievedPassage, Retriever, ToolRegistry, Turn};
use ragent_memory::ConversationStore;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info, info_span, warn};

const EVENT_BUFFER: usize = 64;

/// One user turn as submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,

    #[serde(default = "default_collection")]
    pub collection: String,

    #[serde(default)]
    pub conversation_id: Option<String>,

    /// Falls back to the configured default when absent
    #[serde(default)]
    pub use_rag: Option<bool>,
}

fn default_collection() -> String {
    "default".into()
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            collection: default_collection(),
            conversation_id: None,
            use_rag: None,
        }
    }

    pub fn with_collection(mut self, collection: impl Into<String>) -> Self {
        self.collection = collection.into();
        self
    }

    pub fn with_conversation(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    pub fn with_rag(mut self, enabled: bool) -> Self {
        self.use_rag = Some(enabled);
        self
    }

    pub fn conversation(&self) -> ConversationId {
        ConversationId::from(self.conversation_id.as_deref().unwrap_or_default())
    }
}

/// Everything a query emitted, collected by [`OrchestrationLoop::run`].
#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub events: Vec<OrchestrationEvent>,
}

impl QueryOutcome {
    /// Concatenated `token` content across all passes.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                OrchestrationEvent::Token { content } => Some(content.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn actions(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                OrchestrationEvent::Action { action } => Some(action.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn error(&self) -> Option<&str> {
        self.events.iter().find_map(|e| match e {
            OrchestrationEvent::Error { error } => Some(error.as_str()),
            _ => None,
        })
    }

    pub fn sources(&self) -> &[SourceRef] {
        self.events
            .iter()
            .find_map(|e| match e {
                OrchestrationEvent::Sources { sources } => Some(sources.as_slice()),
                _ => None,
            })
            .unwrap_or_default()
    }
}

/// Why a query stopped before finalizing.
enum Halt {
    /// The event receiver is gone.
    Disconnected,
    Completion(ProviderError),
}

impl From<ProviderError> for Halt {
    fn from(e: ProviderError) -> Self {
        Self::Completion(e)
    }
}

type Step<T> = std::result::Result<T, Halt>;

/// Composes classifier, retriever, provider, tools and conversation store
/// into the query protocol. Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct OrchestrationLoop {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    retriever: Option<Arc<dyn Retriever>>,
    conversations: Arc<ConversationStore>,

    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    rag_by_default: bool,
    top_k: usize,
    replay_turns: usize,
    preview_chars: usize,
    forced_max_results: usize,
}

impl OrchestrationLoop {
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        conversations: Arc<ConversationStore>,
    ) -> Self {
        Self {
            provider,
            tools,
            retriever: None,
            conversations,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            rag_by_default: true,
            top_k: 4,
            replay_turns: 6,
            preview_chars: 200,
            forced_max_results: 3,
        }
    }

    /// Build a loop with every setting taken from `config`.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        conversations: Arc<ConversationStore>,
    ) -> Self {
        let mut this = Self::new(provider, config.model.model.clone(), tools, conversations)
            .with_temperature(config.model.temperature)
            .with_max_tokens(config.model.max_tokens)
            .with_top_k(config.retrieval.top_k)
            .with_replay_turns(config.conversations.replay_turns);
        this.rag_by_default = config.retrieval.enabled_by_default;
        this.preview_chars = config.tools.result_preview_chars;
        this.forced_max_results = config.tools.forced_search_max_results;
        this
    }

    pub fn with_retriever(mut self, retriever: Arc<dyn Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    pub fn with_replay_turns(mut self, turns: usize) -> Self {
        self.replay_turns = turns;
        self
    }

    pub fn conversations(&self) -> &Arc<ConversationStore> {
        &self.conversations
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Start processing `request` on a new task and return its event stream.
    ///
    /// The stream always ends with `done` or `error` unless the receiver is
    /// dropped first, in which case the query is abandoned.
    pub fn run_stream(&self, request: QueryRequest) -> mpsc::Receiver<OrchestrationEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let this = self.clone();
        let span = info_span!("query", query_id = %uuid::Uuid::new_v4());
        tokio::spawn(async move { this.drive(request, tx).await }.instrument(span));
        rx
    }

    /// Run `request` to completion and collect its events.
    pub async fn run(&self, request: QueryRequest) -> QueryOutcome {
        let mut rx = self.run_stream(request);
        let mut outcome = QueryOutcome::default();
        while let Some(event) = rx.recv().await {
            outcome.events.push(event);
        }
        outcome
    }

    async fn drive(&self, request: QueryRequest, tx: mpsc::Sender<OrchestrationEvent>) {
        let started = Instant::now();
        let conversation_id = request.conversation();

        match self.process(&request, &conversation_id, &tx).await {
            Ok(()) => info!(
                conversation_id = %conversation_id,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Query completed"
            ),
            Err(Halt::Disconnected) => {
                debug!(conversation_id = %conversation_id, "Client went away, query abandoned")
            }
            Err(Halt::Completion(e)) => {
                warn!(conversation_id = %conversation_id, error = %e, "Completion failed");
                let _ = tx
                    .send(OrchestrationEvent::Error { error: e.to_string() })
                    .await;
            }
        }
    }

    async fn process(
        &self,
        request: &QueryRequest,
        conversation_id: &ConversationId,
        tx: &mpsc::Sender<OrchestrationEvent>,
    ) -> Step<()> {
        let classification = classify(&request.query);
        let history = self.conversations.recent(conversation_id, self.replay_turns);

        let (answer, passages) = if classification.requires_external_info() {
            info!(
                conversation_id = %conversation_id,
                branch = "forced_search",
                matched = ?classification.matched,
                "Classified query"
            );
            self.forced_search(request, history, tx).await?
        } else {
            info!(
                conversation_id = %conversation_id,
                branch = "retrieve",
                matched = ?classification.matched,
                "Classified query"
            );
            self.retrieve_and_answer(request, history, tx).await?
        };

        if tx.is_closed() {
            return Err(Halt::Disconnected);
        }
        self.conversations
            .append_exchange(conversation_id, Turn::user(&request.query), Turn::assistant(answer));

        if !passages.is_empty() {
            let sources = passages.iter().map(SourceRef::from_passage).collect();
            emit(tx, OrchestrationEvent::Sources { sources }).await?;
        }
        emit(
            tx,
            OrchestrationEvent::Done {
                conversation_id: conversation_id.to_string(),
            },
        )
        .await
    }

    async fn forced_search(
        &self,
        request: &QueryRequest,
        history: Vec<Turn>,
        tx: &mpsc::Sender<OrchestrationEvent>,
    ) -> Step<(String, Vec<RetrievedPassage>)> {
        emit(tx, OrchestrationEvent::Action { action: "web_search".into() }).await?;

        let cleaned = clean_search_query(&request.query);
        let started = Instant::now();
        let output = self
            .tools
            .execute("web_search", json!({"query": cleaned, "max_results": self.forced_max_results}))
            .await;
        info!(
            tool = "web_search",
            query = %cleaned,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Forced search finished"
        );
        emit(
            tx,
            OrchestrationEvent::ActionResult {
                result: truncate_chars(&output, self.preview_chars),
            },
        )
        .await?;

        let passages = self.retrieve(request).await;
        let messages = self.messages(prompt::forced_search_prompt(&output, &passages), history, &request.query);
        let answer = self.generate(messages, tx).await?;
        Ok((answer, passages))
    }

    async fn retrieve_and_answer(
        &self,
        request: &QueryRequest,
        history: Vec<Turn>,
        tx: &mpsc::Sender<OrchestrationEvent>,
    ) -> Step<(String, Vec<RetrievedPassage>)> {
        let passages = self.retrieve(request).await;
        let system = prompt::system_prompt(&self.tools.list_tools(), &passages);
        let mut messages = self.messages(system, history, &request.query);

        let first_pass = self.generate(messages.clone(), tx).await?;
        let Some(directive) = directive::extract(&first_pass) else {
            return Ok((first_pass, passages));
        };

        emit(
            tx,
            OrchestrationEvent::Action {
                action: directive.tool_name.clone(),
            },
        )
        .await?;
        let started = Instant::now();
        let result = self
            .tools
            .execute(&directive.tool_name, Value::Object(directive.parameters))
            .await;
        info!(
            tool = %directive.tool_name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Directive executed"
        );
        emit(
            tx,
            OrchestrationEvent::ActionResult {
                result: truncate_chars(&result, self.preview_chars),
            },
        )
        .await?;

        messages.push(Turn::assistant(first_pass));
        messages.push(Turn::user(prompt::tool_result_turn(&result)));
        let answer = self.generate(messages, tx).await?;
        Ok((answer, passages))
    }

    /// Top-k passages, or nothing when retrieval is off or fails.
    async fn retrieve(&self, request: &QueryRequest) -> Vec<RetrievedPassage> {
        let enabled = request.use_rag.unwrap_or(self.rag_by_default);
        let Some(retriever) = self.retriever.as_ref().filter(|_| enabled) else {
            return Vec::new();
        };
        match retriever.query(&request.query, &request.collection, self.top_k).await {
            Ok(passages) => {
                debug!(collection = %request.collection, count = passages.len(), "Retrieved passages");
                passages
            }
            Err(e) => {
                warn!(collection = %request.collection, error = %e, "Retrieval failed, continuing without context");
                Vec::new()
            }
        }
    }

    fn messages(&self, system: String, history: Vec<Turn>, query: &str) -> Vec<Turn> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Turn::system(system));
        messages.extend(history);
        messages.push(Turn::user(query));
        messages
    }

    /// Stream one completion pass, forwarding tokens, and return its text.
    async fn generate(&self, messages: Vec<Turn>, tx: &mpsc::Sender<OrchestrationEvent>) -> Step<String> {
        let mut request = ProviderRequest::new(&self.model, messages)
            .with_temperature(self.temperature)
            .streaming();
        if let Some(max) = self.max_tokens {
            request = request.with_max_tokens(max);
        }

        let mut chunks = self.provider.stream(request).await?;
        let mut text = String::new();
        while let Some(chunk) = chunks.recv().await {
            let chunk = chunk?;
            if let Some(content) = chunk.content.filter(|c| !c.is_empty()) {
                text.push_str(&content);
                emit(tx, OrchestrationEvent::Token { content }).await?;
            }
            if chunk.done {
                break;
            }
        }
        Ok(text)
    }
}

async fn emit(tx: &mpsc::Sender<OrchestrationEvent>, event: OrchestrationEvent) -> Step<()> {
    tx.send(event).await.map_err(|_| Halt::Disconnected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingProvider, ScriptedProvider, StaticRetriever, registry};
    use ragent_core::Role;

    fn orchestration(provider: Arc<dyn Provider>) -> OrchestrationLoop {
        OrchestrationLoop::new(provider, "mock-model", Arc::new(registry()), Arc::new(ConversationStore::unbounded()))
    }

    fn types(outcome: &QueryOutcome) -> Vec<&'static str> {
        outcome.events.iter().map(OrchestrationEvent::event_type).collect()
    }

    #[tokio::test]
    async fn plain_answer_is_one_pass() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec!["Ownership ", "moves values."]]));
        let agent = orchestration(provider.clone());

        let outcome = agent.run(QueryRequest::new("Explain ownership")).await;

        assert_eq!(types(&outcome), vec!["token", "token", "done"]);
        assert_eq!(outcome.text(), "Ownership moves values.");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(agent.conversations().len(&ConversationId::default()), 2);
    }

    #[tokio::test]
    async fn forced_search_starts_with_action() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec!["It is sunny."]]));
        let agent = orchestration(provider.clone());

        let outcome = agent.run(QueryRequest::new("What's the weather in Paris?")).await;

        assert_eq!(types(&outcome), vec!["action", "action_result", "token", "done"]);
        assert_eq!(outcome.actions(), vec!["web_search"]);
        assert_eq!(provider.call_count(), 1);

        let system = &provider.requests()[0].messages[0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.contains("Paris forecast"));
    }

    #[tokio::test]
    async fn forced_search_still_grounds_on_documents() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec!["Sunny ", "and ", "dry."]]));
        let retriever = Arc::new(StaticRetriever::new(vec![("trip.md", "Our Paris hotel is near the Louvre.")]));
        let agent = orchestration(provider.clone()).with_retriever(retriever);

        let outcome = agent
            .run(QueryRequest::new("What's the weather in Paris today?").with_collection("travel"))
            .await;

        assert_eq!(
            types(&outcome),
            vec!["action", "action_result", "token", "token", "token", "sources", "done"]
        );
        assert_eq!(outcome.actions(), vec!["web_search"]);
        assert_eq!(outcome.sources()[0].source, "trip.md");
        assert_eq!(provider.call_count(), 1);

        let system = &provider.requests()[0].messages[0].content;
        assert!(system.contains("Current information:\n1. Paris forecast"));
        assert!(system.contains("Context from documents:\nSource: trip.md\nOur Paris hotel is near the Louvre."));
    }

    #[tokio::test]
    async fn directive_runs_tool_and_second_pass() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            vec![r#"{"action": "calculator", "parameters": {"expression": "2+2*5"}}"#],
            vec!["The answer is 12."],
        ]));
        let agent = orchestration(provider.clone());

        let outcome = agent.run(QueryRequest::new("Compute 2+2*5")).await;

        assert_eq!(types(&outcome), vec!["token", "action", "action_result", "token", "done"]);
        assert!(outcome.events.contains(&OrchestrationEvent::ActionResult {
            result: "Result: 12".into()
        }));

        let second = &provider.requests()[1].messages;
        assert_eq!(second[second.len() - 2].role, Role::Assistant);
        assert!(second.last().unwrap().content.starts_with("Tool result: Result: 12"));

        let stored = agent.conversations().recent(&ConversationId::default(), 6);
        assert_eq!(stored[1].content, "The answer is 12.");
    }

    #[tokio::test]
    async fn unknown_tool_error_is_fed_back() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            vec![r#"```json
{"action": "teleport", "parameters": {}}
```"#],
            vec!["I can't do that."],
        ]));
        let agent = orchestration(provider.clone());

        let outcome = agent.run(QueryRequest::new("Beam me up")).await;

        assert_eq!(outcome.actions(), vec!["teleport"]);
        assert!(outcome.error().is_none());
        let follow_up = provider.requests()[1].messages.last().unwrap().content.clone();
        assert!(follow_up.contains("Error: Unknown action 'teleport'"));
    }

    #[tokio::test]
    async fn retrieval_context_and_sources() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec!["Revenue grew."]]));
        let retriever = Arc::new(StaticRetriever::new(vec![("report.txt", "Revenue grew 12% in Q3.")]));
        let agent = orchestration(provider.clone()).with_retriever(retriever);

        let outcome = agent
            .run(QueryRequest::new("Summarize the uploaded report").with_collection("finance"))
            .await;

        assert_eq!(types(&outcome), vec!["token", "sources", "done"]);
        assert_eq!(outcome.sources()[0].source, "report.txt");
        assert!(provider.requests()[0].messages[0].content.contains("Source: report.txt"));
    }

    #[tokio::test]
    async fn rag_can_be_disabled_per_query() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec!["ok"]]));
        let retriever = Arc::new(StaticRetriever::new(vec![("a.txt", "alpha")]));
        let agent = orchestration(provider).with_retriever(retriever);

        let outcome = agent.run(QueryRequest::new("Explain alpha").with_rag(false)).await;

        assert!(outcome.sources().is_empty());
    }

    #[tokio::test]
    async fn retrieval_failure_is_swallowed() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec!["fine"]]));
        let agent = orchestration(provider).with_retriever(Arc::new(StaticRetriever::failing()));

        let outcome = agent.run(QueryRequest::new("Explain alpha")).await;

        assert_eq!(types(&outcome), vec!["token", "done"]);
    }

    #[tokio::test]
    async fn completion_failure_emits_single_error() {
        let agent = orchestration(Arc::new(FailingProvider));

        let outcome = agent.run(QueryRequest::new("Explain ownership")).await;

        assert_eq!(types(&outcome), vec!["error"]);
        assert_eq!(agent.conversations().session_count(), 0);
    }

    #[tokio::test]
    async fn mid_stream_failure_leaves_history_untouched() {
        let provider = Arc::new(ScriptedProvider::new(vec![]).fail_after(vec!["partial "]));
        let agent = orchestration(provider);

        let outcome = agent.run(QueryRequest::new("Explain ownership").with_conversation("c1")).await;

        assert_eq!(types(&outcome), vec!["token", "error"]);
        assert_eq!(agent.conversations().len(&ConversationId::from("c1")), 0);
    }

    #[tokio::test]
    async fn second_pass_failure_is_reported_once() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec![r#"{"action": "get_time"}"#]]));
        let agent = orchestration(provider);

        let outcome = agent.run(QueryRequest::new("What time is it?")).await;

        assert_eq!(outcome.events.iter().filter(|e| e.event_type() == "error").count(), 1);
        assert_eq!(outcome.events.last().map(|e| e.event_type()), Some("error"));
        assert_eq!(agent.conversations().session_count(), 0);
    }

    #[tokio::test]
    async fn history_is_replayed_within_window() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec!["one"], vec!["two"], vec!["three"]]));
        let agent = orchestration(provider.clone()).with_replay_turns(2);

        for q in ["first", "second", "third"] {
            agent.run(QueryRequest::new(q).with_conversation("c")).await;
        }

        let third = &provider.requests()[2].messages;
        let replayed: Vec<&str> = third.iter().map(|t| t.content.as_str()).skip(1).collect();
        assert_eq!(replayed, vec!["second", "two", "third"]);
        assert_eq!(agent.conversations().len(&ConversationId::from("c")), 6);
    }

    #[tokio::test]
    async fn dropped_receiver_abandons_query() {
        let provider = Arc::new(ScriptedProvider::new(vec![vec!["a", "b", "c"]]));
        let agent = orchestration(provider);

        drop(agent.run_stream(QueryRequest::new("Explain ownership")));
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(agent.conversations().session_count(), 0);
    }

    #[test]
    fn query_request_defaults() {
        let req: QueryRequest = serde_json::from_str(r#"{"query": "hi"}"#).unwrap();
        assert_eq!(req.collection, "default");
        assert_eq!(req.use_rag, None);
        assert_eq!(req.conversation(), ConversationId::default());
    }
}
