//! HTTP API gateway for Ragent.
//!
//! Serves the query stream, document management and tool endpoints
//! described in [`api`], with CORS, upload size limits and request
//! tracing applied to every route.
//!
//! Built on Axum.

pub mod api;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method, header};
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use ragent_agent::OrchestrationLoop;
use ragent_config::{AppConfig, GatewayConfig};
use ragent_core::{DocumentIndex, Retriever, ToolRegistry};
use ragent_memory::{ConversationStore, InMemoryDocumentIndex};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub orchestration: OrchestrationLoop,
    pub documents: Arc<dyn DocumentIndex>,
    pub uploads_dir: PathBuf,
    pub default_collection: String,
}

impl GatewayState {
    /// Build every subsystem once from `config`.
    ///
    /// Indexed documents are reloaded from `<data_dir>/index`.
    pub fn from_config(config: &AppConfig) -> ragent_core::Result<Self> {
        config.validate().map_err(|e| ragent_core::Error::config(e.to_string()))?;
        let provider = ragent_providers::build_from_config(config)?;

        let mut index = InMemoryDocumentIndex::from_config(&config.retrieval)?
            .with_persistence(config.storage.index_dir());
        if let Some(model) = &config.retrieval.embedding_model {
            info!(model = %model, "Document index scores with embeddings");
            index = index.with_embedder(provider.clone(), model.clone());
        }
        let index = Arc::new(index);

        let tools = Arc::new(ragent_tools::default_registry(&config.tools));
        let conversations = Arc::new(ConversationStore::from_config(&config.conversations));
        info!(
            provider = %provider.name(),
            model = %config.model.model,
            eviction = %conversations.policy_name(),
            tools = tools.len(),
            "Subsystems ready"
        );

        let retriever: Arc<dyn Retriever> = index.clone();
        let orchestration =
            OrchestrationLoop::from_config(config, provider, tools, conversations).with_retriever(retriever);

        Ok(Self {
            orchestration,
            documents: index,
            uploads_dir: config.storage.uploads_dir(),
            default_collection: config.retrieval.default_collection.clone(),
        })
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        self.orchestration.tools()
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the router with all routes and layers.
///
/// Layers applied:
/// - CORS restricted to the configured origins
/// - Request body limit of `max_upload_bytes`
/// - HTTP trace logging
pub fn build_router(state: SharedState, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .merge(api::api_router(state))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config.cors_origins))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::AUTHORIZATION])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> ragent_core::Result<()> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let state = Arc::new(GatewayState::from_config(&config)?);
    tokio::fs::create_dir_all(&state.uploads_dir).await?;

    let app = build_router(state, &config.gateway);

    info!(addr = %addr, "Gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct RootResponse {
    message: &'static str,
    status: &'static str,
}

async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "Ragent API",
        status: "running",
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
