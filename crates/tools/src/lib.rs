//! Built-in tool implementations for Ragent.
//!
//! Three tools are advertised to the model: `web_search` for live
//! information, `calculator` for arithmetic and `get_time` for the local
//! clock.

pub mod calculator;
pub mod get_time;
pub mod web_search;

use ragent_config::{SearchBackendKind, ToolsConfig};
use ragent_core::error::ToolError;
use ragent_core::tool::ToolRegistry;
use std::sync::Arc;
use std::time::Duration;
use web_search::{BraveBackend, DuckDuckGoBackend, SearchBackend, StaticSearchBackend, TavilyBackend, WebSearchTool};

pub use calculator::CalculatorTool;
pub use get_time::GetTimeTool;

/// Build the registry with every built-in tool, searching through `backend`.
pub fn registry_with_search(backend: Arc<dyn SearchBackend>) -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(Box::new(WebSearchTool::new(backend)))
        .with_tool(Box::new(CalculatorTool))
        .with_tool(Box::new(GetTimeTool))
}

/// Create the tool registry described by `config`.
pub fn default_registry(config: &ToolsConfig) -> ToolRegistry {
    let backend = match live_backend(config) {
        Ok(Some(backend)) => backend,
        Ok(None) => Arc::new(StaticSearchBackend::offline()),
        Err(e) => {
            tracing::warn!(error = %e, "Web search unavailable, falling back to offline backend");
            Arc::new(StaticSearchBackend::offline())
        }
    };
    registry_with_search(backend)
}

fn live_backend(config: &ToolsConfig) -> Result<Option<Arc<dyn SearchBackend>>, ToolError> {
    let timeout = Duration::from_secs(config.search_timeout_secs);
    let api_key = || {
        config
            .search_api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("search_api_key is not set".into()))
    };
    let backend: Arc<dyn SearchBackend> = match config.search_backend {
        SearchBackendKind::DuckDuckGo => Arc::new(DuckDuckGoBackend::new(timeout)?),
        SearchBackendKind::Brave => Arc::new(BraveBackend::new(api_key()?, timeout)?),
        SearchBackendKind::Tavily => Arc::new(TavilyBackend::new(api_key()?, timeout)?),
        SearchBackendKind::Offline => return Ok(None),
    };
    Ok(Some(backend))
}
