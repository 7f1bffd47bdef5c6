//! Builds the configured completion provider.

use crate::openai_compat::OpenAiCompatProvider;
use ragent_core::error::ProviderError;
use ragent_core::provider::Provider;
use std::sync::Arc;
use std::time::Duration;

/// Create the provider described by `config.model`.
///
/// Every supported backend speaks the OpenAI chat-completions dialect, so
/// the provider name only selects defaults (Ollama needs no key).
pub fn build_from_config(config: &ragent_config::AppConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let model = &config.model;
    let timeout = Duration::from_secs(model.request_timeout_secs);

    let base_url = if model.base_url.trim().is_empty() {
        default_base_url(&model.provider)
    } else {
        model.base_url.clone()
    };

    let api_key = match (&model.api_key, model.provider.as_str()) {
        (Some(key), _) => key.clone(),
        (None, "ollama") => "ollama".into(),
        (None, other) => {
            return Err(ProviderError::NotConfigured(format!(
                "provider '{other}' requires model.api_key or RAGENT_API_KEY"
            )));
        }
    };

    let provider = OpenAiCompatProvider::new(&model.provider, base_url, api_key)?.with_timeout(timeout)?;
    Ok(Arc::new(provider))
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => "http://localhost:11434/v1".into(),
    }
}
