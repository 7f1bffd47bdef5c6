//! Error types for the Ragent domain.
//!
//! Each bounded context has its own `thiserror` enum; [`Error`] wraps the
//! ones that can stop the service from starting or serving.

use thiserror::Error;

/// Startup and serving failures.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    ExecutionFailed(String),

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("tool panicked")]
    Panicked,
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Unsupported file type '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Embedding generation failed: {0}")]
    EmbeddingFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_status() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 503,
            message: "model is loading".into(),
        });
        assert!(err.to_string().contains("503"));
        assert!(err.to_string().contains("model is loading"));
    }

    #[test]
    fn execution_failure_is_rendered_bare() {
        let err = ToolError::ExecutionFailed("connection refused".into());
        assert_eq!(err.to_string(), "connection refused");
    }

    #[test]
    fn config_and_io_errors_wrap() {
        let err = Error::config("model.temperature must be between 0.0 and 2.0");
        assert_eq!(
            err.to_string(),
            "Configuration error: model.temperature must be between 0.0 and 2.0"
        );
        let io: Error = std::io::Error::new(std::io::ErrorKind::AddrInUse, "port taken").into();
        assert!(matches!(io, Error::Io(_)));
    }

    #[test]
    fn retrieval_error_converts_into_top_level() {
        let err: Error = RetrievalError::UnsupportedFormat(".pdf".into()).into();
        assert!(matches!(err, Error::Retrieval(_)));
        assert!(err.to_string().contains(".pdf"));
    }
}
