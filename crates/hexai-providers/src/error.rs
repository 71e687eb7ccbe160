//! Error types for the providers crate

use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Errors that can occur when talking to an LLM provider
#[derive(Debug, Error)]
pub enum ProviderError {
    /// A required API key was not supplied (never includes key material)
    #[error("missing API key for provider {0}")]
    MissingApiKey(String),

    /// Unknown provider name in configuration
    #[error("unknown LLM provider: {0}")]
    UnknownProvider(String),

    /// Network-level failure
    #[error("network error: {0}")]
    Network(String),

    /// Non-2xx response from the provider API
    #[error("{provider} error: {message} (status {status})")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    /// The provider returned a well-formed but unusable response
    #[error("{0}: no choices returned")]
    NoChoices(&'static str),

    /// Serialization/deserialization failure
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Serialization(err.to_string())
    }
}
