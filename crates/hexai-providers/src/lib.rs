//! hexai LLM providers - chat and code-completion clients behind one trait
//!
//! This crate provides the narrow capability contract the LSP server and CLI
//! consume: `chat(messages, options) -> text`, plus optional code-completion
//! and streaming extensions that callers probe for at runtime.

pub mod client;
pub mod copilot;
pub mod error;
pub mod models;
pub mod ollama;
pub mod openai;

use std::sync::Arc;

pub use client::{ChatStreamer, CodeCompleter, LlmClient};
pub use copilot::CopilotClient;
pub use error::{ProviderError, ProviderResult};
pub use models::{ChatOptions, Message};
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

/// Provider selection and per-provider settings, as read from the config file
#[derive(Debug, Clone, Default)]
pub struct ProviderConfig {
    /// Provider name: "openai" (default), "ollama", or "copilot"
    pub provider: String,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    pub ollama_base_url: Option<String>,
    pub ollama_model: Option<String>,
    pub ollama_temperature: Option<f64>,
    pub copilot_base_url: Option<String>,
    pub copilot_model: Option<String>,
    pub copilot_temperature: Option<f64>,
}

/// Create an LLM client from configuration.
///
/// API keys are supplied by the caller (read from the environment at the
/// entrypoints); this crate never reads environment variables itself.
pub fn new_from_config(
    cfg: &ProviderConfig,
    openai_api_key: &str,
    copilot_api_key: &str,
) -> ProviderResult<Arc<dyn LlmClient>> {
    let provider = cfg.provider.trim().to_lowercase();
    let provider = if provider.is_empty() {
        "openai".to_string()
    } else {
        provider
    };
    match provider.as_str() {
        "openai" => {
            if openai_api_key.trim().is_empty() {
                return Err(ProviderError::MissingApiKey("openai".to_string()));
            }
            Ok(Arc::new(OpenAiClient::new(
                cfg.openai_base_url.clone(),
                cfg.openai_model.clone(),
                openai_api_key.to_string(),
            )))
        }
        "ollama" => Ok(Arc::new(OllamaClient::new(
            cfg.ollama_base_url.clone(),
            cfg.ollama_model.clone(),
            cfg.ollama_temperature,
        ))),
        "copilot" => {
            if copilot_api_key.trim().is_empty() {
                return Err(ProviderError::MissingApiKey("copilot".to_string()));
            }
            Ok(Arc::new(CopilotClient::new(
                cfg.copilot_base_url.clone(),
                cfg.copilot_model.clone(),
                copilot_api_key.to_string(),
                cfg.copilot_temperature,
            )))
        }
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_defaults_to_openai() {
        let client = new_from_config(&ProviderConfig::default(), "key", "").unwrap();
        assert_eq!(client.name(), "openai");
    }

    #[test]
    fn test_factory_requires_keys() {
        let err = new_from_config(&ProviderConfig::default(), "", "").unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey(_)));

        let cfg = ProviderConfig {
            provider: "copilot".to_string(),
            ..ProviderConfig::default()
        };
        let err = new_from_config(&cfg, "", "").unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey(_)));
    }

    #[test]
    fn test_factory_rejects_unknown_provider() {
        let cfg = ProviderConfig {
            provider: "frontier".to_string(),
            ..ProviderConfig::default()
        };
        let err = new_from_config(&cfg, "", "").unwrap_err();
        assert!(matches!(err, ProviderError::UnknownProvider(_)));
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let cfg = ProviderConfig {
            provider: "Ollama".to_string(),
            ..ProviderConfig::default()
        };
        let client = new_from_config(&cfg, "", "").unwrap();
        assert_eq!(client.name(), "ollama");
    }
}
