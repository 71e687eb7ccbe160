//! Provider capability traits
//!
//! Chat is the mandatory capability; code completion and streaming are optional
//! extensions that callers probe for at runtime.

use async_trait::async_trait;

use crate::error::ProviderResult;
use crate::models::{ChatOptions, Message};

impl std::fmt::Debug for dyn LlmClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmClient").field("name", &self.name()).finish()
    }
}

/// Minimal LLM client contract implemented by every provider
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send chat messages and return the assistant text
    async fn chat(&self, messages: &[Message], opts: &ChatOptions) -> ProviderResult<String>;

    /// Short provider name (e.g. "openai", "ollama")
    fn name(&self) -> &str;

    /// Configured default model name
    fn default_model(&self) -> &str;

    /// Optional Codex-style completion capability
    fn code_completer(&self) -> Option<&dyn CodeCompleter> {
        None
    }

    /// Optional streaming capability
    fn streamer(&self) -> Option<&dyn ChatStreamer> {
        None
    }
}

/// Fill-in-the-middle code completion
#[async_trait]
pub trait CodeCompleter: Send + Sync {
    /// Return up to `n` completion suggestions for the prompt/suffix pair
    async fn code_completion(
        &self,
        prompt: &str,
        suffix: &str,
        n: usize,
        language: &str,
        temperature: f64,
    ) -> ProviderResult<Vec<String>>;
}

/// Incremental chat output delivered through a delta callback
#[async_trait]
pub trait ChatStreamer: Send + Sync {
    /// Stream the assistant reply, invoking `on_delta` for each content chunk
    async fn chat_stream(
        &self,
        messages: &[Message],
        opts: &ChatOptions,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> ProviderResult<()>;
}
