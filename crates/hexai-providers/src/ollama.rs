//! Ollama client against a local server
//!
//! Ollama runs models locally, so no API key is involved; chat goes through
//! `/api/chat` with optional streaming.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::client::{ChatStreamer, LlmClient};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{preview, ChatOptions, Message};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "qwen3-coder:30b";

/// Client for a local Ollama server
pub struct OllamaClient {
    http: Client,
    base_url: String,
    default_model: String,
    default_temperature: Option<f64>,
}

impl OllamaClient {
    /// Create a client from explicit configuration; empty values fall back to defaults
    pub fn new(
        base_url: Option<String>,
        model: Option<String>,
        default_temperature: Option<f64>,
    ) -> Self {
        let base_url = base_url
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let default_model = model
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model,
            default_temperature,
        }
    }

    fn build_request(&self, messages: &[Message], opts: &ChatOptions, stream: bool) -> ChatRequest {
        let temperature = opts.temperature.or(self.default_temperature);
        ChatRequest {
            model: opts
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages: messages.to_vec(),
            stream,
            options: temperature.map(|t| RequestOptions { temperature: t }),
        }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<RequestOptions>,
}

#[derive(Serialize)]
struct RequestOptions {
    temperature: f64,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: ResponseMessage,
    #[serde(default)]
    error: String,
}

#[derive(Deserialize, Default)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, messages: &[Message], opts: &ChatOptions) -> ProviderResult<String> {
        let req = self.build_request(messages, opts, false);
        let endpoint = format!("{}/api/chat", self.base_url);
        debug!(model = %req.model, "POST {endpoint}");
        let start = Instant::now();

        let resp = self.http.post(&endpoint).json(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "ollama http error");
            return Err(ProviderError::Api {
                provider: "ollama",
                status: status.as_u16(),
                message: "http error".to_string(),
            });
        }

        let out: ChatResponse = resp.json().await?;
        if !out.error.is_empty() {
            return Err(ProviderError::Api {
                provider: "ollama",
                status: status.as_u16(),
                message: out.error,
            });
        }
        let content = out.message.content;
        debug!(
            size = content.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ollama success preview={}",
            preview(&content)
        );
        Ok(content)
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn streamer(&self) -> Option<&dyn ChatStreamer> {
        Some(self)
    }
}

#[async_trait]
impl ChatStreamer for OllamaClient {
    async fn chat_stream(
        &self,
        messages: &[Message],
        opts: &ChatOptions,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> ProviderResult<()> {
        let req = self.build_request(messages, opts, true);
        let endpoint = format!("{}/api/chat", self.base_url);
        debug!(model = %req.model, "POST {endpoint} (stream)");

        let mut resp = self.http.post(&endpoint).json(&req).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: "ollama",
                status: status.as_u16(),
                message: "http error".to_string(),
            });
        }

        // One JSON object per line
        let mut buf = String::new();
        while let Some(chunk) = resp.chunk().await? {
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(nl) = buf.find('\n') {
                let line = buf[..nl].to_string();
                buf.drain(..=nl);
                let Ok(part) = serde_json::from_str::<ChatResponse>(&line) else {
                    continue;
                };
                if !part.error.is_empty() {
                    return Err(ProviderError::Api {
                        provider: "ollama",
                        status: status.as_u16(),
                        message: part.error,
                    });
                }
                if !part.message.content.is_empty() {
                    on_delta(&part.message.content);
                }
            }
        }
        Ok(())
    }
}
