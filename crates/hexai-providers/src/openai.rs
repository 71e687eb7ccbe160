//! OpenAI client for chat completions with optional streaming

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::client::{ChatStreamer, LlmClient};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{preview, ChatOptions, Message};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4.1";

/// Client for OpenAI's Chat Completions API
pub struct OpenAiClient {
    http: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAiClient {
    /// Create a client from explicit configuration; empty values fall back to defaults.
    /// The key may be empty; calls will fail until a valid key is supplied.
    pub fn new(base_url: Option<String>, model: Option<String>, api_key: String) -> Self {
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
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model,
        }
    }

    fn build_request(&self, messages: &[Message], opts: &ChatOptions, stream: bool) -> ChatRequest {
        ChatRequest {
            model: opts
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages: messages.to_vec(),
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
            stop: if opts.stop.is_empty() {
                None
            } else {
                Some(opts.stop.clone())
            },
            stream,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat(&self, messages: &[Message], opts: &ChatOptions) -> ProviderResult<String> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey("openai".to_string()));
        }
        let req = self.build_request(messages, opts, false);
        let endpoint = format!("{}/chat/completions", self.base_url);
        debug!(model = %req.model, "POST {endpoint}");
        let start = Instant::now();

        let resp = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body: ChatResponse = resp.json().await.unwrap_or(ChatResponse {
                choices: Vec::new(),
                error: None,
            });
            let message = body
                .error
                .map(|e| {
                    error!(
                        status = status.as_u16(),
                        kind = e.kind.as_deref().unwrap_or(""),
                        "openai api error: {}",
                        e.message
                    );
                    e.message
                })
                .unwrap_or_else(|| "http error".to_string());
            return Err(ProviderError::Api {
                provider: "openai",
                status: status.as_u16(),
                message,
            });
        }

        let out: ChatResponse = resp.json().await?;
        let choice = out
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::NoChoices("openai"))?;
        let content = choice.message.content;
        debug!(
            finish = choice.finish_reason.as_deref().unwrap_or(""),
            size = content.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "openai success preview={}",
            preview(&content)
        );
        Ok(content)
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn streamer(&self) -> Option<&dyn ChatStreamer> {
        Some(self)
    }
}

#[async_trait]
impl ChatStreamer for OpenAiClient {
    async fn chat_stream(
        &self,
        messages: &[Message],
        opts: &ChatOptions,
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> ProviderResult<()> {
        if self.api_key.is_empty() {
            return Err(ProviderError::MissingApiKey("openai".to_string()));
        }
        let req = self.build_request(messages, opts, true);
        let endpoint = format!("{}/chat/completions", self.base_url);
        debug!(model = %req.model, "POST {endpoint} (stream)");

        let mut resp = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .header("Accept", "text/event-stream")
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: "openai",
                status: status.as_u16(),
                message: "http error".to_string(),
            });
        }

        // SSE-style data lines, possibly split across chunks
        let mut buf = String::new();
        while let Some(chunk) = resp.chunk().await? {
            buf.push_str(&String::from_utf8_lossy(&chunk));
            while let Some(nl) = buf.find('\n') {
                let line = buf[..nl].trim_end_matches('\r').to_string();
                buf.drain(..=nl);
                let Some(payload) = line.strip_prefix("data: ") else {
                    continue;
                };
                if payload.trim() == "[DONE]" {
                    return Ok(());
                }
                let Ok(chunk) = serde_json::from_str::<StreamChunk>(payload) else {
                    continue; // skip malformed lines
                };
                if let Some(err) = chunk.error {
                    return Err(ProviderError::Api {
                        provider: "openai",
                        status: status.as_u16(),
                        message: err.message,
                    });
                }
                for choice in chunk.choices {
                    if !choice.delta.content.is_empty() {
                        on_delta(&choice.delta.content);
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_applied_when_config_empty() {
        let c = OpenAiClient::new(Some("  ".to_string()), None, "k".to_string());
        assert_eq!(c.base_url, DEFAULT_BASE_URL);
        assert_eq!(c.default_model(), DEFAULT_MODEL);
    }

    #[test]
    fn test_request_serialization_omits_unset_fields() {
        let c = OpenAiClient::new(None, None, "k".to_string());
        let req = c.build_request(&[Message::user("hi")], &ChatOptions::default(), false);
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("temperature").is_none());
        assert!(json.get("max_tokens").is_none());
        assert!(json.get("stream").is_none());
        assert_eq!(json["model"], DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn test_chat_requires_api_key() {
        let c = OpenAiClient::new(None, None, String::new());
        let err = c
            .chat(&[Message::user("hi")], &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::MissingApiKey(_)));
    }
}
