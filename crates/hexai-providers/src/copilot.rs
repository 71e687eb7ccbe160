//! GitHub Copilot client for chat and Codex-style code completion
//!
//! The personal access token is exchanged for a short-lived session token via
//! the GitHub API; the session token carries its expiry as a JWT `exp` claim.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error};

use crate::client::{CodeCompleter, LlmClient};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{preview, ChatOptions, Message};

const DEFAULT_BASE_URL: &str = "https://api.githubcopilot.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const TOKEN_URL: &str = "https://api.github.com/copilot_internal/v2/token";
const CODEX_URL: &str =
    "https://copilot-proxy.githubusercontent.com/v1/engines/copilot-codex/completions";

/// Client for GitHub Copilot's chat and completion APIs
pub struct CopilotClient {
    http: Client,
    api_key: String,
    base_url: String,
    default_model: String,
    default_temperature: Option<f64>,
    session: Mutex<Session>,
}

#[derive(Default)]
struct Session {
    token: String,
    /// Unix seconds at which the token expires
    expires_at: u64,
}

impl CopilotClient {
    /// Create a client from explicit configuration; empty values fall back to defaults
    pub fn new(
        base_url: Option<String>,
        model: Option<String>,
        api_key: String,
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
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model,
            default_temperature,
            session: Mutex::new(Session::default()),
        }
    }

    /// Fetch or reuse the Copilot session token (reused while valid for >60 s)
    async fn session_token(&self) -> ProviderResult<String> {
        let mut session = self.session.lock().await;
        let now = unix_now();
        if !session.token.is_empty() && now + 60 < session.expires_at {
            return Ok(session.token.clone());
        }
        if self.api_key.trim().is_empty() {
            return Err(ProviderError::MissingApiKey("copilot".to_string()));
        }

        #[derive(Deserialize)]
        struct TokenResponse {
            token: String,
        }

        let resp = self
            .http
            .get(TOKEN_URL)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .header("User-Agent", concat!("hexai/", env!("CARGO_PKG_VERSION")))
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: "copilot",
                status: status.as_u16(),
                message: "token http error".to_string(),
            });
        }
        let out: TokenResponse = resp.json().await?;
        if out.token.trim().is_empty() {
            return Err(ProviderError::Api {
                provider: "copilot",
                status: status.as_u16(),
                message: "empty session token".to_string(),
            });
        }
        session.expires_at = parse_jwt_exp(&out.token).unwrap_or(now + 600);
        session.token = out.token.clone();
        Ok(out.token)
    }

    fn build_request(&self, messages: &[Message], opts: &ChatOptions) -> ChatRequest {
        ChatRequest {
            model: opts
                .model
                .clone()
                .unwrap_or_else(|| self.default_model.clone()),
            messages: messages.to_vec(),
            temperature: opts.temperature.or(self.default_temperature),
            max_tokens: opts.max_tokens,
            stop: if opts.stop.is_empty() {
                None
            } else {
                Some(opts.stop.clone())
            },
        }
    }
}

/// Unix seconds for the current time
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Extract the `exp` claim from a JWT without verifying the signature
fn parse_jwt_exp(token: &str) -> Option<u64> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload).ok()?;

    #[derive(Deserialize)]
    struct Claims {
        exp: u64,
    }
    serde_json::from_slice::<Claims>(&bytes).ok().map(|c| c.exp)
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
}

#[derive(Serialize)]
struct CodexRequest<'a> {
    extra: CodexExtra<'a>,
    max_tokens: u32,
    n: usize,
    nwo: &'a str,
    prompt: &'a str,
    stop: [&'a str; 1],
    stream: bool,
    suffix: &'a str,
    temperature: f64,
    top_p: f64,
}

#[derive(Serialize)]
struct CodexExtra<'a> {
    language: &'a str,
    next_indent: u32,
    prompt_tokens: u32,
    suffix_tokens: u32,
    trim_by_indentation: bool,
}

#[derive(Deserialize)]
struct CodexEvent {
    #[serde(default)]
    choices: Vec<CodexChoice>,
}

#[derive(Deserialize)]
struct CodexChoice {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    text: String,
}

#[async_trait]
impl LlmClient for CopilotClient {
    async fn chat(&self, messages: &[Message], opts: &ChatOptions) -> ProviderResult<String> {
        let token = self.session_token().await?;
        let req = self.build_request(messages, opts);
        let endpoint = format!("{}/chat/completions", self.base_url);
        debug!(model = %req.model, "POST {endpoint}");
        let start = Instant::now();

        let resp = self
            .http
            .post(&endpoint)
            .bearer_auth(&token)
            .header("Editor-Version", "vscode/1.85.1")
            .header("Openai-Organization", "github-copilot")
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
                .map(|e| e.message)
                .unwrap_or_else(|| "http error".to_string());
            error!(status = status.as_u16(), "copilot api error: {message}");
            return Err(ProviderError::Api {
                provider: "copilot",
                status: status.as_u16(),
                message,
            });
        }

        let out: ChatResponse = resp.json().await?;
        let choice = out
            .choices
            .into_iter()
            .next()
            .ok_or(ProviderError::NoChoices("copilot"))?;
        let content = choice.message.content;
        debug!(
            finish = choice.finish_reason.as_deref().unwrap_or(""),
            size = content.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "copilot success preview={}",
            preview(&content)
        );
        Ok(content)
    }

    fn name(&self) -> &str {
        "copilot"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn code_completer(&self) -> Option<&dyn CodeCompleter> {
        Some(self)
    }
}

#[async_trait]
impl CodeCompleter for CopilotClient {
    async fn code_completion(
        &self,
        prompt: &str,
        suffix: &str,
        n: usize,
        language: &str,
        temperature: f64,
    ) -> ProviderResult<Vec<String>> {
        let token = self.session_token().await?;
        let n = n.max(1);
        let req = CodexRequest {
            extra: CodexExtra {
                language,
                next_indent: 0,
                prompt_tokens: 500,
                suffix_tokens: 400,
                trim_by_indentation: true,
            },
            max_tokens: 500,
            n,
            nwo: "hexai",
            prompt,
            stop: ["\n\n"],
            stream: true,
            suffix,
            temperature,
            top_p: 1.0,
        };
        debug!(%language, n, "POST {CODEX_URL}");

        let resp = self
            .http
            .post(CODEX_URL)
            .bearer_auth(&token)
            .header("Editor-Version", "vscode/1.85.1")
            .header("Openai-Intent", "copilot-ghost")
            .header("Openai-Organization", "github-copilot")
            .json(&req)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Api {
                provider: "copilot",
                status: status.as_u16(),
                message: "codex http error".to_string(),
            });
        }

        // Accumulate `data:` SSE lines by choice index
        let raw = resp.text().await?;
        let mut by_index: Vec<String> = vec![String::new(); n];
        for line in raw.lines() {
            let Some(payload) = line.strip_prefix("data: ") else {
                continue;
            };
            let Ok(event) = serde_json::from_str::<CodexEvent>(payload) else {
                continue;
            };
            for choice in event.choices {
                if choice.index < n {
                    by_index[choice.index].push_str(&choice.text);
                }
            }
        }
        Ok(by_index
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_jwt_exp() {
        // {"exp":1700000000} encoded as an unsigned JWT payload
        let payload = URL_SAFE_NO_PAD.encode(br#"{"exp":1700000000}"#);
        let token = format!("header.{payload}.sig");
        assert_eq!(parse_jwt_exp(&token), Some(1_700_000_000));
        assert_eq!(parse_jwt_exp("not-a-jwt"), None);
    }

    #[test]
    fn test_defaults_applied_when_config_empty() {
        let c = CopilotClient::new(None, None, "k".to_string(), None);
        assert_eq!(c.base_url, DEFAULT_BASE_URL);
        assert_eq!(c.default_model(), DEFAULT_MODEL);
        assert!(c.code_completer().is_some());
    }
}
