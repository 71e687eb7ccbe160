//! LSP server over a framed byte stream
//!
//! The read loop parses framed JSON-RPC messages, drops responses (the server
//! fires `workspace/applyEdit` and discards the outcome), and dispatches each
//! request or notification to a fresh task. All LLM traffic funnels through a
//! single busy gate so at most one model call is in flight at any time.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use hexai_config::AppConfig;
use hexai_providers::{ChatOptions, LlmClient};

use crate::cache::CompletionCache;
use crate::context::{ContextBuilder, ContextMode};
use crate::document::DocumentStore;
use crate::transport::{write_message, MessageReader, MessageSink};
use crate::types::{
    CodeActionOptions, CompletionOptions, DidChangeParams, DidCloseParams, DidOpenParams,
    InitializeResult, LspResult, Request, Response, ServerCapabilities, ServerInfo, ServerState,
    METHOD_NOT_FOUND,
};

/// Configuration snapshot handed to the server at startup
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub max_tokens: u32,
    pub context_mode: ContextMode,
    pub window_lines: usize,
    pub max_context_tokens: usize,
    pub trigger_characters: Vec<String>,
    pub coding_temperature: Option<f64>,
    pub manual_invoke_min_prefix: usize,
    pub log_context: bool,
    pub log_preview_limit: usize,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for ServerOptions {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            max_tokens: cfg.max_tokens,
            context_mode: ContextMode::parse(&cfg.context_mode),
            window_lines: cfg.context_window_lines,
            max_context_tokens: cfg.max_context_tokens,
            trigger_characters: cfg.trigger_characters.clone(),
            coding_temperature: cfg.coding_temperature,
            manual_invoke_min_prefix: cfg.manual_invoke_min_prefix,
            log_context: cfg.log_context,
            log_preview_limit: cfg.log_preview_limit,
        }
    }
}

/// Mutual exclusion for LLM calls: at most one in flight process-wide
pub struct LlmGate {
    busy: AtomicBool,
}

impl LlmGate {
    fn new() -> Self {
        Self {
            busy: AtomicBool::new(false),
        }
    }

    /// Claim the gate; the permit releases it on drop
    pub fn try_acquire(&self) -> Option<LlmPermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| LlmPermit { gate: self })
    }

    /// Whether a call is currently in flight
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// RAII permit for the busy gate
pub struct LlmPermit<'a> {
    gate: &'a LlmGate,
}

impl Drop for LlmPermit<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

/// LLM traffic counters, logged after every request attempt
#[derive(Debug, Default, Clone)]
struct TrafficStats {
    requests: u64,
    sent_bytes: u64,
    responses: u64,
    recv_bytes: u64,
}

/// The LSP server state shared by all handler tasks
pub struct Server {
    pub(crate) docs: DocumentStore,
    pub(crate) cache: Mutex<CompletionCache>,
    pub(crate) llm: Option<Arc<dyn LlmClient>>,
    pub(crate) sink: Arc<dyn MessageSink>,
    pub(crate) context: ContextBuilder,
    pub(crate) options: ServerOptions,
    pub(crate) gate: LlmGate,
    next_id: AtomicI64,
    stats: Mutex<TrafficStats>,
    start_time: Instant,
    state: Mutex<ServerState>,
    clean_shutdown: AtomicBool,
}

impl Server {
    /// Create a server; `llm` may be absent, in which case every completion
    /// yields the fallback stub and chat/code-actions are disabled.
    pub fn new(
        options: ServerOptions,
        llm: Option<Arc<dyn LlmClient>>,
        sink: Arc<dyn MessageSink>,
    ) -> Arc<Self> {
        Arc::new(Self {
            docs: DocumentStore::new(),
            cache: Mutex::new(CompletionCache::new()),
            llm,
            sink,
            context: ContextBuilder {
                mode: options.context_mode,
                window_lines: options.window_lines,
                max_context_tokens: options.max_context_tokens,
            },
            options,
            gate: LlmGate::new(),
            next_id: AtomicI64::new(0),
            stats: Mutex::new(TrafficStats::default()),
            start_time: Instant::now(),
            state: Mutex::new(ServerState::Initializing),
            clean_shutdown: AtomicBool::new(false),
        })
    }

    /// Current lifecycle state
    pub fn state(&self) -> ServerState {
        *self.state.lock().expect("state lock")
    }

    fn set_state(&self, state: ServerState) {
        *self.state.lock().expect("state lock") = state;
    }

    /// Whether `exit` followed a clean `shutdown`
    pub fn exited_cleanly(&self) -> bool {
        self.clean_shutdown.load(Ordering::Acquire)
    }

    /// The LLM busy gate
    pub fn llm_gate(&self) -> &LlmGate {
        &self.gate
    }

    /// Read loop: dispatch messages until `exit`, clean EOF, or a transport
    /// error. Malformed JSON bodies are logged and skipped.
    pub async fn run<R>(self: &Arc<Self>, reader: R) -> LspResult<()>
    where
        R: tokio::io::AsyncRead + Unpin,
    {
        let mut reader = MessageReader::new(reader);
        loop {
            let Some(body) = reader.read_message().await? else {
                return Ok(());
            };
            let msg: Incoming = match serde_json::from_slice(&body) {
                Ok(msg) => msg,
                Err(err) => {
                    warn!("invalid JSON: {err}");
                    continue;
                }
            };
            let Some(method) = msg.method else {
                // a response from the client; ignore
                continue;
            };
            if method == "exit" {
                self.handle_exit();
                return Ok(());
            }
            let server = Arc::clone(self);
            tokio::spawn(async move {
                server.handle(&method, msg.id, msg.params).await;
            });
        }
    }

    /// Dispatch one request or notification
    pub async fn handle(self: &Arc<Self>, method: &str, id: Option<Value>, params: Option<Value>) {
        let params = params.unwrap_or(Value::Null);
        match method {
            "initialize" => self.handle_initialize(id).await,
            "initialized" => info!("client initialized"),
            "shutdown" => self.handle_shutdown(id).await,
            "exit" => self.handle_exit(),
            "textDocument/didOpen" => self.handle_did_open(params),
            "textDocument/didChange" => {
                self.handle_did_change(params);
            }
            "textDocument/didClose" => self.handle_did_close(params),
            "textDocument/completion" => self.handle_completion(id, params).await,
            "textDocument/codeAction" => self.handle_code_action(id, params).await,
            "codeAction/resolve" => self.handle_code_action_resolve(id, params).await,
            _ => {
                if id.is_some() {
                    self.reply_error(id, METHOD_NOT_FOUND, format!("method not found: {method}"))
                        .await;
                }
            }
        }
    }

    async fn handle_initialize(&self, id: Option<Value>) {
        let mut version = env!("CARGO_PKG_VERSION").to_string();
        if let Some(llm) = &self.llm {
            version = format!("{version} [{}:{}]", llm.name(), llm.default_model());
        }
        let result = InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: 1, // full sync
                completion_provider: CompletionOptions {
                    resolve_provider: false,
                    trigger_characters: self.options.trigger_characters.clone(),
                },
                code_action_provider: CodeActionOptions {
                    resolve_provider: true,
                },
            },
            server_info: ServerInfo {
                name: "hexai".to_string(),
                version,
            },
        };
        self.set_state(ServerState::Running);
        self.reply(id, &result).await;
    }

    async fn handle_shutdown(&self, id: Option<Value>) {
        self.set_state(ServerState::ShuttingDown);
        self.reply(id, &Value::Null).await;
    }

    fn handle_exit(&self) {
        if self.state() == ServerState::ShuttingDown {
            self.clean_shutdown.store(true, Ordering::Release);
        }
        self.set_state(ServerState::Exited);
    }

    fn handle_did_open(&self, params: Value) {
        if let Ok(p) = serde_json::from_value::<DidOpenParams>(params) {
            self.docs.set(&p.text_document.uri, &p.text_document.text);
        }
    }

    /// Store the new full text, then scan for in-editor chat triggers.
    /// Returns the chat task handle so tests can await its completion.
    pub fn handle_did_change(self: &Arc<Self>, params: Value) -> Option<tokio::task::JoinHandle<()>> {
        let p = serde_json::from_value::<DidChangeParams>(params).ok()?;
        let text = &p.content_changes.last()?.text;
        self.docs.set(&p.text_document.uri, text);
        self.detect_and_handle_chat(&p.text_document.uri)
    }

    fn handle_did_close(&self, params: Value) {
        if let Ok(p) = serde_json::from_value::<DidCloseParams>(params) {
            self.docs.remove(&p.text_document.uri);
        }
    }

    /// Send a successful response echoing the request id
    pub(crate) async fn reply<T: Serialize>(&self, id: Option<Value>, result: &T) {
        let result = match serde_json::to_value(result) {
            Ok(v) => v,
            Err(err) => {
                warn!("reply marshal error: {err}");
                return;
            }
        };
        write_message(&self.sink, &Response::success(id, result)).await;
    }

    pub(crate) async fn reply_error(&self, id: Option<Value>, code: i64, message: String) {
        write_message(&self.sink, &Response::error(id, code, message)).await;
    }

    /// Allocate a monotonic id for a server-initiated request
    pub(crate) fn next_request_id(&self) -> Value {
        Value::from(self.next_id.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Send a server-initiated request; the client's response is discarded by
    /// the read loop.
    pub(crate) async fn send_request<T: Serialize>(&self, method: &str, params: &T) {
        let params = match serde_json::to_value(params) {
            Ok(v) => v,
            Err(err) => {
                warn!("request marshal error: {err}");
                return;
            }
        };
        let req = Request::new(self.next_request_id(), method, params);
        write_message(&self.sink, &req).await;
    }

    /// Request options carrying the configured budget and temperature
    pub(crate) fn llm_request_opts(&self) -> ChatOptions {
        ChatOptions {
            max_tokens: Some(self.options.max_tokens),
            temperature: self.options.coding_temperature,
            ..ChatOptions::default()
        }
    }

    pub(crate) fn inc_sent_counters(&self, bytes: usize) {
        let mut stats = self.stats.lock().expect("stats lock");
        stats.requests += 1;
        stats.sent_bytes += bytes as u64;
    }

    pub(crate) fn inc_recv_counters(&self, bytes: usize) {
        let mut stats = self.stats.lock().expect("stats lock");
        stats.responses += 1;
        stats.recv_bytes += bytes as u64;
    }

    /// Log running averages and per-minute rates for LLM traffic
    pub(crate) fn log_llm_stats(&self) {
        let stats = self.stats.lock().expect("stats lock").clone();
        let avg_sent = stats.sent_bytes.checked_div(stats.requests).unwrap_or(0);
        let avg_recv = stats.recv_bytes.checked_div(stats.responses).unwrap_or(0);
        let mins = self.start_time.elapsed().as_secs_f64().max(0.06) / 60.0;
        debug!(
            reqs = stats.requests,
            avg_sent,
            avg_recv,
            sent_total = stats.sent_bytes,
            recv_total = stats.recv_bytes,
            rpm = stats.requests as f64 / mins,
            sent_per_min = stats.sent_bytes as f64 / mins,
            recv_per_min = stats.recv_bytes as f64 / mins,
            "llm stats"
        );
    }
}

/// Loosely-typed incoming message: requests and notifications carry a method;
/// responses do not and are dropped.
#[derive(serde::Deserialize)]
struct Incoming {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
}
