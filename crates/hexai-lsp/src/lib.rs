//! hexai LSP server
//!
//! Mediates between an editor and an LLM chat/completion provider over
//! standard LSP on stdio: AI completions, inline chat replies, and LLM-backed
//! code actions.

pub mod cache;
pub mod chat;
pub mod code_action;
pub mod completion;
pub mod context;
pub mod document;
pub mod markers;
pub mod server;
pub mod text;
pub mod transport;
pub mod types;

pub use cache::CompletionCache;
pub use code_action::CodeActionData;
pub use context::{ContextBuilder, ContextMode};
pub use document::{extract_range, Document, DocumentStore, LineContext};
pub use server::{LlmGate, LlmPermit, Server, ServerOptions};
pub use transport::{FramedWriter, MessageReader, MessageSink};
pub use types::{LspError, LspResult, ServerState};
