//! hexai-lsp entrypoint
//!
//! stdout carries the protocol, so logs go to a file.

use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tracing::info;

use hexai_lsp::{FramedWriter, MessageSink, Server, ServerOptions, ServerState};

#[derive(Parser)]
#[command(name = "hexai-lsp", version, about = "LLM-backed LSP server")]
struct Args {
    /// Path to the log file
    #[arg(long, default_value = "/tmp/hexai-lsp.log")]
    log: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&args.log)
        .with_context(|| format!("cannot open log file {}", args.log))?;
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(log_file))
        .with_ansi(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let cfg = hexai_config::load();
    let provider_cfg = hexai_providers::ProviderConfig {
        provider: cfg.provider.clone(),
        openai_base_url: non_empty(&cfg.openai_base_url),
        openai_model: non_empty(&cfg.openai_model),
        ollama_base_url: non_empty(&cfg.ollama_base_url),
        ollama_model: non_empty(&cfg.ollama_model),
        ollama_temperature: cfg.ollama_temperature,
        copilot_base_url: non_empty(&cfg.copilot_base_url),
        copilot_model: non_empty(&cfg.copilot_model),
        copilot_temperature: cfg.copilot_temperature,
    };
    let openai_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
    let copilot_key = std::env::var("COPILOT_API_KEY").unwrap_or_default();
    let llm = match hexai_providers::new_from_config(&provider_cfg, &openai_key, &copilot_key) {
        Ok(client) => {
            info!(provider = client.name(), model = client.default_model(), "llm enabled");
            Some(client)
        }
        Err(err) => {
            info!("llm disabled: {err}");
            None
        }
    };

    let sink: Arc<dyn MessageSink> = Arc::new(FramedWriter::new(tokio::io::stdout()));
    let server = Server::new(ServerOptions::from(&cfg), llm, sink);
    info!("hexai-lsp starting");

    server.run(tokio::io::stdin()).await?;

    // exit without a preceding shutdown is an abnormal termination
    if server.state() == ServerState::Exited && !server.exited_cleanly() {
        std::process::exit(1);
    }
    Ok(())
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}
