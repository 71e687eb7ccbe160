//! hexai entrypoint

use std::io::{IsTerminal, Read};

use clap::Parser;

#[derive(Parser)]
#[command(name = "hexai", version, about = "Pipe text through the hexai LLM")]
struct Args {
    /// Prompt text; combined with piped stdin when both are present
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    // read stdin only when piped
    let mut stdin_data = String::new();
    if !std::io::stdin().is_terminal() {
        let _ = std::io::stdin().read_to_string(&mut stdin_data);
    }

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
    let client = match hexai_providers::new_from_config(&provider_cfg, &openai_key, &copilot_key) {
        Ok(client) => client,
        Err(err) => {
            eprintln!("hexai: LLM disabled: {err}");
            std::process::exit(1);
        }
    };

    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    if let Err(err) = hexai_cli::run_with_client(
        client,
        &args.prompt,
        &stdin_data,
        &mut stdout,
        &mut stderr,
    )
    .await
    {
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}
