//! hexai CLI runner
//!
//! Reads input from stdin and/or the command line, sends it through the
//! configured LLM, and prints the reply to stdout with a short summary on
//! stderr. Streaming providers print incrementally.

use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use hexai_providers::{ChatOptions, LlmClient, Message};

/// CLI error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Nothing to send
    #[error("hexai: no input provided; pass text as an argument or via stdin")]
    NoInput,

    /// Provider construction or chat failure
    #[error("hexai: {0}")]
    Provider(#[from] hexai_providers::ProviderError),

    /// Output could not be written
    #[error("hexai: io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

/// Combine piped stdin and argv into a single prompt.
/// With both present, the arguments become a heading over the piped text.
pub fn combine_input(stdin_data: &str, args: &[String]) -> CliResult<String> {
    let stdin_data = stdin_data.trim();
    let arg_data = args.join(" ").trim().to_string();
    match (stdin_data.is_empty(), arg_data.is_empty()) {
        (false, false) => Ok(format!("{arg_data}:\n\n{stdin_data}")),
        (false, true) => Ok(stdin_data.to_string()),
        (true, false) => Ok(arg_data),
        (true, true) => Err(CliError::NoInput),
    }
}

/// System and user messages for the prompt; the word "explain" switches the
/// reply style from terse commands to a verbose explanation
pub fn build_messages(input: &str) -> Vec<Message> {
    let system = if input.to_lowercase().contains("explain") {
        "You are Hexai CLI. The user requested an explanation. Provide a clear, verbose \
         explanation with reasoning and details. If commands are needed, include them with \
         brief context."
    } else {
        "You are Hexai CLI. Default to very short, concise answers. If the user asks for \
         commands, output only the commands (one per line) with no commentary or explanation. \
         Only when the word 'explain' appears in the prompt, produce a verbose explanation."
    };
    vec![Message::system(system), Message::user(input)]
}

/// Run the chat and print the reply, streaming when the provider supports it
pub async fn run_with_client(
    client: Arc<dyn LlmClient>,
    args: &[String],
    stdin_data: &str,
    stdout: &mut (dyn Write + Send),
    stderr: &mut (dyn Write + Send),
) -> CliResult<()> {
    let input = combine_input(stdin_data, args)?;
    writeln!(stderr, "hexai: {}:{}", client.name(), client.default_model())?;

    let messages = build_messages(&input);
    let opts = ChatOptions::default();
    let start = Instant::now();

    let output = if let Some(streamer) = client.streamer() {
        let mut collected = String::new();
        // stream deltas straight through; the summary needs the total size
        {
            let mut on_delta = |chunk: &str| {
                collected.push_str(chunk);
                let _ = stdout.write_all(chunk.as_bytes());
                let _ = stdout.flush();
            };
            streamer.chat_stream(&messages, &opts, &mut on_delta).await?;
        }
        collected
    } else {
        let text = client.chat(&messages, &opts).await?;
        stdout.write_all(text.as_bytes())?;
        text
    };
    if !output.ends_with('\n') {
        writeln!(stdout)?;
    }
    writeln!(
        stderr,
        "hexai: {} chars in {:.1}s",
        output.len(),
        start.elapsed().as_secs_f64()
    )?;
    Ok(())
}
