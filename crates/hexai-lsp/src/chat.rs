//! In-editor chat
//!
//! A line ending in `?>`, `!>`, `:>`, or `;>` (ignoring trailing whitespace)
//! asks for a reply inline. The detector runs after every `didChange`, handles
//! at most one trigger per change, and answers through a server-initiated
//! `workspace/applyEdit`: delete the trailing `>`, then insert the reply below
//! as a `> `-prefixed block framed by blank lines.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use hexai_providers::Message;

use crate::server::Server;
use crate::text::strip_code_fences;
use crate::types::{ApplyWorkspaceEditParams, Position, Range, TextEdit, WorkspaceEdit};

const CHAT_TIMEOUT: Duration = Duration::from_secs(15);

/// Maximum number of prior question/answer pairs carried into the prompt
const MAX_HISTORY_PAIRS: usize = 3;

impl Server {
    /// Scan the document for a chat trigger line and spawn a background reply
    /// task for the first one found. Returns the task handle, if any.
    pub(crate) fn detect_and_handle_chat(self: &Arc<Self>, uri: &str) -> Option<JoinHandle<()>> {
        self.llm.as_ref()?;
        let doc = self.docs.get(uri)?;

        for (i, raw) in doc.lines.iter().enumerate() {
            let bytes = raw.as_bytes();
            let mut j = raw.len();
            while j > 0 && (bytes[j - 1] == b' ' || bytes[j - 1] == b'\t') {
                j -= 1;
            }
            if j < 2 {
                continue; // need at least two chars
            }
            let last = j - 1;
            if !matches!(
                [bytes[last - 1], bytes[last]],
                [b'?', b'>'] | [b'!', b'>'] | [b':', b'>'] | [b';', b'>']
            ) {
                continue;
            }
            // already answered: the next non-blank line starts with '>'
            let mut k = i + 1;
            while k < doc.lines.len() && doc.lines[k].trim().is_empty() {
                k += 1;
            }
            if k < doc.lines.len() && doc.lines[k].trim().starts_with('>') {
                continue;
            }
            // derive the prompt by removing only the trailing '>'
            let remove_count = 1;
            let prompt = raw[..last + 1 - remove_count].trim().to_string();
            if prompt.is_empty() {
                continue;
            }

            let server = Arc::clone(self);
            let uri = uri.to_string();
            let handle = tokio::spawn(async move {
                server
                    .run_chat_reply(&uri, i, last, remove_count, prompt)
                    .await;
            });
            // only one trigger per change tick to avoid flooding
            return Some(handle);
        }
        None
    }

    async fn run_chat_reply(
        &self,
        uri: &str,
        line_idx: usize,
        last_non_space: usize,
        remove_count: usize,
        prompt: String,
    ) {
        let Some(llm) = &self.llm else {
            return;
        };
        let Some(_permit) = self.gate.try_acquire() else {
            debug!("chat skipped: llm busy");
            return;
        };

        let mut messages = vec![Message::system(
            "You are a helpful coding assistant. Answer concisely and clearly.",
        )];
        messages.extend(self.build_chat_history(uri, line_idx, &prompt));
        let opts = self.llm_request_opts();
        debug!(model = llm.default_model(), "chat llm=requesting");

        let text = match timeout(CHAT_TIMEOUT, llm.chat(&messages, &opts)).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!("chat llm error: {err}");
                return;
            }
            Err(_) => {
                warn!("chat llm timed out");
                return;
            }
        };
        let out = strip_code_fences(text.trim());
        let out = out.trim();
        if out.is_empty() {
            return;
        }
        self.apply_chat_edits(uri, line_idx, last_non_space, remove_count, &format!("> {out}"))
            .await;
    }

    /// Delete the trigger punctuation and insert the reply at end-of-line so
    /// exactly one blank line precedes and follows it
    async fn apply_chat_edits(
        &self,
        uri: &str,
        line_idx: usize,
        last_non_space: usize,
        remove_count: usize,
        response: &str,
    ) {
        let Some(doc) = self.docs.get(uri) else {
            return;
        };
        let line = line_idx as u32;
        let delete = TextEdit::delete(Range::new(
            Position::new(line, (last_non_space + 1 - remove_count) as u32),
            Position::new(line, (last_non_space + 1) as u32),
        ));
        let line_len = doc.lines.get(line_idx).map_or(0, |l| l.len()) as u32;
        let insert_at = Position::new(line, line_len);
        let body = format!("{}\n", response.trim_end_matches('\n'));
        let insert = TextEdit::replace(Range::new(insert_at, insert_at), format!("\n\n{body}\n"));

        let edit = WorkspaceEdit::single(uri, vec![delete, insert]);
        self.send_request(
            "workspace/applyEdit",
            &ApplyWorkspaceEditParams {
                label: Some("Hexai: insert chat response".to_string()),
                edit,
            },
        )
        .await;
    }

    /// Walk upward from the trigger line collecting recent Q/A pairs from the
    /// in-editor transcript, chronological order, ending with the new prompt
    pub(crate) fn build_chat_history(
        &self,
        uri: &str,
        line_idx: usize,
        current_prompt: &str,
    ) -> Vec<Message> {
        let Some(doc) = self.docs.get(uri) else {
            return vec![Message::user(current_prompt)];
        };
        let lines = &doc.lines;
        let mut pairs: Vec<(String, String)> = Vec::new();
        let mut i = line_idx as isize - 1;

        while i >= 0 && pairs.len() < MAX_HISTORY_PAIRS {
            while i >= 0 && lines[i as usize].trim().is_empty() {
                i -= 1;
            }
            if i < 0 || !lines[i as usize].trim().starts_with('>') {
                break;
            }
            // collect the reply block bottom-up
            let mut reply_lines: Vec<String> = Vec::new();
            while i >= 0 {
                let line = lines[i as usize].trim();
                if let Some(rest) = line.strip_prefix('>') {
                    reply_lines.insert(0, rest.trim().to_string());
                    i -= 1;
                } else {
                    break;
                }
            }
            while i >= 0 && lines[i as usize].trim().is_empty() {
                i -= 1;
            }
            if i < 0 {
                break;
            }
            let question = strip_trailing_trigger(lines[i as usize].trim());
            pairs.insert(0, (question, reply_lines.join("\n")));
            i -= 1;
        }

        let mut messages = Vec::with_capacity(pairs.len() * 2 + 1);
        for (question, answer) in pairs {
            if !question.trim().is_empty() {
                messages.push(Message::user(question));
            }
            if !answer.trim().is_empty() {
                messages.push(Message::assistant(answer));
            }
        }
        messages.push(Message::user(current_prompt));
        messages
    }
}

/// Remove the trailing chat-trigger punctuation from a transcript question
fn strip_trailing_trigger(s: &str) -> String {
    let t = s.trim_end_matches([' ', '\t']);
    let bytes = t.as_bytes();
    if t.len() >= 2 && bytes[t.len() - 1] == b'>' {
        if matches!(bytes[t.len() - 2], b'?' | b'!' | b':' | b';') {
            return t[..t.len() - 1].trim_end_matches([' ', '\t']).to_string();
        }
    }
    // legacy forms kept for history built before the '>' triggers
    if let Some(base) = t.strip_suffix(";;") {
        return base.trim_end_matches([' ', '\t']).to_string();
    }
    if t.is_empty() {
        return s.to_string();
    }
    match bytes[t.len() - 1] {
        b'?' | b'!' | b':' => t[..t.len() - 1].trim_end_matches([' ', '\t']).to_string(),
        _ => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_trailing_trigger() {
        assert_eq!(strip_trailing_trigger("How do I sort?>"), "How do I sort");
        assert_eq!(strip_trailing_trigger("Explain!> "), "Explain");
        assert_eq!(strip_trailing_trigger("note ;>"), "note");
        assert_eq!(strip_trailing_trigger("legacy;;"), "legacy");
        assert_eq!(strip_trailing_trigger("why?"), "why");
        assert_eq!(strip_trailing_trigger("plain"), "plain");
    }
}
