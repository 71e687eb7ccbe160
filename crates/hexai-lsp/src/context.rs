//! Additional prompt context derived from the cursor position

use tracing::debug;

use crate::document::DocumentStore;
use crate::types::Position;

/// How much surrounding file content accompanies a completion prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextMode {
    /// No extra context
    Minimal,
    /// A symmetric window of lines around the cursor
    Window,
    /// Full file only when the cursor is defining a new function
    FileOnNewFunc,
    /// Full file on every request
    #[default]
    AlwaysFull,
}

impl ContextMode {
    /// Parse the config-file spelling; unknown values fall back to `Minimal`
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "minimal" => ContextMode::Minimal,
            "window" => ContextMode::Window,
            "file-on-new-func" => ContextMode::FileOnNewFunc,
            "always-full" => ContextMode::AlwaysFull,
            _ => ContextMode::Minimal,
        }
    }
}

/// Builds the optional "additional context" string appended to prompts
pub struct ContextBuilder {
    pub mode: ContextMode,
    pub window_lines: usize,
    pub max_context_tokens: usize,
}

impl ContextBuilder {
    /// Extra context for the cursor, or `None` when the mode yields nothing
    pub fn build(
        &self,
        docs: &DocumentStore,
        uri: &str,
        pos: Position,
        is_new_function: bool,
    ) -> Option<String> {
        match self.mode {
            ContextMode::Minimal => None,
            ContextMode::Window => Some(self.window_context(docs, uri, pos)),
            ContextMode::FileOnNewFunc => {
                if is_new_function {
                    Some(self.full_file_context(docs, uri))
                } else {
                    None
                }
            }
            ContextMode::AlwaysFull => Some(self.full_file_context(docs, uri)),
        }
    }

    fn window_context(&self, docs: &DocumentStore, uri: &str, pos: Position) -> String {
        let Some(doc) = docs.get(uri) else {
            debug!("context: window requested but document not open uri={uri}");
            return String::new();
        };
        let n = doc.lines.len();
        let half = self.window_lines / 2;
        let start = (pos.line as usize).saturating_sub(half);
        let end = ((pos.line as usize) + half + 1).min(n);
        if start >= end {
            return String::new();
        }
        truncate_to_approx_tokens(&doc.lines[start..end].join("\n"), self.max_context_tokens)
    }

    fn full_file_context(&self, docs: &DocumentStore, uri: &str) -> String {
        let Some(doc) = docs.get(uri) else {
            debug!("context: full file requested but document not open uri={uri}");
            return String::new();
        };
        truncate_to_approx_tokens(&doc.text, self.max_context_tokens)
    }
}

/// Truncate text to roughly `max_tokens` using the 4 chars/token heuristic,
/// preferring to cut on a line boundary at or before the budget.
pub fn truncate_to_approx_tokens(text: &str, max_tokens: usize) -> String {
    if max_tokens == 0 {
        return String::new();
    }
    let max_chars = max_tokens * 4;
    if text.len() <= max_chars {
        return text.to_string();
    }
    let mut cut = max_chars.min(text.len());
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    if let Some(nl) = text[..cut].rfind('\n') {
        if nl > 0 {
            cut = nl;
        }
    }
    text[..cut].to_string()
}
