//! Completion pipeline
//!
//! Decision order for each `textDocument/completion` request, first match
//! wins: trigger classification, chat-trigger suppression, bare `;;` guard,
//! minimal-prefix heuristic, cache lookup, provider-native completion, chat
//! completion. Every outcome replies with a `CompletionList`; LLM failures
//! degrade to a fallback stub item.

use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, warn};

use hexai_providers::Message;

use crate::cache::{fingerprint, FingerprintInput};
use crate::document::LineContext;
use crate::markers::{
    has_double_semicolon_trigger, is_bare_double_semicolon, line_has_inline_prompt,
    prompt_removal_edits_for_line,
};
use crate::server::Server;
use crate::text::{
    apply_indent, clamp_offset, first_line, leading_indent, preview, strip_code_fences,
    strip_duplicate_assignment_prefix, strip_duplicate_general_prefix, strip_inline_code_span,
    trim_len, word_start,
};
use crate::types::{
    CompletionItem, CompletionList, CompletionParams, Position, Range, TextEdit,
    TRIGGER_KIND_CHARACTER, TRIGGER_KIND_INVOKED,
};

const CHAT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(6);
const NATIVE_COMPLETION_TIMEOUT: Duration = Duration::from_secs(8);

impl Server {
    /// Handle `textDocument/completion`
    pub(crate) async fn handle_completion(&self, id: Option<Value>, params: Value) {
        let mut doc_str = String::new();
        if let Ok(p) = serde_json::from_value::<CompletionParams>(params) {
            let (kind, ch) = trigger_info(&p);
            debug!(
                kind,
                trigger_char = %ch,
                uri = %p.text_document.uri,
                line = p.position.line,
                character = p.position.character,
                "completion trigger"
            );
            let ctx = self.docs.line_context(&p.text_document.uri, p.position);
            doc_str = build_doc_string(&p, &ctx);
            if self.options.log_context {
                debug!(
                    uri = %p.text_document.uri,
                    above = %trim_len(&ctx.above),
                    current = %trim_len(&ctx.current),
                    below = %trim_len(&ctx.below),
                    function = %trim_len(&ctx.function),
                    "completion ctx"
                );
            }
            if self.llm.is_some() {
                let new_func = self
                    .docs
                    .is_defining_new_function(&p.text_document.uri, p.position);
                let extra =
                    self.context
                        .build(&self.docs, &p.text_document.uri, p.position, new_func);
                if let Some(items) = self
                    .try_llm_completion(&p, &ctx, extra.as_deref(), &doc_str)
                    .await
                {
                    self.reply(
                        id,
                        &CompletionList {
                            is_incomplete: false,
                            items,
                        },
                    )
                    .await;
                    return;
                }
            }
        }
        self.reply(
            id,
            &CompletionList {
                is_incomplete: false,
                items: self.fallback_completion_items(&doc_str),
            },
        )
        .await;
    }

    /// Run the decision procedure against the LLM.
    ///
    /// `Some(items)` is a definitive outcome (possibly an empty, suppressed
    /// list); `None` means the LLM attempt failed and the caller should fall
    /// back to the stub item.
    pub async fn try_llm_completion(
        &self,
        p: &CompletionParams,
        ctx: &LineContext,
        extra: Option<&str>,
        doc_str: &str,
    ) -> Option<Vec<CompletionItem>> {
        let llm = self.llm.as_ref()?;
        let current = ctx.current.as_str();
        let cursor = clamp_offset(current, p.position.character as usize);
        let left_of_cursor = &current[..cursor];

        let inline_prompt = line_has_inline_prompt(current);
        if !inline_prompt && !self.is_trigger_event(p, current) {
            debug!(
                line = p.position.line,
                current = %trim_len(current),
                "completion skip=no-trigger"
            );
            return Some(Vec::new());
        }
        if is_chat_trigger_eol(current) {
            debug!(uri = %p.text_document.uri, line = p.position.line, "completion skip=chat-trigger-eol");
            return Some(Vec::new());
        }

        let in_params = in_param_list(current, cursor);
        let manual_invoke = p
            .context
            .as_ref()
            .is_some_and(|c| c.trigger_kind == TRIGGER_KIND_INVOKED);

        if (is_bare_double_semicolon(current) || is_bare_double_semicolon(&ctx.below))
            && !manual_invoke
        {
            debug!(
                line = p.position.line,
                current = %trim_len(current),
                "completion skip=empty-double-semicolon"
            );
            return Some(Vec::new());
        }

        if !in_params && !self.prefix_heuristic_allows(inline_prompt, current, cursor, manual_invoke)
        {
            debug!(
                line = p.position.line,
                current = %trim_len(current),
                "completion skip=short-prefix"
            );
            return Some(Vec::new());
        }

        // Cache fast-path
        let key = fingerprint(FingerprintInput {
            provider: llm.name(),
            model: llm.default_model(),
            temperature: self.options.coding_temperature,
            uri: &p.text_document.uri,
            line: p.position.line,
            above: &ctx.above,
            left_of_cursor,
            right_of_cursor: &current[cursor..],
            below: &ctx.below,
            function: &ctx.function,
            in_params,
            extra_context: extra.unwrap_or(""),
        });
        let cached = self.cache.lock().expect("cache lock").get(&key);
        if let Some(cleaned) = cached.filter(|c| !c.trim().is_empty()) {
            debug!(
                uri = %p.text_document.uri,
                line = p.position.line,
                character = p.position.character,
                preview = %preview(&cleaned, self.options.log_preview_limit),
                "completion cache hit"
            );
            return Some(self.make_completion_items(&cleaned, in_params, current, p, doc_str));
        }

        // Provider-native path
        if let Some(items) = self
            .try_provider_native(p, current, left_of_cursor, in_params, &key, doc_str)
            .await
        {
            return Some(items);
        }

        // Chat path
        let messages = build_completion_messages(inline_prompt, extra, in_params, p, ctx);
        let sent: usize = messages.iter().map(|m| m.content.len()).sum();
        self.inc_sent_counters(sent);
        let opts = self.llm_request_opts();
        debug!(model = llm.default_model(), "completion llm=requesting");

        let Some(_permit) = self.gate.try_acquire() else {
            return Some(vec![self.busy_completion_item()]);
        };
        let text = match timeout(CHAT_COMPLETION_TIMEOUT, llm.chat(&messages, &opts)).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!("llm completion error: {err}");
                self.log_llm_stats();
                return None;
            }
            Err(_) => {
                warn!("llm completion timed out");
                self.log_llm_stats();
                return None;
            }
        };
        self.inc_recv_counters(text.len());
        self.log_llm_stats();

        let cleaned = post_process_completion(text.trim(), left_of_cursor, current);
        if cleaned.is_empty() {
            return None;
        }
        self.cache
            .lock()
            .expect("cache lock")
            .put(key, cleaned.clone());
        Some(self.make_completion_items(&cleaned, in_params, current, p, doc_str))
    }

    /// Attempt the provider's native code-completion capability.
    /// `None` falls through to the chat path.
    async fn try_provider_native(
        &self,
        p: &CompletionParams,
        current: &str,
        left_of_cursor: &str,
        in_params: bool,
        key: &str,
        doc_str: &str,
    ) -> Option<Vec<CompletionItem>> {
        let llm = self.llm.as_ref()?;
        let completer = llm.code_completer()?;

        let (before, after) = self.docs.before_after(&p.text_document.uri, p.position);
        let path = p
            .text_document
            .uri
            .strip_prefix("file://")
            .unwrap_or(&p.text_document.uri);
        let prompt = format!("// Path: {path}\n{before}");
        let temperature = self.options.coding_temperature.unwrap_or(0.0);
        debug!(provider = llm.name(), path, "completion path=native");

        let Some(_permit) = self.gate.try_acquire() else {
            return Some(vec![self.busy_completion_item()]);
        };
        let suggestions = match timeout(
            NATIVE_COMPLETION_TIMEOUT,
            completer.code_completion(&prompt, &after, 1, "", temperature),
        )
        .await
        {
            Ok(Ok(suggestions)) => suggestions,
            Ok(Err(err)) => {
                debug!("completion path=native error={err} (falling back to chat)");
                return None;
            }
            Err(_) => {
                debug!("completion path=native timed out (falling back to chat)");
                return None;
            }
        };

        let first = suggestions.into_iter().next()?;
        let mut cleaned = first.trim().to_string();
        if !cleaned.is_empty() {
            cleaned = strip_duplicate_assignment_prefix(left_of_cursor, &cleaned);
        }
        if !cleaned.is_empty() {
            cleaned = strip_duplicate_general_prefix(left_of_cursor, &cleaned);
        }
        if !cleaned.is_empty() && has_double_semicolon_trigger(current) {
            let indent = leading_indent(current);
            if !indent.is_empty() {
                cleaned = apply_indent(indent, &cleaned);
            }
        }
        if cleaned.trim().is_empty() {
            return None;
        }
        self.cache
            .lock()
            .expect("cache lock")
            .put(key.to_string(), cleaned.clone());
        Some(self.make_completion_items(&cleaned, in_params, current, p, doc_str))
    }

    /// Whether the request qualifies as a completion trigger
    fn is_trigger_event(&self, p: &CompletionParams, current: &str) -> bool {
        if let Some(ctx) = &p.context {
            if ctx.trigger_kind == TRIGGER_KIND_INVOKED {
                return true;
            }
            if ctx.trigger_kind == TRIGGER_KIND_CHARACTER {
                if let Some(ch) = &ctx.trigger_character {
                    if self.options.trigger_characters.iter().any(|t| t == ch) {
                        return true;
                    }
                }
            }
        }
        // a bare ';;' line is never a trigger source by itself
        if is_bare_double_semicolon(current) {
            return false;
        }
        let idx = clamp_offset(current, p.position.character as usize);
        if let Some(last) = current[..idx].chars().next_back() {
            let last = last.to_string();
            if self.options.trigger_characters.iter().any(|t| *t == last) {
                return true;
            }
        }
        false
    }

    /// Minimal-prefix rules, skipped for inline prompts and structural triggers
    fn prefix_heuristic_allows(
        &self,
        inline_prompt: bool,
        current: &str,
        cursor: usize,
        manual_invoke: bool,
    ) -> bool {
        let bytes = current.as_bytes();
        let mut allow_no_prefix = inline_prompt;
        if cursor > 0 {
            if let b'.' | b':' | b'/' | b'_' | b')' = bytes[cursor - 1] {
                allow_no_prefix = true;
            }
        }
        if allow_no_prefix {
            return true;
        }
        // walk left over whitespace to support cursors after trailing spaces
        let mut j = cursor;
        while j > 0 && (bytes[j - 1] == b' ' || bytes[j - 1] == b'\t') {
            j -= 1;
        }
        let start = word_start(current, j);
        let min = if manual_invoke {
            self.options.manual_invoke_min_prefix
        } else {
            1
        };
        j - start >= min
    }

    /// Build the items for a model-derived completion
    pub(crate) fn make_completion_items(
        &self,
        cleaned: &str,
        in_params: bool,
        current: &str,
        p: &CompletionParams,
        doc_str: &str,
    ) -> Vec<CompletionItem> {
        let (text_edit, filter) = compute_text_edit_and_filter(cleaned, in_params, current, p);
        let removal_edits = self.collect_prompt_removal_edits(&p.text_document.uri);
        let detail = match &self.llm {
            Some(llm) => format!("Hexai {}:{}", llm.name(), llm.default_model()),
            None => "Hexai LLM completion".to_string(),
        };
        vec![CompletionItem {
            label: label_for_completion(cleaned, &filter),
            kind: Some(1),
            detail: Some(detail),
            insert_text_format: Some(1),
            filter_text: Some(filter.trim_start_matches([' ', '\t']).to_string()),
            text_edit: Some(text_edit),
            additional_text_edits: removal_edits,
            sort_text: Some("0000".to_string()),
            documentation: Some(doc_str.to_string()),
            ..CompletionItem::default()
        }]
    }

    /// Edits that remove every inline prompt marker in the document
    fn collect_prompt_removal_edits(&self, uri: &str) -> Vec<TextEdit> {
        let Some(doc) = self.docs.get(uri) else {
            return Vec::new();
        };
        doc.lines
            .iter()
            .enumerate()
            .flat_map(|(i, line)| prompt_removal_edits_for_line(line, i as u32))
            .collect()
    }

    /// Item shown when another LLM request is already in flight
    pub(crate) fn busy_completion_item(&self) -> CompletionItem {
        CompletionItem {
            label: "hexai: llm busy, retry shortly".to_string(),
            kind: Some(1),
            detail: Some("Hexai LLM".to_string()),
            sort_text: Some("9999".to_string()),
            ..CompletionItem::default()
        }
    }

    /// Stub item returned when no model-derived completion is available
    pub(crate) fn fallback_completion_items(&self, doc_str: &str) -> Vec<CompletionItem> {
        vec![CompletionItem {
            label: "hexai-complete".to_string(),
            kind: Some(1),
            detail: Some("dummy completion".to_string()),
            insert_text: Some("hexai".to_string()),
            sort_text: Some("9999".to_string()),
            documentation: Some(doc_str.to_string()),
            ..CompletionItem::default()
        }]
    }
}

/// LSP trigger kind/character from the completion context, zeros when absent
fn trigger_info(p: &CompletionParams) -> (u32, String) {
    match &p.context {
        Some(ctx) => (
            ctx.trigger_kind,
            ctx.trigger_character.clone().unwrap_or_default(),
        ),
        None => (0, String::new()),
    }
}

/// Whether a chat trigger pair (`?>`, `!>`, `:>`, `;>`) ends the line
pub(crate) fn is_chat_trigger_eol(current: &str) -> bool {
    let t = current.trim_end_matches([' ', '\t']).as_bytes();
    t.len() >= 2
        && t[t.len() - 1] == b'>'
        && matches!(t[t.len() - 2], b'?' | b'!' | b':' | b';')
}

/// Whether the cursor sits inside the parameter list of a `func` signature
pub(crate) fn in_param_list(current: &str, cursor: usize) -> bool {
    if !current.contains("func ") {
        return false;
    }
    let Some(open) = current.find('(') else {
        return false;
    };
    let close = current.find(')');
    cursor > open && close.map_or(true, |c| cursor <= c)
}

/// Human-readable summary attached to completion items as documentation
fn build_doc_string(p: &CompletionParams, ctx: &LineContext) -> String {
    format!(
        "file: {}\nline: {}\nabove: {}\ncurrent: {}\nbelow: {}\nfunction: {}",
        p.text_document.uri,
        p.position.line,
        trim_len(&ctx.above),
        trim_len(&ctx.current),
        trim_len(&ctx.below),
        trim_len(&ctx.function),
    )
}

/// System and user prompts for the chat completion path
fn build_prompts(in_params: bool, p: &CompletionParams, ctx: &LineContext) -> (String, String) {
    if in_params {
        let sys = "You are a code completion engine for function signatures. Return only the \
                   parameter list contents (without parentheses), no braces, no prose. Prefer \
                   idiomatic names and types."
            .to_string();
        let user = format!(
            "Cursor is inside the function parameter list. Suggest only the parameter list (no parentheses).\nFunction line: {}\nCurrent line (cursor at {}): {}",
            ctx.function, p.position.character, ctx.current
        );
        return (sys, user);
    }
    let sys = "You are a terse code completion engine. Return only the code to insert, no \
               surrounding prose or backticks. Only continue from the cursor; never repeat \
               characters already present to the left of the cursor on the current line (e.g., \
               if 'name :=' is already typed, only return the right-hand side expression)."
        .to_string();
    let user = format!(
        "Provide the next likely code to insert at the cursor.\nFile: {}\nFunction/context: {}\nAbove line: {}\nCurrent line (cursor at character {}): {}\nBelow line: {}\nOnly return the completion snippet.",
        p.text_document.uri, ctx.function, ctx.above, p.position.character, ctx.current, ctx.below
    );
    (sys, user)
}

/// Assemble the chat messages, specializing the system prompt for inline prompts
pub(crate) fn build_completion_messages(
    inline_prompt: bool,
    extra: Option<&str>,
    in_params: bool,
    p: &CompletionParams,
    ctx: &LineContext,
) -> Vec<Message> {
    let (sys, user) = build_prompts(in_params, p, ctx);
    let mut messages = vec![Message::system(sys), Message::user(user)];
    if let Some(extra) = extra.filter(|e| !e.is_empty()) {
        messages.push(Message::user(format!("Additional context:\n{extra}")));
    }
    if inline_prompt {
        messages[0].content = "You are a precise code completion/refactoring engine. Output only \
                               the code to insert with no prose, no comments, and no backticks. \
                               Return raw code only."
            .to_string();
    }
    messages
}

/// Normalize and deduplicate model output, then re-indent for `;;` lines
pub(crate) fn post_process_completion(
    text: &str,
    left_of_cursor: &str,
    current_line: &str,
) -> String {
    let mut cleaned = strip_code_fences(text);
    if !cleaned.is_empty() && cleaned.contains('`') {
        let inline = strip_inline_code_span(&cleaned);
        if !inline.trim().is_empty() {
            cleaned = inline;
        }
    }
    if !cleaned.is_empty() {
        cleaned = strip_duplicate_assignment_prefix(left_of_cursor, &cleaned);
    }
    if !cleaned.is_empty() {
        cleaned = strip_duplicate_general_prefix(left_of_cursor, &cleaned);
    }
    if !cleaned.is_empty() && has_double_semicolon_trigger(current_line) {
        let indent = leading_indent(current_line);
        if !indent.is_empty() {
            cleaned = apply_indent(indent, &cleaned);
        }
    }
    cleaned
}

/// Primary edit range plus the filter text the client matches against
fn compute_text_edit_and_filter(
    cleaned: &str,
    in_params: bool,
    current: &str,
    p: &CompletionParams,
) -> (TextEdit, String) {
    let cursor = clamp_offset(current, p.position.character as usize);
    if in_params {
        if let Some(open) = current.find('(') {
            let left = open + 1;
            let mut right = current.len();
            if let Some(close) = current.find(')').filter(|c| *c >= left) {
                right = close;
            }
            right = right.min(cursor.max(left));
            let edit = TextEdit::replace(
                Range::new(
                    Position::new(p.position.line, left as u32),
                    Position::new(p.position.line, right as u32),
                ),
                cleaned,
            );
            let filter = current
                .get(left..right)
                .unwrap_or("")
                .trim_start_matches([' ', '\t'])
                .to_string();
            return (edit, filter);
        }
    }
    let start = word_start(current, cursor);
    let edit = TextEdit::replace(
        Range::new(
            Position::new(p.position.line, start as u32),
            Position::new(p.position.line, cursor as u32),
        ),
        cleaned,
    );
    let filter = current[start..cursor]
        .trim_start_matches([' ', '\t'])
        .to_string();
    (edit, filter)
}

/// Short readable label for the completion list
fn label_for_completion(cleaned: &str, filter: &str) -> String {
    let label = trim_len(first_line(cleaned));
    if !filter.is_empty() && !label.to_lowercase().starts_with(&filter.to_lowercase()) {
        return filter.to_string();
    }
    label
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TextDocumentIdentifier;

    fn params_at(line: &str, character: usize) -> CompletionParams {
        CompletionParams {
            text_document: TextDocumentIdentifier {
                uri: "file:///t.go".to_string(),
            },
            position: Position::new(0, character as u32),
            context: None,
        }
    }

    #[test]
    fn test_chat_trigger_eol_detection() {
        for line in ["What now?>", "Explain!>", "Refactor:>", "note ;>", "x?>  "] {
            assert!(is_chat_trigger_eol(line), "{line}");
        }
        for line in ["plain", "a > b", "end>", ""] {
            assert!(!is_chat_trigger_eol(line), "{line}");
        }
    }

    #[test]
    fn test_in_param_list() {
        assert!(in_param_list("func add(", 9));
        assert!(in_param_list("func add(a int)", 10));
        assert!(in_param_list("func add(a int)", 15));
        assert!(!in_param_list("func add(a int)", 9 - 1));
        assert!(!in_param_list("add(", 4));
        assert!(!in_param_list("func add", 8));
    }

    #[test]
    fn test_in_param_completion_edit_spans_cursor() {
        let line = "func add(";
        let p = params_at(line, 9);
        let (edit, filter) = compute_text_edit_and_filter("a int, b int", true, line, &p);
        assert_eq!(edit.range.start, Position::new(0, 9));
        assert_eq!(edit.range.end, Position::new(0, 9));
        assert_eq!(edit.new_text, "a int, b int");
        assert_eq!(filter, "");
    }

    #[test]
    fn test_word_edit_replaces_current_word() {
        let line = "foo.ba";
        let p = params_at(line, 6);
        let (edit, filter) = compute_text_edit_and_filter("bar()", false, line, &p);
        assert_eq!(edit.range.start, Position::new(0, 4));
        assert_eq!(edit.range.end, Position::new(0, 6));
        assert_eq!(filter, "ba");
    }

    #[test]
    fn test_post_process_strips_fences_and_prefixes() {
        let out = post_process_completion("```go\nx := 1\n```", "x := ", "x := ");
        assert_eq!(out, "1");
    }

    #[test]
    fn test_post_process_inline_span() {
        let out = post_process_completion("Use `sum(a, b)` instead", "", "let s = ");
        assert_eq!(out, "sum(a, b)");
    }

    #[test]
    fn test_post_process_indents_double_semicolon_suggestion() {
        let out = post_process_completion("a()\nb()", "", "    ;;wrap in retries;");
        assert_eq!(out, "    a()\n    b()");
    }

    #[test]
    fn test_label_falls_back_to_filter() {
        assert_eq!(label_for_completion("something else", "pre"), "pre");
        assert_eq!(label_for_completion("prefix()", "pre"), "prefix()");
    }

    #[test]
    fn test_completion_messages_inline_prompt_overrides_system() {
        let ctx = LineContext {
            current: "x ;do it; y".to_string(),
            ..LineContext::default()
        };
        let p = params_at("x ;do it; y", 2);
        let msgs = build_completion_messages(true, None, false, &p, &ctx);
        assert!(msgs[0].content.contains("raw code only"));
        let msgs = build_completion_messages(false, Some("ctx"), false, &p, &ctx);
        assert_eq!(msgs.len(), 3);
        assert!(msgs[2].content.starts_with("Additional context:"));
    }
}
