//! Code actions
//!
//! `textDocument/codeAction` returns lazy actions only: a rewrite action when
//! the selection carries an instruction marker, and a quickfix when client
//! diagnostics overlap the selection. The `data` payload carries everything
//! needed to complete the action later; `codeAction/resolve` runs the LLM and
//! attaches a single replacement edit over the original selection.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, warn};

use hexai_providers::Message;

use crate::document::extract_range;
use crate::markers::instruction_from_selection;
use crate::server::Server;
use crate::text::strip_code_fences;
use crate::types::{
    CodeAction, CodeActionContext, CodeActionParams, Diagnostic, Range, TextEdit, WorkspaceEdit,
};

const REWRITE_TIMEOUT: Duration = Duration::from_secs(10);
const DIAGNOSTICS_TIMEOUT: Duration = Duration::from_secs(12);

/// Resolution payload stashed in a lazy action's `data` field
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CodeActionData {
    /// Rewrite the selection per an inline instruction marker
    Rewrite {
        uri: String,
        range: Range,
        instruction: String,
        /// Selection with the instruction marker removed
        selection: String,
    },
    /// Fix the diagnostics overlapping the selection
    Diagnostics {
        uri: String,
        range: Range,
        selection: String,
        diagnostics: Vec<Diagnostic>,
    },
}

impl Server {
    /// Handle `textDocument/codeAction`
    pub(crate) async fn handle_code_action(&self, id: Option<Value>, params: Value) {
        let empty: Vec<CodeAction> = Vec::new();
        let Ok(p) = serde_json::from_value::<CodeActionParams>(params) else {
            self.reply(id, &empty).await;
            return;
        };
        let doc = self.docs.get(&p.text_document.uri);
        let Some(doc) = doc.filter(|d| !d.lines.is_empty()) else {
            self.reply(id, &empty).await;
            return;
        };
        if self.llm.is_none() {
            self.reply(id, &empty).await;
            return;
        }
        let selection = extract_range(&doc, p.range);
        if selection.trim().is_empty() {
            self.reply(id, &empty).await;
            return;
        }

        let mut actions = Vec::with_capacity(2);
        if let Some(action) = build_rewrite_code_action(&p, &selection) {
            actions.push(action);
        }
        if let Some(action) = build_diagnostics_code_action(&p, &selection) {
            actions.push(action);
        }
        self.reply(id, &actions).await;
    }

    /// Handle `codeAction/resolve`
    pub(crate) async fn handle_code_action_resolve(&self, id: Option<Value>, params: Value) {
        let Ok(action) = serde_json::from_value::<CodeAction>(params) else {
            self.reply(id, &Value::Null).await;
            return;
        };
        match self.resolve_code_action(action.clone()).await {
            Some(resolved) => self.reply(id, &resolved).await,
            None => self.reply(id, &action).await,
        }
    }

    /// Complete a lazy action by asking the LLM for the replacement text.
    /// Returns `None` (action unchanged) on missing data, busy gate, or any
    /// LLM failure.
    pub async fn resolve_code_action(&self, mut action: CodeAction) -> Option<CodeAction> {
        let llm = self.llm.as_ref()?;
        let data = action.data.clone()?;
        let payload: CodeActionData = serde_json::from_value(data).ok()?;
        let Some(_permit) = self.gate.try_acquire() else {
            debug!("codeAction resolve skipped: llm busy");
            return None;
        };

        let (uri, range, messages, deadline) = match payload {
            CodeActionData::Rewrite {
                uri,
                range,
                instruction,
                selection,
            } => {
                let sys = "You are a precise code refactoring engine. Rewrite the given code \
                           strictly according to the instruction. Return only the updated code \
                           with no prose or backticks. Preserve formatting where reasonable.";
                let user =
                    format!("Instruction: {instruction}\n\nSelected code to transform:\n{selection}");
                (
                    uri,
                    range,
                    vec![Message::system(sys), Message::user(user)],
                    REWRITE_TIMEOUT,
                )
            }
            CodeActionData::Diagnostics {
                uri,
                range,
                selection,
                diagnostics,
            } => {
                let sys = "You are a precise code fixer. Resolve the given diagnostics by editing \
                           only the selected code. Return only the corrected code with no prose \
                           or backticks. Keep behavior and style, and avoid unrelated changes.";
                let mut user = String::from("Diagnostics to resolve (selection only):\n");
                for (i, d) in diagnostics.iter().enumerate() {
                    match d.source.as_deref().filter(|s| !s.is_empty()) {
                        Some(source) => {
                            user.push_str(&format!("{}. [{}] {}\n", i + 1, source, d.message))
                        }
                        None => user.push_str(&format!("{}. {}\n", i + 1, d.message)),
                    }
                }
                user.push_str("\nSelected code:\n");
                user.push_str(&selection);
                (
                    uri,
                    range,
                    vec![Message::system(sys), Message::user(user)],
                    DIAGNOSTICS_TIMEOUT,
                )
            }
        };

        let opts = self.llm_request_opts();
        let text = match timeout(deadline, llm.chat(&messages, &opts)).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                warn!("codeAction llm error: {err}");
                return None;
            }
            Err(_) => {
                warn!("codeAction llm timed out");
                return None;
            }
        };
        let out = strip_code_fences(text.trim());
        if out.is_empty() {
            return None;
        }
        action.edit = Some(WorkspaceEdit::single(
            uri,
            vec![TextEdit::replace(range, out)],
        ));
        Some(action)
    }
}

/// Lazy rewrite action when the selection carries an instruction marker
pub fn build_rewrite_code_action(p: &CodeActionParams, selection: &str) -> Option<CodeAction> {
    let (instruction, cleaned) = instruction_from_selection(selection)?;
    let data = CodeActionData::Rewrite {
        uri: p.text_document.uri.clone(),
        range: p.range,
        instruction,
        selection: cleaned,
    };
    Some(CodeAction {
        title: "Hexai: rewrite selection".to_string(),
        kind: Some("refactor.rewrite".to_string()),
        edit: None,
        data: serde_json::to_value(data).ok(),
    })
}

/// Lazy quickfix action when diagnostics overlap the selection
pub fn build_diagnostics_code_action(p: &CodeActionParams, selection: &str) -> Option<CodeAction> {
    let diagnostics = diagnostics_in_range(p.context.as_ref(), p.range);
    if diagnostics.is_empty() {
        return None;
    }
    let data = CodeActionData::Diagnostics {
        uri: p.text_document.uri.clone(),
        range: p.range,
        selection: selection.to_string(),
        diagnostics,
    };
    Some(CodeAction {
        title: "Hexai: resolve diagnostics".to_string(),
        kind: Some("quickfix".to_string()),
        edit: None,
        data: serde_json::to_value(data).ok(),
    })
}

/// Diagnostics from the client context that overlap the selection range
pub fn diagnostics_in_range(context: Option<&CodeActionContext>, selection: Range) -> Vec<Diagnostic> {
    let Some(context) = context else {
        return Vec::new();
    };
    context
        .diagnostics
        .iter()
        .filter(|d| d.range.overlaps(selection))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Position, TextDocumentIdentifier};

    fn params(range: Range, context: Option<CodeActionContext>) -> CodeActionParams {
        CodeActionParams {
            text_document: TextDocumentIdentifier {
                uri: "file:///t.go".to_string(),
            },
            range,
            context,
        }
    }

    fn diag(range: Range, message: &str) -> Diagnostic {
        Diagnostic {
            range,
            message: message.to_string(),
            severity: None,
            code: None,
            source: None,
        }
    }

    #[test]
    fn test_rewrite_action_is_lazy_with_payload() {
        let p = params(
            Range::new(Position::new(1, 2), Position::new(3, 4)),
            None,
        );
        let action = build_rewrite_code_action(&p, ";rewrite;\nold code").unwrap();
        assert_eq!(action.title, "Hexai: rewrite selection");
        assert_eq!(action.kind.as_deref(), Some("refactor.rewrite"));
        assert!(action.edit.is_none());
        let data: CodeActionData = serde_json::from_value(action.data.unwrap()).unwrap();
        match data {
            CodeActionData::Rewrite {
                instruction,
                selection,
                ..
            } => {
                assert_eq!(instruction, "rewrite");
                assert_eq!(selection, "\nold code");
            }
            _ => panic!("expected rewrite payload"),
        }
    }

    #[test]
    fn test_rewrite_action_absent_without_instruction() {
        let p = params(Range::default(), None);
        assert!(build_rewrite_code_action(&p, "no instruction here").is_none());
    }

    #[test]
    fn test_diagnostics_action_filters_to_overlapping() {
        let selection = Range::new(Position::new(10, 0), Position::new(12, 5));
        let ctx = CodeActionContext {
            diagnostics: vec![
                diag(
                    Range::new(Position::new(11, 0), Position::new(11, 10)),
                    "inside",
                ),
                diag(
                    Range::new(Position::new(2, 0), Position::new(3, 0)),
                    "outside",
                ),
                diag(
                    Range::new(Position::new(12, 5), Position::new(12, 8)),
                    "touching",
                ),
            ],
        };
        let p = params(selection, Some(ctx));
        let action = build_diagnostics_code_action(&p, "some selected code").unwrap();
        assert_eq!(action.kind.as_deref(), Some("quickfix"));
        assert!(action.edit.is_none());
        let data: CodeActionData = serde_json::from_value(action.data.unwrap()).unwrap();
        match data {
            CodeActionData::Diagnostics { diagnostics, .. } => {
                let messages: Vec<_> = diagnostics.iter().map(|d| d.message.as_str()).collect();
                assert_eq!(messages, vec!["inside", "touching"]);
            }
            _ => panic!("expected diagnostics payload"),
        }
    }

    #[test]
    fn test_diagnostics_action_absent_without_context() {
        let p = params(Range::default(), None);
        assert!(build_diagnostics_code_action(&p, "sel").is_none());
    }
}
