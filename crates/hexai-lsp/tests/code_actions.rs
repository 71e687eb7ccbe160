//! Integration tests for the two-phase code-action protocol: lazy actions on
//! request, LLM-backed resolution on demand.

use std::sync::Arc;

use async_trait::async_trait;

use hexai_lsp::code_action::{build_diagnostics_code_action, build_rewrite_code_action};
use hexai_lsp::types::{
    CodeActionContext, CodeActionParams, Diagnostic, Position, Range, TextDocumentIdentifier,
};
use hexai_lsp::{MessageSink, Server, ServerOptions};
use hexai_providers::{ChatOptions, LlmClient, Message, ProviderResult};

struct NullSink;

#[async_trait]
impl MessageSink for NullSink {
    async fn send(&self, _body: Vec<u8>) -> hexai_lsp::LspResult<()> {
        Ok(())
    }
}

struct FakeClient {
    response: &'static str,
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn chat(&self, _messages: &[Message], _opts: &ChatOptions) -> ProviderResult<String> {
        Ok(self.response.to_string())
    }

    fn name(&self) -> &str {
        "fake"
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }
}

fn server(response: &'static str) -> Arc<Server> {
    Server::new(
        ServerOptions::default(),
        Some(Arc::new(FakeClient { response })),
        Arc::new(NullSink),
    )
}

fn action_params(uri: &str, range: Range, context: Option<CodeActionContext>) -> CodeActionParams {
    CodeActionParams {
        text_document: TextDocumentIdentifier {
            uri: uri.to_string(),
        },
        range,
        context,
    }
}

#[tokio::test]
async fn rewrite_action_is_lazy_and_resolves_to_single_edit() {
    let server = server("REWRITTEN");
    let range = Range::new(Position::new(1, 2), Position::new(3, 4));
    let p = action_params("file:///t.go", range, None);

    let action = build_rewrite_code_action(&p, ";rewrite;\nold code").expect("expected action");
    assert_eq!(action.title, "Hexai: rewrite selection");
    assert_eq!(action.kind.as_deref(), Some("refactor.rewrite"));
    assert!(action.edit.is_none(), "lazy action carries no edit");
    assert!(action.data.is_some(), "lazy action needs a resolve payload");

    let resolved = server
        .resolve_code_action(action)
        .await
        .expect("resolve should attach an edit");
    let edit = resolved.edit.expect("edit after resolve");
    let edits = &edit.changes["file:///t.go"];
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].range, range);
    assert_eq!(edits[0].new_text, "REWRITTEN");
}

#[tokio::test]
async fn diagnostics_action_resolves_against_overlapping_diagnostics() {
    let server = server("FIXED");
    let selection = Range::new(Position::new(10, 0), Position::new(12, 5));
    let context = CodeActionContext {
        diagnostics: vec![
            Diagnostic {
                range: Range::new(Position::new(11, 0), Position::new(11, 10)),
                message: "inside".to_string(),
                severity: None,
                code: None,
                source: Some("lint".to_string()),
            },
            Diagnostic {
                range: Range::new(Position::new(2, 0), Position::new(3, 0)),
                message: "outside".to_string(),
                severity: None,
                code: None,
                source: None,
            },
        ],
    };
    let p = action_params("file:///t.go", selection, Some(context));

    let action =
        build_diagnostics_code_action(&p, "some selected code").expect("expected quickfix");
    assert_eq!(action.kind.as_deref(), Some("quickfix"));
    assert!(action.edit.is_none());

    let resolved = server
        .resolve_code_action(action)
        .await
        .expect("resolve should attach an edit");
    let edits = &resolved.edit.unwrap().changes["file:///t.go"];
    assert_eq!(edits.len(), 1);
    assert_eq!(edits[0].range, selection);
    assert_eq!(edits[0].new_text, "FIXED");
}

#[tokio::test]
async fn resolve_skips_silently_when_llm_busy() {
    let server = server("IGNORED");
    let p = action_params(
        "file:///t.go",
        Range::new(Position::new(0, 0), Position::new(0, 5)),
        None,
    );
    let action = build_rewrite_code_action(&p, ";rewrite;\ncode").unwrap();

    let _permit = server.llm_gate().try_acquire().expect("gate free");
    assert!(server.resolve_code_action(action).await.is_none());
}

#[tokio::test]
async fn resolve_without_data_returns_unchanged() {
    let server = server("IGNORED");
    let action = hexai_lsp::types::CodeAction {
        title: "no payload".to_string(),
        kind: None,
        edit: None,
        data: None,
    };
    assert!(server.resolve_code_action(action).await.is_none());
}

#[tokio::test]
async fn code_fences_are_stripped_from_resolution() {
    let server = server("```go\nclean()\n```");
    let range = Range::new(Position::new(0, 0), Position::new(1, 0));
    let p = action_params("file:///t.go", range, None);
    let action = build_rewrite_code_action(&p, ";simplify;\nmessy()").unwrap();

    let resolved = server.resolve_code_action(action).await.unwrap();
    let edits = &resolved.edit.unwrap().changes["file:///t.go"];
    assert_eq!(edits[0].new_text, "clean()");
}
