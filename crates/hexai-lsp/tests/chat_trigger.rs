//! Integration tests for the in-editor chat detector: trigger scan on
//! didChange and the resulting server-initiated workspace/applyEdit.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use hexai_lsp::{MessageSink, Server, ServerOptions};
use hexai_providers::{ChatOptions, LlmClient, Message, ProviderResult};

/// Sink that records every outbound message for inspection
#[derive(Default)]
struct CapturingSink {
    sent: Mutex<Vec<Value>>,
}

impl CapturingSink {
    fn messages(&self) -> Vec<Value> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSink for CapturingSink {
    async fn send(&self, body: Vec<u8>) -> hexai_lsp::LspResult<()> {
        let value: Value = serde_json::from_slice(&body).unwrap();
        self.sent.lock().unwrap().push(value);
        Ok(())
    }
}

/// Chat client that records the messages it was asked with
struct RecordingClient {
    response: &'static str,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl RecordingClient {
    fn new(response: &'static str) -> Arc<Self> {
        Arc::new(Self {
            response,
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LlmClient for RecordingClient {
    async fn chat(&self, messages: &[Message], _opts: &ChatOptions) -> ProviderResult<String> {
        self.seen.lock().unwrap().push(messages.to_vec());
        Ok(self.response.to_string())
    }

    fn name(&self) -> &str {
        "fake"
    }

    fn default_model(&self) -> &str {
        "fake-model"
    }
}

fn setup(response: &'static str) -> (Arc<Server>, Arc<CapturingSink>, Arc<RecordingClient>) {
    let sink = Arc::new(CapturingSink::default());
    let client = RecordingClient::new(response);
    let server = Server::new(
        ServerOptions::default(),
        Some(client.clone()),
        sink.clone(),
    );
    (server, sink, client)
}

fn did_change(uri: &str, text: &str) -> Value {
    serde_json::json!({
        "textDocument": {"uri": uri},
        "contentChanges": [{"text": text}]
    })
}

#[tokio::test]
async fn chat_trigger_produces_apply_edit_with_delete_and_insert() {
    let (server, sink, _client) = setup("Use sort(a)");

    let handle = server
        .handle_did_change(did_change("file:///doc.md", "How do I sort?>\n"))
        .expect("chat task should spawn");
    handle.await.unwrap();

    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    let req = &messages[0];
    assert_eq!(req["method"], "workspace/applyEdit");
    assert!(req["id"].is_number(), "server-initiated request has an id");

    let edits = &req["params"]["edit"]["changes"]["file:///doc.md"];
    assert_eq!(edits.as_array().unwrap().len(), 2);
    // delete the trailing '>'
    assert_eq!(edits[0]["range"]["start"]["line"], 0);
    assert_eq!(edits[0]["range"]["start"]["character"], 14);
    assert_eq!(edits[0]["range"]["end"]["character"], 15);
    assert_eq!(edits[0]["newText"], "");
    // insert the reply framed by blank lines
    assert_eq!(edits[1]["range"]["start"]["character"], 15);
    assert_eq!(edits[1]["newText"], "\n\n> Use sort(a)\n\n");
}

#[tokio::test]
async fn answered_trigger_is_not_answered_again() {
    let (server, sink, _client) = setup("IGNORED");
    let text = "How do I sort?>\n\n> Use sort(a)\n";
    assert!(server
        .handle_did_change(did_change("file:///doc.md", text))
        .is_none());
    assert!(sink.messages().is_empty());
}

#[tokio::test]
async fn empty_llm_reply_leaves_document_untouched() {
    let (server, sink, _client) = setup("   ");
    let handle = server
        .handle_did_change(did_change("file:///doc.md", "Anything here?>"))
        .expect("task spawns");
    handle.await.unwrap();
    assert!(sink.messages().is_empty());
}

#[tokio::test]
async fn history_walk_collects_prior_pairs_in_order() {
    let (server, _sink, client) = setup("Second answer");
    let text = "\
First question?

> first answer line
> continued

Second question?>\n";
    let handle = server
        .handle_did_change(did_change("file:///doc.md", text))
        .expect("task spawns");
    handle.await.unwrap();

    let seen = client.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let messages = &seen[0];
    // system, prior user, prior assistant, current user
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0].role, "system");
    assert_eq!(messages[1].role, "user");
    assert_eq!(messages[1].content, "First question");
    assert_eq!(messages[2].role, "assistant");
    assert_eq!(messages[2].content, "first answer line\ncontinued");
    // the current prompt loses only the trailing '>'
    assert_eq!(messages[3].role, "user");
    assert_eq!(messages[3].content, "Second question?");
}

#[tokio::test]
async fn only_first_trigger_per_change_is_handled() {
    let (server, sink, client) = setup("answer");
    let text = "first?>\nsecond?>\n";
    let handle = server
        .handle_did_change(did_change("file:///doc.md", text))
        .expect("task spawns");
    handle.await.unwrap();

    assert_eq!(client.seen.lock().unwrap().len(), 1);
    let messages = sink.messages();
    assert_eq!(messages.len(), 1);
    let edits = &messages[0]["params"]["edit"]["changes"]["file:///doc.md"];
    assert_eq!(edits[0]["range"]["start"]["line"], 0);
}

#[tokio::test]
async fn chat_skipped_when_llm_busy() {
    let (server, sink, client) = setup("IGNORED");
    let _permit = server.llm_gate().try_acquire().expect("gate free");
    let handle = server
        .handle_did_change(did_change("file:///doc.md", "Anything?>"))
        .expect("task still spawns");
    handle.await.unwrap();
    assert!(client.seen.lock().unwrap().is_empty());
    assert!(sink.messages().is_empty());
}
