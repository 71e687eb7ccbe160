//! Wire-level tests: framed transport in, dispatch, framed responses out,
//! and the shutdown/exit lifecycle.

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;

use hexai_lsp::{FramedWriter, MessageReader, MessageSink, Server, ServerOptions, ServerState};

fn frame(value: &Value) -> Vec<u8> {
    let body = serde_json::to_vec(value).unwrap();
    let mut out = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    out.extend_from_slice(&body);
    out
}

struct Harness {
    server: Arc<Server>,
    run: tokio::task::JoinHandle<hexai_lsp::LspResult<()>>,
    to_server: tokio::io::DuplexStream,
    from_server: MessageReader<tokio::io::DuplexStream>,
}

impl Harness {
    fn start() -> Self {
        let (to_server, server_reader) = tokio::io::duplex(64 * 1024);
        let (server_writer, from_server) = tokio::io::duplex(64 * 1024);
        let sink: Arc<dyn MessageSink> = Arc::new(FramedWriter::new(server_writer));
        let server = Server::new(ServerOptions::default(), None, sink);
        let run = {
            let server = server.clone();
            tokio::spawn(async move { server.run(server_reader).await })
        };
        Self {
            server,
            run,
            to_server,
            from_server: MessageReader::new(from_server),
        }
    }

    async fn send(&mut self, value: Value) {
        self.to_server.write_all(&frame(&value)).await.unwrap();
    }

    async fn recv(&mut self) -> Value {
        let body = self
            .from_server
            .read_message()
            .await
            .unwrap()
            .expect("expected a framed message");
        serde_json::from_slice(&body).unwrap()
    }
}

#[tokio::test]
async fn initialize_advertises_capabilities() {
    let mut h = Harness::start();
    h.send(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
        .await;
    let resp = h.recv().await;
    assert_eq!(resp["id"], 1);
    let caps = &resp["result"]["capabilities"];
    assert_eq!(caps["textDocumentSync"], 1);
    assert_eq!(caps["completionProvider"]["resolveProvider"], false);
    assert_eq!(
        caps["completionProvider"]["triggerCharacters"],
        json!([".", ":", "/", "_", ")", "{"])
    );
    assert_eq!(caps["codeActionProvider"]["resolveProvider"], true);
    assert_eq!(resp["result"]["serverInfo"]["name"], "hexai");
    assert_eq!(h.server.state(), ServerState::Running);
}

#[tokio::test]
async fn unknown_method_with_id_gets_method_not_found() {
    let mut h = Harness::start();
    h.send(json!({"jsonrpc": "2.0", "id": 7, "method": "workspace/symbol"}))
        .await;
    let resp = h.recv().await;
    assert_eq!(resp["id"], 7);
    assert_eq!(resp["error"]["code"], -32601);
}

#[tokio::test]
async fn string_ids_are_echoed_verbatim() {
    let mut h = Harness::start();
    h.send(json!({"jsonrpc": "2.0", "id": "abc-1", "method": "shutdown"}))
        .await;
    let resp = h.recv().await;
    assert_eq!(resp["id"], "abc-1");
    assert_eq!(resp["result"], Value::Null);
}

#[tokio::test]
async fn unknown_notification_is_dropped() {
    let mut h = Harness::start();
    h.send(json!({"jsonrpc": "2.0", "method": "workspace/didChangeConfiguration"}))
        .await;
    // the next request still gets its own response, nothing in between
    h.send(json!({"jsonrpc": "2.0", "id": 2, "method": "initialize", "params": {}}))
        .await;
    let resp = h.recv().await;
    assert_eq!(resp["id"], 2);
}

#[tokio::test]
async fn malformed_json_is_skipped() {
    let mut h = Harness::start();
    let garbage = b"Content-Length: 9\r\n\r\nnot json!";
    h.to_server.write_all(garbage).await.unwrap();
    h.send(json!({"jsonrpc": "2.0", "id": 3, "method": "initialize", "params": {}}))
        .await;
    let resp = h.recv().await;
    assert_eq!(resp["id"], 3);
}

#[tokio::test]
async fn client_responses_are_dropped() {
    let mut h = Harness::start();
    // a response (no method) must not be dispatched
    h.send(json!({"jsonrpc": "2.0", "id": 42, "result": {"applied": true}}))
        .await;
    h.send(json!({"jsonrpc": "2.0", "id": 4, "method": "initialize", "params": {}}))
        .await;
    let resp = h.recv().await;
    assert_eq!(resp["id"], 4);
}

#[tokio::test]
async fn shutdown_then_exit_terminates_cleanly() {
    let mut h = Harness::start();
    h.send(json!({"jsonrpc": "2.0", "id": 1, "method": "shutdown"}))
        .await;
    let resp = h.recv().await;
    assert_eq!(resp["result"], Value::Null);
    assert_eq!(h.server.state(), ServerState::ShuttingDown);

    h.send(json!({"jsonrpc": "2.0", "method": "exit"})).await;
    h.run.await.unwrap().unwrap();
    assert_eq!(h.server.state(), ServerState::Exited);
    assert!(h.server.exited_cleanly());
}

#[tokio::test]
async fn exit_without_shutdown_is_not_clean() {
    let mut h = Harness::start();
    h.send(json!({"jsonrpc": "2.0", "method": "exit"})).await;
    h.run.await.unwrap().unwrap();
    assert_eq!(h.server.state(), ServerState::Exited);
    assert!(!h.server.exited_cleanly());
}

#[tokio::test]
async fn clean_eof_ends_the_read_loop() {
    let h = Harness::start();
    drop(h.to_server);
    h.run.await.unwrap().unwrap();
}

#[tokio::test]
async fn document_lifecycle_and_fallback_completion_without_llm() {
    let mut h = Harness::start();
    h.send(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}))
        .await;
    h.recv().await;

    h.send(json!({
        "jsonrpc": "2.0", "method": "textDocument/didOpen",
        "params": {"textDocument": {"uri": "file:///a.go", "text": "package main\n"}}
    }))
    .await;
    h.send(json!({
        "jsonrpc": "2.0", "id": 2, "method": "textDocument/completion",
        "params": {"textDocument": {"uri": "file:///a.go"}, "position": {"line": 0, "character": 7}}
    }))
    .await;
    let resp = h.recv().await;
    assert_eq!(resp["id"], 2);
    assert_eq!(resp["result"]["isIncomplete"], false);
    let items = resp["result"]["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["label"], "hexai-complete");
    assert_eq!(items[0]["sortText"], "9999");

    h.send(json!({
        "jsonrpc": "2.0", "method": "textDocument/didClose",
        "params": {"textDocument": {"uri": "file:///a.go"}}
    }))
    .await;
    h.send(json!({
        "jsonrpc": "2.0", "id": 3, "method": "textDocument/codeAction",
        "params": {
            "textDocument": {"uri": "file:///a.go"},
            "range": {"start": {"line": 0, "character": 0}, "end": {"line": 0, "character": 5}}
        }
    }))
    .await;
    let resp = h.recv().await;
    assert_eq!(resp["id"], 3);
    assert_eq!(resp["result"], json!([]));
}
