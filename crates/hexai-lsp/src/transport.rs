//! JSON-RPC message framing over a byte stream
//!
//! LSP messages are HTTP-style headers terminated by an empty line, followed
//! by a body of exactly `Content-Length` bytes. Only `Content-Length` is
//! interpreted; other headers are ignored. The writer serializes frames under
//! an internal lock so concurrent handlers never interleave output.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tracing::error;

use crate::types::{LspError, LspResult};

/// Reads framed messages from a buffered byte stream
pub struct MessageReader<R> {
    reader: BufReader<R>,
}

impl<R: tokio::io::AsyncRead + Unpin> MessageReader<R> {
    /// Wrap a raw byte stream
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
        }
    }

    /// Read one framed message body.
    ///
    /// Returns `Ok(None)` on a clean end-of-stream (EOF before any header
    /// byte); a missing or invalid `Content-Length` is a transport error.
    pub async fn read_message(&mut self) -> LspResult<Option<Vec<u8>>> {
        let mut content_length: Option<usize> = None;
        let mut first_line = true;

        loop {
            let mut line = String::new();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                if first_line {
                    return Ok(None);
                }
                return Err(LspError::Transport(
                    "unexpected end of stream in headers".to_string(),
                ));
            }
            first_line = false;

            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                break; // end of headers
            }
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            if key.trim().eq_ignore_ascii_case("content-length") {
                let n = value.trim().parse::<usize>().map_err(|e| {
                    LspError::Transport(format!("invalid Content-Length: {e}"))
                })?;
                content_length = Some(n);
            }
        }

        let Some(len) = content_length.filter(|n| *n > 0) else {
            return Err(LspError::Transport(
                "missing or invalid Content-Length".to_string(),
            ));
        };

        let mut body = vec![0u8; len];
        self.reader.read_exact(&mut body).await?;
        Ok(Some(body))
    }
}

/// Destination for outbound protocol messages
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Write one message atomically
    async fn send(&self, body: Vec<u8>) -> LspResult<()>;
}

/// Framing writer over any async byte sink
pub struct FramedWriter<W> {
    writer: Mutex<W>,
}

impl<W: AsyncWrite + Unpin + Send> FramedWriter<W> {
    /// Wrap a raw byte sink
    pub fn new(inner: W) -> Self {
        Self {
            writer: Mutex::new(inner),
        }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> MessageSink for FramedWriter<W> {
    async fn send(&self, body: Vec<u8>) -> LspResult<()> {
        let header = format!("Content-Length: {}\r\n\r\n", body.len());
        let mut writer = self.writer.lock().await;
        writer.write_all(header.as_bytes()).await?;
        writer.write_all(&body).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Serialize and send a message; serialization or write failures are logged,
/// never propagated to handlers.
pub async fn write_message<T: Serialize>(sink: &Arc<dyn MessageSink>, message: &T) {
    let body = match serde_json::to_vec(message) {
        Ok(body) => body,
        Err(err) => {
            error!("marshal error: {err}");
            return;
        }
    };
    if let Err(err) = sink.send(body).await {
        error!("write error: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn read_all(input: &[u8]) -> LspResult<Option<Vec<u8>>> {
        let mut reader = MessageReader::new(input);
        reader.read_message().await
    }

    #[tokio::test]
    async fn test_reads_framed_body() {
        let msg = b"Content-Length: 7\r\n\r\n{\"a\":1}";
        let body = read_all(msg).await.unwrap().unwrap();
        assert_eq!(body, b"{\"a\":1}");
    }

    #[tokio::test]
    async fn test_ignores_other_headers() {
        let msg = b"Content-Type: application/json\r\nContent-Length: 2\r\n\r\n{}";
        let body = read_all(msg).await.unwrap().unwrap();
        assert_eq!(body, b"{}");
    }

    #[tokio::test]
    async fn test_clean_eof_returns_none() {
        assert!(read_all(b"").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_content_length_is_fatal() {
        let err = read_all(b"X-Other: 1\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, LspError::Transport(_)));
    }

    #[tokio::test]
    async fn test_invalid_content_length_is_fatal() {
        let err = read_all(b"Content-Length: nope\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, LspError::Transport(_)));
    }

    #[tokio::test]
    async fn test_writer_frames_payload() {
        let buf: Vec<u8> = Vec::new();
        let writer = FramedWriter::new(buf);
        writer.send(b"{}".to_vec()).await.unwrap();
        let inner = writer.writer.into_inner();
        assert_eq!(inner, b"Content-Length: 2\r\n\r\n{}");
    }

    #[tokio::test]
    async fn test_back_to_back_messages() {
        let msg = b"Content-Length: 2\r\n\r\n{}Content-Length: 4\r\n\r\nnull";
        let mut reader = MessageReader::new(&msg[..]);
        assert_eq!(reader.read_message().await.unwrap().unwrap(), b"{}");
        assert_eq!(reader.read_message().await.unwrap().unwrap(), b"null");
        assert!(reader.read_message().await.unwrap().is_none());
    }
}
