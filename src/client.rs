use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::DEFAULT_BUFFER_SIZE;
use crate::types::LinkRequest;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// One request/response exchange with the link server. The reply is
/// returned as raw JSON since it may be either a response or `{"error": ..}`.
pub async fn send_and_receive(addr: SocketAddr, req: &LinkRequest, limit: Duration) -> Result<Value> {
    let body = serde_json::to_vec(req).context("failed to encode request")?;
    timeout(limit, exchange(addr, &body))
        .await
        .with_context(|| format!("no reply from {} within {:?}", addr, limit))?
}

async fn exchange(addr: SocketAddr, body: &[u8]) -> Result<Value> {
    let mut stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;
    stream.write_all(body).await?;

    // Server closes after replying; read until EOF, at most one buffer.
    let mut reply = Vec::with_capacity(DEFAULT_BUFFER_SIZE);
    stream.take(DEFAULT_BUFFER_SIZE as u64).read_to_end(&mut reply).await?;
    serde_json::from_slice(&reply).with_context(|| "failed to parse reply")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// One-shot server that ignores the request and answers with `reply`.
    async fn canned_server(reply: Vec<u8>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(&reply).await;
            let _ = stream.shutdown().await;
        });
        addr
    }

    #[tokio::test]
    async fn reads_reply_until_close() {
        let addr = canned_server(br#"{"action": "none"}"#.to_vec()).await;
        let v = send_and_receive(addr, &LinkRequest::default(), DEFAULT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(v["action"], "none");
    }

    #[tokio::test]
    async fn reply_is_capped_at_one_buffer() {
        // valid JSON, but longer than the read cap
        let mut body = br#"{"pad": ""#.to_vec();
        body.extend(std::iter::repeat(b'x').take(DEFAULT_BUFFER_SIZE));
        body.extend_from_slice(br#""}"#);
        let addr = canned_server(body).await;
        let err = send_and_receive(addr, &LinkRequest::default(), DEFAULT_TIMEOUT)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("failed to parse reply"));
    }
}
