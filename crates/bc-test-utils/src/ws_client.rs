//! Minimal signaling client over a real WebSocket.

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// A browser stand-in speaking JSON text frames.
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    /// Connect to `url` (e.g. `ws://127.0.0.1:PORT/call`).
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (stream, _) = connect_async(url).await?;
        Ok(Self { stream })
    }

    pub async fn send_json(&mut self, value: &Value) -> anyhow::Result<()> {
        self.stream.send(Message::text(value.to_string())).await?;
        Ok(())
    }

    /// Send a raw text frame, for malformed input.
    pub async fn send_text(&mut self, text: &str) -> anyhow::Result<()> {
        self.stream.send(Message::text(text.to_string())).await?;
        Ok(())
    }

    /// Next JSON text frame, skipping control frames.
    pub async fn recv_json(&mut self, timeout: Duration) -> anyhow::Result<Value> {
        loop {
            let frame = tokio::time::timeout(timeout, self.stream.next())
                .await
                .map_err(|_| anyhow::anyhow!("timed out waiting for frame"))?
                .ok_or_else(|| anyhow::anyhow!("socket closed"))??;

            match frame {
                Message::Text(_) => return Ok(serde_json::from_str(frame.to_text()?)?),
                Message::Close(_) => anyhow::bail!("socket closed by server"),
                _ => continue,
            }
        }
    }

    /// Wait up to `window` for a text frame; `None` if none arrived.
    pub async fn recv_within(&mut self, window: Duration) -> Option<Value> {
        self.recv_json(window).await.ok()
    }

    pub async fn close(mut self) -> anyhow::Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
