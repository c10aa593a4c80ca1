//! Frame transport.
//!
//! The core never goes hunting for a live socket: whoever owns the
//! connection hands in a [`FrameSink`] and forwards inbound frames. The
//! WebSocket implementation below is the production transport; tests inject
//! their own recording sinks.

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use tokio::{net::TcpStream, sync::Mutex, task::JoinHandle};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use crate::CanvasClient;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound half of the duplex frame channel.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send(&self, frame: Vec<u8>) -> Result<()>;
}

pub struct WsTransport {
    sink: Mutex<SplitSink<WsStream, Message>>,
}

/// Inbound half, returned by [`WsTransport::connect`]. Call
/// [`FrameStream::forward_to`] once the client exists.
pub struct FrameStream {
    reader: SplitStream<WsStream>,
}

impl WsTransport {
    pub async fn connect(server_url: &str) -> Result<(Arc<Self>, FrameStream)> {
        let ws_url = websocket_url(server_url)?;
        let (stream, _) = connect_async(ws_url.as_str())
            .await
            .with_context(|| format!("failed to connect websocket: {ws_url}"))?;
        let (sink, reader) = stream.split();
        Ok((
            Arc::new(Self {
                sink: Mutex::new(sink),
            }),
            FrameStream { reader },
        ))
    }
}

#[async_trait]
impl FrameSink for WsTransport {
    async fn send(&self, frame: Vec<u8>) -> Result<()> {
        self.sink
            .lock()
            .await
            .send(Message::Binary(frame))
            .await
            .context("websocket send failed")
    }
}

impl FrameStream {
    /// Spawns the read loop. Binary frames arrive as resolved byte buffers
    /// and go straight to the decoder; anything else is transport noise.
    pub fn forward_to(self, client: Arc<CanvasClient>) -> JoinHandle<()> {
        let mut reader = self.reader;
        tokio::spawn(async move {
            while let Some(message) = reader.next().await {
                match message {
                    Ok(Message::Binary(frame)) => client.handle_frame(&frame).await,
                    Ok(Message::Text(text)) => {
                        debug!(len = text.len(), "ignoring text frame");
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(err) => {
                        warn!(%err, "websocket receive failed");
                        client.emit_error(format!("websocket receive failed: {err}"));
                        break;
                    }
                }
            }
            client.emit_disconnected();
        })
    }
}

fn websocket_url(server_url: &str) -> Result<Url> {
    let mut url = Url::parse(server_url)
        .with_context(|| format!("invalid server url: {server_url}"))?;
    let scheme = match url.scheme() {
        "ws" | "wss" => return Ok(url),
        "http" => "ws",
        "https" => "wss",
        other => return Err(anyhow!("unsupported server url scheme: {other}")),
    };
    url.set_scheme(scheme)
        .map_err(|_| anyhow!("failed to rewrite scheme for {server_url}"))?;
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn websocket_schemes_pass_through() {
        assert_eq!(
            websocket_url("wss://canvas.example/ws").unwrap().as_str(),
            "wss://canvas.example/ws"
        );
        assert_eq!(
            websocket_url("ws://localhost:8080/ws").unwrap().as_str(),
            "ws://localhost:8080/ws"
        );
    }

    #[test]
    fn http_schemes_are_rewritten() {
        assert_eq!(
            websocket_url("https://canvas.example/ws").unwrap().scheme(),
            "wss"
        );
        assert_eq!(
            websocket_url("http://canvas.example/ws").unwrap().scheme(),
            "ws"
        );
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert!(websocket_url("ftp://canvas.example").is_err());
        assert!(websocket_url("not a url").is_err());
    }
}
