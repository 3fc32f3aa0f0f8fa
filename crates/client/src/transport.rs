//! Transport layer: one duplexed connection to the middleware.
//!
//! The client talks to the wire through the [`Transport`] trait so the
//! WebSocket implementation can be swapped for an in-memory one in
//! tests (or any other framed duplex). The production transport is
//! [`WsTransport`]: JSON text frames over `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use tn_ddp::{ClientMessage, ServerMessage};

/// Errors at the framing/connection layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket: {0}")]
    Ws(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame arrived that does not parse as a protocol message.
    /// Skippable — the connection itself is fine.
    #[error("frame: {0}")]
    Frame(#[from] serde_json::Error),

    #[error("transport closed")]
    Closed,
}

/// A duplexed, framed connection to the middleware.
///
/// `recv` returning `None` means the peer closed the connection; a
/// `Frame` error means one frame was garbage and the caller may keep
/// reading.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: ClientMessage) -> Result<(), TransportError>;
    async fn recv(&mut self) -> Option<Result<ServerMessage, TransportError>>;
    async fn close(&mut self);
}

/// WebSocket transport over `tokio-tungstenite`.
pub struct WsTransport {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsTransport {
    /// Dial the middleware endpoint. The bearer token goes into the
    /// `Authorization` header of the upgrade request and is never
    /// logged.
    pub async fn connect(url: &str, token: &str) -> Result<Self, TransportError> {
        let mut request = url.into_client_request()?;
        let value = format!("Bearer {token}")
            .parse()
            .map_err(|e: tokio_tungstenite::tungstenite::http::header::InvalidHeaderValue| {
                TransportError::Ws(tokio_tungstenite::tungstenite::Error::HttpFormat(e.into()))
            })?;
        request.headers_mut().insert(AUTHORIZATION, value);

        let (ws, _response) = tokio_tungstenite::connect_async(request).await?;
        tracing::debug!(url = %url, "websocket connected");
        Ok(Self { ws })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: ClientMessage) -> Result<(), TransportError> {
        let json = serde_json::to_string(&frame)?;
        self.ws.send(Message::Text(json)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<ServerMessage, TransportError>> {
        loop {
            let msg = match self.ws.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(e.into())),
            };
            match msg {
                Message::Text(text) => {
                    return Some(serde_json::from_str(&text).map_err(Into::into));
                }
                Message::Close(_) => return None,
                // WebSocket-level pings are answered by tungstenite;
                // anything else the middleware never sends.
                _ => continue,
            }
        }
    }

    async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }
}
