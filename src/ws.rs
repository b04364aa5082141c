//! Duplex text transport over WebSocket.
//!
//! Thin wrapper around `tokio-tungstenite` behind the [`Transport`] trait.
//! All WebSocket consumers in the crate should use this module rather than
//! `tokio-tungstenite` directly.
//!
//! # Architecture
//!
//! The protocol engine sees an opaque bidirectional text channel:
//! `send(text)`, `recv() -> text` (suspends until a message or closure),
//! `close()`. [`WsTransport`] implements it with split writer/reader halves
//! behind async mutexes so the keepalive task, the receive task, and `emit`
//! callers can share one connection. Tests substitute scripted transports.
//!
//! WebSocket-level ping/pong and close frames are handled here; the engine
//! layer only ever sees text.

// Rust guideline compliant 2026-02

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite;

/// Concrete WebSocket stream type (avoids repeating the generic everywhere).
type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Transport-level failure, carrying the underlying error message.
///
/// The engine maps these onto its own error taxonomy: write failures become
/// protocol errors, read failures become connection-closed.
#[derive(Debug, Clone)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// Opaque bidirectional text-message channel.
///
/// Methods take `&self` so one connection can be shared by the keepalive
/// task, the receive task, and emitting callers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send one text message.
    async fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Receive the next text message.
    ///
    /// Returns `Ok(None)` on clean closure. Non-text frames are handled
    /// internally and never surface here.
    async fn recv(&self) -> Result<Option<String>, TransportError>;

    /// Close the channel. Best-effort; errors are logged, not returned.
    async fn close(&self);
}

/// WebSocket-backed [`Transport`].
pub struct WsTransport {
    writer: Mutex<futures_util::stream::SplitSink<WsStream, tungstenite::Message>>,
    reader: Mutex<futures_util::stream::SplitStream<WsStream>>,
}

impl std::fmt::Debug for WsTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsTransport").finish_non_exhaustive()
    }
}

impl WsTransport {
    /// Connect to a ws/wss URL and wrap the stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the WebSocket handshake
    /// fails.
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws_stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError(format!("WebSocket connect failed: {e}")))?;

        let (writer, reader) = ws_stream.split();

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.writer
            .lock()
            .await
            .send(tungstenite::Message::Text(text.to_string()))
            .await
            .map_err(|e| TransportError(format!("WebSocket send failed: {e}")))
    }

    async fn recv(&self) -> Result<Option<String>, TransportError> {
        let mut reader = self.reader.lock().await;
        loop {
            match reader.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Ok(Some(text.to_string()));
                }
                Some(Ok(tungstenite::Message::Ping(data))) => {
                    let _ = self
                        .writer
                        .lock()
                        .await
                        .send(tungstenite::Message::Pong(data))
                        .await;
                }
                Some(Ok(tungstenite::Message::Pong(_))) => {
                    // Unsolicited WebSocket-level pong -- skip
                }
                Some(Ok(tungstenite::Message::Binary(_))) => {
                    log::warn!("[Ws] Unexpected binary frame, skipping");
                }
                Some(Ok(tungstenite::Message::Close(_))) => return Ok(None),
                Some(Ok(tungstenite::Message::Frame(_))) => {
                    // Raw frames -- skip
                }
                Some(Err(e)) => {
                    return Err(TransportError(format!("WebSocket read error: {e}")));
                }
                None => return Ok(None),
            }
        }
    }

    async fn close(&self) {
        if let Err(e) = self.writer.lock().await.close().await {
            log::debug!("[Ws] Close failed: {e}");
        }
    }
}

/// Convert an HTTP(S) URL to WS(S) scheme.
///
/// Passes `ws://` and `wss://` through unchanged.
#[must_use]
pub fn http_to_ws_scheme(url: &str) -> String {
    if url.starts_with("wss://") || url.starts_with("ws://") {
        url.to_string()
    } else {
        url.replace("https://", "wss://")
            .replace("http://", "ws://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_to_ws_scheme_https() {
        assert_eq!(
            http_to_ws_scheme("https://example.com"),
            "wss://example.com"
        );
    }

    #[test]
    fn test_http_to_ws_scheme_http() {
        assert_eq!(
            http_to_ws_scheme("http://localhost:3000"),
            "ws://localhost:3000"
        );
    }

    #[test]
    fn test_http_to_ws_scheme_ws_passthrough() {
        assert_eq!(
            http_to_ws_scheme("ws://localhost:3000/socket.io/"),
            "ws://localhost:3000/socket.io/"
        );
    }

    #[tokio::test]
    async fn test_connect_invalid_url_returns_error() {
        let result = WsTransport::connect("not-a-url").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_connect_unreachable_host_returns_error() {
        let result = WsTransport::connect("ws://127.0.0.1:1/invalid").await;
        assert!(result.is_err());
    }
}
