//! Bootstrap handshake for the transport layer.
//!
//! One-shot sequence that turns a socket.io base URL into a live upgraded
//! WebSocket plus its keepalive configuration:
//!
//! 1. Plain GET against the polling-transport variant of the URL. The body
//!    carries a JSON object (possibly with a frame prefix before the first
//!    `{`) holding `sid`, `pingInterval` and `pingTimeout`.
//! 2. Open a WebSocket at the streaming-transport URL carrying the sid.
//! 3. Probe: send `2probe`, require the literal reply `3probe`.
//! 4. Upgrade: send `5` (no reply expected).
//!
//! Any failure after the WebSocket opened closes it before surfacing.
//! [`connect`] wraps the whole sequence in a fixed-delay retry loop.

use std::time::Duration;

use serde::Deserialize;

use crate::error::SocketIoError;
use crate::ws::{http_to_ws_scheme, WsTransport};

/// Keepalive configuration returned by the polling bootstrap.
///
/// Created once per handshake, immutable, owned by the protocol engine.
#[derive(Debug, Clone)]
pub struct SocketConfig {
    /// Server-assigned session id, carried in the upgrade URL.
    pub sid: String,
    /// Interval between keepalive pings.
    pub ping_interval: Duration,
    /// How long to wait for a pong before declaring the connection dead.
    pub ping_timeout: Duration,
}

/// Raw polling-bootstrap body. Server sends milliseconds.
#[derive(Debug, Deserialize)]
struct RawConfig {
    sid: String,
    #[serde(rename = "pingInterval", default = "default_ping_ms")]
    ping_interval: u64,
    #[serde(rename = "pingTimeout", default = "default_ping_ms")]
    ping_timeout: u64,
}

fn default_ping_ms() -> u64 {
    10_000
}

/// Floor for both keepalive durations: sub-second server values are clamped.
const MIN_PING: Duration = Duration::from_secs(1);

/// Parse the polling-bootstrap body.
///
/// The JSON object is scanned from the first `{` in the body (the polling
/// transport prefixes it with framing). A missing `sid` is a handshake
/// error.
pub(crate) fn parse_config(body: &str) -> Result<SocketConfig, SocketIoError> {
    let start = body
        .find('{')
        .ok_or_else(|| SocketIoError::Handshake(format!("no JSON object in body: {body:.100}")))?;
    let raw: RawConfig = serde_json::from_str(&body[start..])
        .map_err(|e| SocketIoError::Handshake(format!("invalid socket config: {e}")))?;
    Ok(SocketConfig {
        sid: raw.sid,
        ping_interval: Duration::from_millis(raw.ping_interval).max(MIN_PING),
        ping_timeout: Duration::from_millis(raw.ping_timeout).max(MIN_PING),
    })
}

/// Perform one full handshake attempt.
async fn connect_once(
    client: &reqwest::Client,
    url: &str,
) -> Result<(WsTransport, SocketConfig), SocketIoError> {
    let polling_url = format!("{url}?EID=2&transport=polling");
    log::info!("[Handshake] GET {polling_url}");

    let body = client
        .get(&polling_url)
        .send()
        .await
        .map_err(|e| SocketIoError::Handshake(format!("polling request failed: {e}")))?
        .text()
        .await
        .map_err(|e| SocketIoError::Handshake(format!("polling body read failed: {e}")))?;

    let config = parse_config(&body)?;
    log::info!("[Handshake] sid={}", config.sid);

    let ws_url = format!(
        "{}?EID=3&transport=websocket&sid={}",
        http_to_ws_scheme(url),
        config.sid
    );
    log::info!("[Handshake] connect {ws_url}");

    let transport = WsTransport::connect(&ws_url)
        .await
        .map_err(|e| SocketIoError::Handshake(e.0))?;

    // Probe/upgrade. Failures from here on must close the socket.
    match probe_and_upgrade(&transport).await {
        Ok(()) => Ok((transport, config)),
        Err(e) => {
            crate::ws::Transport::close(&transport).await;
            Err(e)
        }
    }
}

/// Two-step probe then upgrade on a freshly opened WebSocket.
async fn probe_and_upgrade(transport: &WsTransport) -> Result<(), SocketIoError> {
    use crate::ws::Transport as _;

    log::debug!("[Handshake] 2probe");
    transport
        .send("2probe")
        .await
        .map_err(|e| SocketIoError::Handshake(e.0))?;

    let reply = transport
        .recv()
        .await
        .map_err(|e| SocketIoError::Handshake(e.0))?
        .ok_or_else(|| SocketIoError::Handshake("closed during probe".into()))?;
    if reply != "3probe" {
        return Err(SocketIoError::Handshake(format!(
            "invalid probe response: \"{reply}\" != \"3probe\""
        )));
    }

    log::debug!("[Handshake] upgrade");
    transport
        .send("5")
        .await
        .map_err(|e| SocketIoError::Handshake(e.0))?;
    Ok(())
}

/// Perform the bootstrap handshake with retries.
///
/// Attempts the full sequence up to `retry + 1` times with a fixed delay
/// between tries. Exhausting the retries fails with
/// [`SocketIoError::ConnectionFailed`] wrapping the last error.
pub async fn connect(
    client: &reqwest::Client,
    url: &str,
    retry: u32,
    retry_delay: Duration,
) -> Result<(WsTransport, SocketConfig), SocketIoError> {
    let mut attempt = 0u32;
    loop {
        match connect_once(client, url).await {
            Ok(ok) => return Ok(ok),
            Err(e) => {
                log::error!(
                    "[Handshake] connect {url} (try {} / {}): {e}",
                    attempt + 1,
                    retry + 1
                );
                if attempt == retry {
                    return Err(SocketIoError::ConnectionFailed(Box::new(e)));
                }
            }
        }
        attempt += 1;
        tokio::time::sleep(retry_delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_with_frame_prefix() {
        let config = parse_config(
            "xxx{\"sid\":\"abc\",\"pingInterval\":25000,\"pingTimeout\":5000}",
        )
        .expect("valid config");
        assert_eq!(config.sid, "abc");
        assert_eq!(config.ping_interval, Duration::from_secs(25));
        assert_eq!(config.ping_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_config_clamps_to_one_second() {
        let config = parse_config("{\"sid\":\"s\",\"pingInterval\":10,\"pingTimeout\":0}")
            .expect("valid config");
        assert_eq!(config.ping_interval, Duration::from_secs(1));
        assert_eq!(config.ping_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_parse_config_defaults() {
        let config = parse_config("{\"sid\":\"s\"}").expect("valid config");
        assert_eq!(config.ping_interval, Duration::from_secs(10));
        assert_eq!(config.ping_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_parse_config_missing_sid() {
        let err = parse_config("{\"pingInterval\":1000}").expect_err("no sid");
        assert!(matches!(err, SocketIoError::Handshake(_)));
    }

    #[test]
    fn test_parse_config_no_object() {
        let err = parse_config("96:0 not json").expect_err("no object");
        assert!(matches!(err, SocketIoError::Handshake(_)));
    }
}
