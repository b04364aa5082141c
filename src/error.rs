//! Error types for the socket layer and the session layer.
//!
//! Two families mirror the two protocol layers:
//!
//! - [`SocketIoError`] — transport/engine failures. Everything the protocol
//!   engine can die of funnels into one of these variants, and the first one
//!   to occur becomes the connection's terminal error.
//! - [`CytubeError`] — session-level failures: channel lookup, login,
//!   permission checks, server rejections of outward actions.

/// Errors from the protocol engine and its transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketIoError {
    /// Bootstrap handshake failed (bad config body, probe mismatch, open error).
    Handshake(String),
    /// All handshake retries were exhausted; wraps the last error.
    ConnectionFailed(Box<SocketIoError>),
    /// The transport closed or failed mid-connection.
    ConnectionClosed(Option<String>),
    /// No pong arrived within the ping timeout.
    PingTimeout,
    /// The connection was closed locally via `close()`.
    Closed,
    /// A frame could not be written or encoded.
    Protocol(String),
}

impl SocketIoError {
    /// `true` for the connection-closed family (including ping timeout and
    /// explicit close).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            Self::ConnectionClosed(_) | Self::PingTimeout | Self::Closed
        )
    }
}

impl std::fmt::Display for SocketIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handshake(msg) => write!(f, "handshake failed: {msg}"),
            Self::ConnectionFailed(err) => write!(f, "connection failed: {err}"),
            Self::ConnectionClosed(Some(msg)) => write!(f, "connection closed: {msg}"),
            Self::ConnectionClosed(None) => write!(f, "connection closed"),
            Self::PingTimeout => write!(f, "ping timeout"),
            Self::Closed => write!(f, "connection closed by client"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for SocketIoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConnectionFailed(err) => Some(err),
            _ => None,
        }
    }
}

/// Errors from the session layer.
#[derive(Debug, Clone)]
pub enum CytubeError {
    /// The socket config lookup failed or returned no usable server.
    SocketConfig(String),
    /// The channel or user rejected the join/login sequence.
    Login(String),
    /// The bot was kicked from the channel. Always aborts the run loop.
    Kicked(String),
    /// The server rejected an outward action; carries the server message.
    Channel(String),
    /// A local permission check failed before anything touched the network.
    Permission(String),
    /// An engine error bubbled through the session layer.
    Socket(SocketIoError),
}

impl std::fmt::Display for CytubeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SocketConfig(msg) => write!(f, "socket config error: {msg}"),
            Self::Login(msg) => write!(f, "login error: {msg}"),
            Self::Kicked(msg) => write!(f, "kicked: {msg}"),
            Self::Channel(msg) => write!(f, "channel error: {msg}"),
            Self::Permission(msg) => write!(f, "permission denied: {msg}"),
            Self::Socket(err) => write!(f, "socket error: {err}"),
        }
    }
}

impl std::error::Error for CytubeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Socket(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SocketIoError> for CytubeError {
    fn from(err: SocketIoError) -> Self {
        Self::Socket(err)
    }
}
