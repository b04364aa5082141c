//! cytube-client - Async client for CyTube-style live channels.
//!
//! This crate joins a shared live channel, authenticates, mirrors channel
//! state from the inbound event stream, and issues outward actions with
//! request/acknowledgement semantics over a protocol that has no native
//! correlation IDs.
//!
//! # Architecture
//!
//! Two layers, matching the wire protocol:
//!
//! - **Protocol engine** ([`SocketIo`]) - bootstrap handshake, keepalive,
//!   frame demultiplexing, and predicate-matched request/response
//!   correlation over the unordered event stream.
//! - **Session layer** ([`Bot`]) - connect/join/login sequencing with
//!   rate-limit-aware retry, the receive→dispatch loop with reconnection
//!   policy, and permission-gated actions (chat, pm, playlist edits).
//!
//! # Modules
//!
//! - [`ws`] - duplex text transport (WebSocket behind the `Transport` trait)
//! - [`handshake`] - polling bootstrap, probe, and upgrade
//! - [`socket_io`] - the protocol engine
//! - [`bot`] - the session layer
//! - [`dispatcher`] - per-event ordered handler chains
//! - [`channel`], [`user`], [`playlist`] - channel state mirror
//! - [`media_link`], [`cloak`], [`markup`] - protocol utilities
//! - [`config`] - JSON configuration with env overrides

// Library modules
pub mod bot;
pub mod channel;
pub mod cloak;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handshake;
pub mod markup;
pub mod media_link;
pub mod playlist;
pub mod socket_io;
pub mod user;
pub mod ws;

// Re-export commonly used types
pub use bot::Bot;
pub use channel::{Channel, UserList};
pub use config::Config;
pub use dispatcher::{EventDispatcher, HandlerFuture, HandlerResult};
pub use error::{CytubeError, SocketIoError};
pub use handshake::SocketConfig;
pub use media_link::MediaLink;
pub use playlist::{Playlist, PlaylistItem};
pub use socket_io::SocketIo;
pub use user::User;
pub use ws::{Transport, TransportError, WsTransport};
