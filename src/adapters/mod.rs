//! Adapters — one long-lived async task per chat network.
//!
//! Each adapter owns its connection, turns native events into
//! [`RelayMessage`](crate::relay::RelayMessage)s pushed into an mpsc
//! channel, and exposes a sink the router sends through.

pub mod imgur;
pub mod irc;
pub mod telegram;
pub mod xmpp;

use std::time::Duration;

use thiserror::Error;

use crate::relay::Network;
use crate::transport::TransportError;

/// Longest a single outbound write may wait on a peer that stopped reading.
pub const SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Wire-level failures inside a protocol client.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed XML on an XMPP stream.
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),
    /// Connection or TLS setup failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The peer closed the stream.
    #[error("stream closed by peer")]
    StreamClosed,
    /// The server did not offer STARTTLS.
    #[error("server does not offer STARTTLS")]
    TlsUnavailable,
    /// Credentials were rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),
    /// An outbound write failed, so the session was dropped.
    #[error("outbound write failed, session dropped")]
    WriteFailed,
    /// The peer did not answer in time.
    #[error("timed out {0}")]
    TimedOut(&'static str),
    /// The server sent something the negotiation did not expect.
    #[error("unexpected {0}")]
    Unexpected(String),
}

/// A startup connection failure. Fatal for IRC, Gitter and Telegram.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// The socket could not be opened.
    #[error("[{network}] failed to connect to {server}: {source}")]
    Transport {
        /// Network being connected.
        network: Network,
        /// Address dialled.
        server: String,
        /// Underlying error.
        #[source]
        source: TransportError,
    },
    /// The connection opened but the protocol handshake failed.
    #[error("[{network}] handshake with {server} failed: {source}")]
    Protocol {
        /// Network being connected.
        network: Network,
        /// Address dialled.
        server: String,
        /// Underlying error.
        #[source]
        source: ProtocolError,
    },
    /// An HTTP API rejected the bot's credentials.
    #[error("[{network}] authorization failed: {reason}")]
    Api {
        /// Network being connected.
        network: Network,
        /// Error text from the API.
        reason: String,
    },
}
