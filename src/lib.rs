//! chatbridge — one conversation across an IRC channel, a Gitter room, a
//! Telegram group and an XMPP multi-user chat.
//!
//! Each network has an adapter that pushes inbound messages into its own
//! channel; the relay core normalizes them and fans them out to the other
//! networks. See `DESIGN.md` for the architecture.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod adapters;
pub mod bridge;
pub mod config;
pub mod credentials;
pub mod logging;
pub mod relay;
pub mod transport;
