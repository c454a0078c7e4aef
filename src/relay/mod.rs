//! The relay core: message model, text normalization, fan-out routing,
//! admin commands and reconnect supervision.
//!
//! Adapters push [`RelayMessage`]s into one channel each; a router loop per
//! adapter ([`router::run_inbound`]) drains it in arrival order and fans the
//! message out through the other adapters' sinks.

pub mod admin;
pub mod message;
pub mod reconnect;
pub mod router;
pub mod stats;
pub mod target;
pub mod transform;

pub use message::{MessageKind, Network, RelayMessage, TelegramOrigin};
pub use router::{ChannelSink, Router, SendError, SendOptions, Sinks, TelegramSink};
