//! Per-network counters and connection flags.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::message::Network;

/// Counts of relayed and failed sends, per destination network.
#[derive(Debug, Default)]
pub struct RelayStats {
    relayed: [AtomicU64; 4],
    failed: [AtomicU64; 4],
}

impl RelayStats {
    /// Zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful send to `network`.
    pub fn record_relayed(&self, network: Network) {
        self.relayed[network.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed send to `network`.
    pub fn record_failure(&self, network: Network) {
        self.failed[network.index()].fetch_add(1, Ordering::Relaxed);
    }

    /// Successful sends to `network` so far.
    pub fn relayed(&self, network: Network) -> u64 {
        self.relayed[network.index()].load(Ordering::Relaxed)
    }

    /// Failed sends to `network` so far.
    pub fn failures(&self, network: Network) -> u64 {
        self.failed[network.index()].load(Ordering::Relaxed)
    }

    /// One-line summary of failures, e.g. `IRC: 0, Gitter: 2, Telegram: 0, XMPP: 5`.
    pub fn failure_summary(&self) -> String {
        Network::ALL
            .iter()
            .map(|network| format!("{network}: {}", self.failures(*network)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Live connected flag of one adapter.
///
/// Written only by the adapter's own task; anyone may read it.
#[derive(Debug, Clone, Default)]
pub struct LinkState(Arc<AtomicBool>);

impl LinkState {
    /// A disconnected link.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update the flag.
    pub fn set_connected(&self, connected: bool) {
        self.0.store(connected, Ordering::SeqCst);
    }

    /// Whether the adapter is connected right now.
    pub fn is_connected(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Connection flags of the adapters that can drop.
#[derive(Debug, Clone, Default)]
pub struct LinkStates {
    /// IRC connection.
    pub irc: LinkState,
    /// Gitter gateway connection.
    pub gitter: LinkState,
    /// XMPP connection.
    pub xmpp: LinkState,
}
