//! Reconnect supervision for adapters whose client does not heal itself.
//!
//! Two states: connected, and reconnecting. A receive error moves the
//! adapter to reconnecting; attempts then repeat at a fixed interval,
//! with no growth and no cap, until one succeeds.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use super::message::Network;
use super::stats::LinkState;

/// Supervisor state of one adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// Receive loop running on a live connection.
    Connected,
    /// Connection closed; retrying.
    Reconnecting,
}

/// Fixed-interval retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Wait before each attempt.
    pub interval: Duration,
}

impl ReconnectPolicy {
    /// Retry every `interval`.
    pub fn fixed(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(3))
    }
}

/// Tracks supervisor state and mirrors it into the adapter's [`LinkState`].
#[derive(Debug, Clone)]
pub struct Supervisor {
    network: Network,
    policy: ReconnectPolicy,
    link: LinkState,
    state: SupervisorState,
}

impl Supervisor {
    /// A supervisor for a connected adapter.
    pub fn new(network: Network, policy: ReconnectPolicy, link: LinkState) -> Self {
        link.set_connected(true);
        Self {
            network,
            policy,
            link,
            state: SupervisorState::Connected,
        }
    }

    /// A supervisor for an adapter whose first connect failed.
    pub fn disconnected(network: Network, policy: ReconnectPolicy, link: LinkState) -> Self {
        link.set_connected(false);
        Self {
            network,
            policy,
            link,
            state: SupervisorState::Reconnecting,
        }
    }

    /// Current state.
    pub fn state(&self) -> SupervisorState {
        self.state
    }

    /// Record a receive failure: the adapter is now reconnecting.
    pub fn connection_lost(&mut self, error: &dyn Display) {
        warn!(
            network = self.network.as_str(),
            error = %error,
            interval_secs = self.policy.interval.as_secs(),
            "receive failed, reconnecting"
        );
        self.link.set_connected(false);
        self.state = SupervisorState::Reconnecting;
    }

    /// Retry `attempt` at the policy interval until it succeeds.
    ///
    /// Each attempt is preceded by one interval of waiting. Never gives up.
    pub async fn reconnect<T, E, F, Fut>(&mut self, mut attempt: F) -> T
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempts: u64 = 0;
        loop {
            tokio::time::sleep(self.policy.interval).await;
            attempts = attempts.saturating_add(1);
            match attempt().await {
                Ok(connection) => {
                    info!(network = self.network.as_str(), attempts, "reconnected");
                    self.link.set_connected(true);
                    self.state = SupervisorState::Connected;
                    return connection;
                }
                Err(e) => {
                    warn!(
                        network = self.network.as_str(),
                        attempts,
                        error = %e,
                        "reconnect attempt failed"
                    );
                }
            }
        }
    }
}
