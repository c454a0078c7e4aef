//! Fan-out of inbound messages to every other network.
//!
//! [`Router::plan`] is the pure rule set: given one message it lists the
//! sends to issue. [`Router::route`] executes a plan against the adapter
//! sinks, best-effort: a failed send is counted and logged, never retried.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::admin::{AdminAction, AdminHandler};
use super::message::{Network, RelayMessage};
use super::stats::RelayStats;
use super::target::ActiveGroupTarget;
use super::transform::{split_lines, tag_line, MessageTransformer};

/// Per-send delivery flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendOptions {
    /// Suppress link previews and the notification sound (Telegram only).
    pub quiet: bool,
}

/// A send that did not reach its network.
#[derive(Debug, Error)]
pub enum SendError {
    /// The adapter currently has no connection.
    #[error("{0} is not connected")]
    NotConnected(Network),
    /// The network rejected or lost the message.
    #[error("{network} send failed: {reason}")]
    Failed {
        /// Destination network.
        network: Network,
        /// Error text from the client.
        reason: String,
    },
}

/// Outbound side of an adapter bound to one channel or room.
#[async_trait]
pub trait ChannelSink: Send + Sync {
    /// Send one line to the configured channel or room.
    async fn send_line(&self, line: &str) -> Result<(), SendError>;
}

/// Outbound side of the Telegram adapter, which can address any chat.
#[async_trait]
pub trait TelegramSink: Send + Sync {
    /// Send `text` to `chat_id`.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        options: SendOptions,
    ) -> Result<(), SendError>;
}

/// The sinks of all four adapters.
#[derive(Clone)]
pub struct Sinks {
    /// IRC channel.
    pub irc: Arc<dyn ChannelSink>,
    /// Gitter room.
    pub gitter: Arc<dyn ChannelSink>,
    /// XMPP room.
    pub xmpp: Arc<dyn ChannelSink>,
    /// Telegram bot.
    pub telegram: Arc<dyn TelegramSink>,
}

/// Where a planned send goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// The configured channel or room of an IRC, Gitter or XMPP adapter.
    Channel(Network),
    /// A Telegram chat.
    TelegramChat(i64),
}

impl Destination {
    /// Network this destination belongs to.
    pub fn network(&self) -> Network {
        match self {
            Destination::Channel(network) => *network,
            Destination::TelegramChat(_) => Network::Telegram,
        }
    }
}

/// One outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Target of the send.
    pub destination: Destination,
    /// Final wire text, already author-tagged where needed.
    pub text: String,
    /// Delivery flags.
    pub options: SendOptions,
}

/// Why a message produced no sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// A status notice that did not pass the allow-filter.
    FilteredStatus,
    /// A Telegram message while no relay group is bound.
    NoRelayGroup,
    /// Nothing left to send after normalization.
    Empty,
}

/// Outcome of planning one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// Issue these sends, in order.
    Deliver(Vec<Delivery>),
    /// Drop the message.
    Dropped(DropReason),
}

/// Result of routing one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RouteOutcome {
    /// Sends that succeeded.
    pub delivered: usize,
    /// Sends that failed.
    pub failed: usize,
    /// Set when the message was dropped before fan-out.
    pub dropped: Option<DropReason>,
}

/// The relay hub.
pub struct Router {
    sinks: Sinks,
    transformer: MessageTransformer,
    target: Arc<ActiveGroupTarget>,
    stats: Arc<RelayStats>,
    admin: AdminHandler,
}

impl Router {
    /// Assemble a router from the adapter sinks and shared state.
    pub fn new(
        sinks: Sinks,
        transformer: MessageTransformer,
        target: Arc<ActiveGroupTarget>,
        stats: Arc<RelayStats>,
        admin: AdminHandler,
    ) -> Self {
        Self {
            sinks,
            transformer,
            target,
            stats,
            admin,
        }
    }

    /// The shared relay group binding.
    pub fn target(&self) -> &Arc<ActiveGroupTarget> {
        &self.target
    }

    /// Send counters.
    pub fn stats(&self) -> &Arc<RelayStats> {
        &self.stats
    }

    /// Decide the sends for `msg` without performing them.
    pub fn plan(&self, msg: &RelayMessage) -> Plan {
        let group = self.target.get();

        if msg.source == Network::Telegram && group.is_none() {
            return Plan::Dropped(DropReason::NoRelayGroup);
        }

        let (body, tagged, options) = match msg.source {
            Network::Gitter if msg.is_status() => {
                if !self.transformer.is_status_allowed(&msg.text) {
                    return Plan::Dropped(DropReason::FilteredStatus);
                }
                // Notices are relayed as-is; the service bot is not an author.
                (msg.text.clone(), false, SendOptions { quiet: true })
            }
            Network::Irc | Network::Gitter => {
                let gitter = msg.source == Network::Gitter;
                let body = self.transformer.normalize_irc(&msg.text, gitter);
                (body, true, SendOptions::default())
            }
            Network::Telegram | Network::Xmpp => (msg.text.clone(), true, SendOptions::default()),
        };

        if body.trim().is_empty() {
            return Plan::Dropped(DropReason::Empty);
        }

        let render = |text: &str| {
            if tagged {
                tag_line(&msg.author, text)
            } else {
                text.to_owned()
            }
        };

        let mut deliveries = Vec::new();
        for network in Network::ALL {
            if network == msg.source {
                continue;
            }
            match network {
                Network::Telegram => {
                    if let Some(chat_id) = group {
                        deliveries.push(Delivery {
                            destination: Destination::TelegramChat(chat_id),
                            text: render(&body),
                            options,
                        });
                    }
                }
                Network::Irc | Network::Gitter => {
                    for line in split_lines(&body) {
                        deliveries.push(Delivery {
                            destination: Destination::Channel(network),
                            text: render(line),
                            options,
                        });
                    }
                }
                Network::Xmpp => deliveries.push(Delivery {
                    destination: Destination::Channel(Network::Xmpp),
                    text: render(&body),
                    options,
                }),
            }
        }

        // A Telegram message posted outside the relay group (e.g. a private
        // chat with the bot) is also relayed into the group.
        if let (Some(origin), Some(chat_id)) = (&msg.telegram, group) {
            if origin.chat_id != chat_id {
                deliveries.insert(
                    0,
                    Delivery {
                        destination: Destination::TelegramChat(chat_id),
                        text: render(&body),
                        options,
                    },
                );
            }
        }

        Plan::Deliver(deliveries)
    }

    /// Plan and execute the fan-out for one message.
    pub async fn route(&self, msg: &RelayMessage) -> RouteOutcome {
        let network = msg.source.as_str();
        let deliveries = match self.plan(msg) {
            Plan::Deliver(deliveries) => deliveries,
            Plan::Dropped(reason) => {
                match reason {
                    DropReason::FilteredStatus => {
                        info!(network, text = %msg.text, "status notice not relayed");
                    }
                    DropReason::NoRelayGroup => {
                        info!(network, "no relay group bound, use /start in the group");
                    }
                    DropReason::Empty => debug!(network, author = %msg.author, "empty message"),
                }
                return RouteOutcome {
                    dropped: Some(reason),
                    ..RouteOutcome::default()
                };
            }
        };

        info!(network, "<{}> {}", msg.author, msg.text);

        let mut outcome = RouteOutcome::default();
        for delivery in &deliveries {
            let destination = delivery.destination.network();
            match self.send(delivery).await {
                Ok(()) => {
                    self.stats.record_relayed(destination);
                    outcome.delivered = outcome.delivered.saturating_add(1);
                }
                Err(e) => {
                    self.stats.record_failure(destination);
                    outcome.failed = outcome.failed.saturating_add(1);
                    warn!(
                        network = destination.as_str(),
                        source = network,
                        error = %e,
                        "relay send failed, message dropped"
                    );
                }
            }
        }
        outcome
    }

    async fn send(&self, delivery: &Delivery) -> Result<(), SendError> {
        match delivery.destination {
            Destination::TelegramChat(chat_id) => {
                self.sinks
                    .telegram
                    .send_message(chat_id, &delivery.text, delivery.options)
                    .await
            }
            Destination::Channel(Network::Irc) => self.sinks.irc.send_line(&delivery.text).await,
            Destination::Channel(Network::Gitter) => {
                self.sinks.gitter.send_line(&delivery.text).await
            }
            Destination::Channel(Network::Xmpp) => self.sinks.xmpp.send_line(&delivery.text).await,
            Destination::Channel(Network::Telegram) => Err(SendError::Failed {
                network: Network::Telegram,
                reason: "telegram has no fixed channel".to_owned(),
            }),
        }
    }

    /// Handle one inbound message: admin commands first, then fan-out.
    pub async fn handle(&self, msg: RelayMessage) -> RouteOutcome {
        if let Some(origin) = &msg.telegram {
            match self.admin.handle(origin, &msg.text) {
                AdminAction::NotCommand => {}
                AdminAction::Bound { chat_id, previous } => {
                    info!(network = "telegram", chat_id, ?previous, "relay group bound");
                    return RouteOutcome::default();
                }
                AdminAction::StatusReply { chat_id, text } => {
                    let sent = self
                        .sinks
                        .telegram
                        .send_message(chat_id, &text, SendOptions::default())
                        .await;
                    if let Err(e) = sent {
                        warn!(network = "telegram", error = %e, "failed to send status reply");
                    }
                    return RouteOutcome::default();
                }
                AdminAction::Ignored => {
                    debug!(network = "telegram", text = %msg.text, "admin command ignored");
                    return RouteOutcome::default();
                }
            }
        }
        self.route(&msg).await
    }
}

/// Drain one adapter's inbound channel, in arrival order.
///
/// Returns when the adapter drops its sender.
pub async fn run_inbound(router: Arc<Router>, network: Network, mut inbound: mpsc::Receiver<RelayMessage>) {
    while let Some(msg) = inbound.recv().await {
        router.handle(msg).await;
    }
    info!(network = network.as_str(), "inbound channel closed");
}
