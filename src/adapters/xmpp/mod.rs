//! XMPP multi-user chat adapter.
//!
//! Unlike the IRC client, the XMPP connection does not heal itself: a
//! receive error hands control to a [`Supervisor`] that redials at a fixed
//! interval, rejoins the room and resumes receiving.

pub mod client;
pub mod stanza;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Notify};
use tracing::{debug, info};

use self::client::{XmppOptions, XmppReceiver, XmppSender};
use self::stanza::{ChatMessage, Stanza};
use super::{ConnectError, ProtocolError};
use crate::config::XmppConfig;
use crate::relay::reconnect::{ReconnectPolicy, Supervisor};
use crate::relay::stats::LinkState;
use crate::relay::{ChannelSink, Network, RelayMessage, SendError};

/// Limit on one session setup, from dial to bound resource.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Send half of the current session plus the signal that drops it.
struct Live {
    sender: XmppSender,
    lost: Arc<Notify>,
}

type SharedLive = Arc<Mutex<Option<Live>>>;

/// Turn a room message into a relay message.
///
/// Only groupchat messages from `muc/<someone>` are kept; our own echo,
/// private messages, replayed history and empty bodies are dropped.
pub fn room_message(muc: &str, own_nick: &str, chat: &ChatMessage) -> Option<RelayMessage> {
    if chat.kind != "groupchat" {
        return None;
    }
    let (room, author) = chat.from.split_once('/')?;
    if !room.eq_ignore_ascii_case(muc) || author.is_empty() || author == own_nick {
        return None;
    }
    if chat.delayed || chat.body.trim().is_empty() {
        return None;
    }
    Some(RelayMessage::new(Network::Xmpp, author, chat.body.clone()))
}

/// Opens authenticated XMPP sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Address dialled, for error reports.
    fn server(&self) -> &str;

    /// Open a bound session, ready to join rooms.
    async fn open(&self) -> Result<(XmppSender, XmppReceiver), ProtocolError>;
}

/// Dials the configured server with STARTTLS and SASL PLAIN.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    options: XmppOptions,
}

impl TcpConnector {
    /// Connector for the account in `options`.
    pub fn new(options: XmppOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    fn server(&self) -> &str {
        &self.options.server
    }

    async fn open(&self) -> Result<(XmppSender, XmppReceiver), ProtocolError> {
        client::connect(&self.options).await
    }
}

/// A joined room session, handed from [`XmppAdapter::connect`] to
/// [`XmppAdapter::run`].
pub struct RoomSession {
    receiver: XmppReceiver,
    lost: Arc<Notify>,
}

/// The XMPP adapter: one account in one room.
pub struct XmppAdapter {
    connector: Arc<dyn Connector>,
    muc: String,
    nick: String,
    policy: ReconnectPolicy,
    live: SharedLive,
    link: LinkState,
    joined_before: AtomicBool,
}

impl XmppAdapter {
    /// Create a disconnected adapter for the configured account and room.
    pub fn new(config: &XmppConfig, link: LinkState) -> Self {
        Self::with_connector(
            Arc::new(TcpConnector::new(XmppOptions::from_config(config))),
            &config.muc,
            &config.nick,
            ReconnectPolicy::fixed(Duration::from_secs(config.reconnect_interval_secs)),
            link,
        )
    }

    /// Create a disconnected adapter that opens sessions through `connector`.
    pub fn with_connector(
        connector: Arc<dyn Connector>,
        muc: &str,
        nick: &str,
        policy: ReconnectPolicy,
        link: LinkState,
    ) -> Self {
        link.set_connected(false);
        Self {
            connector,
            muc: muc.to_owned(),
            nick: nick.to_owned(),
            policy,
            live: Arc::new(Mutex::new(None)),
            link,
            joined_before: AtomicBool::new(false),
        }
    }

    /// Outbound handle for the router.
    pub fn sink(&self) -> XmppSink {
        XmppSink {
            muc: self.muc.clone(),
            live: Arc::clone(&self.live),
        }
    }

    /// Open a session and join the room.
    ///
    /// # Errors
    ///
    /// Returns an error if session setup fails or takes longer than
    /// thirty seconds, or if the join cannot be written.
    pub async fn connect(&self) -> Result<RoomSession, ConnectError> {
        let protocol = |source: ProtocolError| ConnectError::Protocol {
            network: Network::Xmpp,
            server: self.connector.server().to_owned(),
            source,
        };

        let (mut sender, receiver) = tokio::time::timeout(CONNECT_TIMEOUT, self.connector.open())
            .await
            .map_err(|_| protocol(ProtocolError::TimedOut("opening session")))?
            .map_err(protocol)?;
        sender
            .join_muc(&self.muc, &self.nick)
            .await
            .map_err(|e| protocol(e.into()))?;

        if self.joined_before.swap(true, Ordering::SeqCst) {
            debug!(network = "xmpp", muc = %self.muc, "rejoined room");
        } else {
            info!(network = "xmpp", muc = %self.muc, nick = %self.nick, "joined room");
        }

        let lost = Arc::new(Notify::new());
        *self.live.lock().await = Some(Live {
            sender,
            lost: Arc::clone(&lost),
        });
        Ok(RoomSession { receiver, lost })
    }

    /// Receive loop under reconnect supervision.
    ///
    /// `initial` is the session made at startup, or `None` when that
    /// attempt failed. Returns only when the router side of `events` is gone.
    pub async fn run(self, initial: Option<RoomSession>, events: mpsc::Sender<RelayMessage>) {
        let mut supervisor = if initial.is_some() {
            Supervisor::new(Network::Xmpp, self.policy, self.link.clone())
        } else {
            Supervisor::disconnected(Network::Xmpp, self.policy, self.link.clone())
        };

        let mut session = match initial {
            Some(session) => session,
            None => supervisor.reconnect(|| self.connect()).await,
        };

        loop {
            match self.receive(&mut session, &events).await {
                Ok(()) => {
                    info!(network = "xmpp", "router gone, stopping receive loop");
                    return;
                }
                Err(e) => {
                    let stale = self.live.lock().await.take();
                    if let Some(live) = stale {
                        live.sender.close().await;
                    }
                    supervisor.connection_lost(&e);
                    session = supervisor.reconnect(|| self.connect()).await;
                }
            }
        }
    }

    /// Receive until the stream fails or a send drops the session (`Err`),
    /// or the router drops its receiver (`Ok`).
    async fn receive(
        &self,
        session: &mut RoomSession,
        events: &mpsc::Sender<RelayMessage>,
    ) -> Result<(), ProtocolError> {
        loop {
            let stanza = tokio::select! {
                stanza = session.receiver.recv() => stanza?,
                () = session.lost.notified() => return Err(ProtocolError::WriteFailed),
            };
            match stanza {
                Stanza::Chat(chat) => {
                    let Some(msg) = room_message(&self.muc, &self.nick, &chat) else {
                        continue;
                    };
                    if events.send(msg).await.is_err() {
                        return Ok(());
                    }
                }
                Stanza::Ping { id, from } => {
                    let mut guard = self.live.lock().await;
                    let Some(live) = guard.as_mut() else {
                        return Err(ProtocolError::WriteFailed);
                    };
                    live.sender.pong(&id, &from).await?;
                }
                Stanza::Other(name) => debug!(network = "xmpp", stanza = %name, "ignored"),
            }
        }
    }
}

/// Router-facing sink that posts to the room.
#[derive(Clone)]
pub struct XmppSink {
    muc: String,
    live: SharedLive,
}

#[async_trait]
impl ChannelSink for XmppSink {
    async fn send_line(&self, line: &str) -> Result<(), SendError> {
        let mut guard = self.live.lock().await;
        let Some(live) = guard.as_mut() else {
            return Err(SendError::NotConnected(Network::Xmpp));
        };
        let Err(e) = live.sender.send_groupchat(&self.muc, line).await else {
            return Ok(());
        };
        // The stream may hold a partial stanza; give it up and let the
        // receive loop reconnect.
        if let Some(dead) = guard.take() {
            dead.lost.notify_one();
        }
        Err(SendError::Failed {
            network: Network::Xmpp,
            reason: e.to_string(),
        })
    }
}
