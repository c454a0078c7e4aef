//! IRC-family adapter, used for both the IRC network and the Gitter gateway.
//!
//! The client registers, joins the configured channel once the server
//! welcomes it (`001`), answers `PING`, and turns channel `PRIVMSG`s into
//! [`RelayMessage`]s. When the socket drops it reconnects on its own after
//! a fixed delay; the sink reports [`SendError::NotConnected`] meanwhile.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use super::{ConnectError, ProtocolError, SEND_TIMEOUT};
use crate::config::{GitterConfig, IrcConfig};
use crate::relay::stats::LinkState;
use crate::relay::{ChannelSink, Network, RelayMessage, SendError};
use crate::transport::{self, BoxedIo};

/// Delay before the client redials a dropped connection.
const RECONNECT_DELAY_SECS: u64 = 10;

/// Limit on opening the socket, TLS handshake included.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// A connection with no traffic for this long is considered dead. Servers
/// `PING` far more often than this.
const READ_TIMEOUT_SECS: u64 = 300;

type SharedWriter = Arc<Mutex<Option<WriteHalf<BoxedIo>>>>;

/// Buffered read side of a registered connection.
pub type LineReader = BufReader<ReadHalf<BoxedIo>>;

/// Connection settings for one IRC-family network.
#[derive(Debug, Clone)]
pub struct IrcSettings {
    /// Which network this client serves.
    pub network: Network,
    /// Server address as `host:port`.
    pub server: String,
    /// Connect with TLS.
    pub use_tls: bool,
    /// Server password.
    pub password: Option<String>,
    /// Requested nick.
    pub nick: String,
    /// Channel to join.
    pub channel: String,
    /// NickServ password.
    pub identify: Option<String>,
    /// Sender whose messages are status notices.
    pub service_nick: Option<String>,
    /// Delay between redial attempts.
    pub reconnect_delay: Duration,
}

impl IrcSettings {
    /// Settings for the plain IRC network.
    pub fn for_irc(config: &IrcConfig) -> Self {
        Self {
            network: Network::Irc,
            server: config.server.clone(),
            use_tls: config.use_tls,
            password: non_empty(&config.password),
            nick: config.nick.clone(),
            channel: config.channel.clone(),
            identify: non_empty(&config.identify),
            service_nick: None,
            reconnect_delay: Duration::from_secs(RECONNECT_DELAY_SECS),
        }
    }

    /// Settings for the Gitter gateway: TLS always on, service bot notices.
    pub fn for_gitter(config: &GitterConfig) -> Self {
        Self {
            network: Network::Gitter,
            server: config.server.clone(),
            use_tls: true,
            password: non_empty(&config.password),
            nick: config.nick.clone(),
            channel: config.channel.clone(),
            identify: None,
            service_nick: non_empty(&config.service_nick),
            reconnect_delay: Duration::from_secs(RECONNECT_DELAY_SECS),
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

/// One parsed IRC protocol line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcLine {
    /// Source prefix, `nick!user@host` or a server name.
    pub prefix: Option<String>,
    /// Command or three-digit numeric, upper-cased.
    pub command: String,
    /// Parameters; the trailing parameter is last.
    pub params: Vec<String>,
}

impl IrcLine {
    /// Parse a raw line. IRCv3 message tags are skipped.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut rest = raw.trim_end_matches(['\r', '\n']);
        if let Some(tagged) = rest.strip_prefix('@') {
            rest = tagged.split_once(' ')?.1;
        }

        let prefix = match rest.strip_prefix(':') {
            Some(prefixed) => {
                let (prefix, remainder) = prefixed.split_once(' ')?;
                rest = remainder;
                Some(prefix.to_owned())
            }
            None => None,
        };

        let (head, trailing) = match rest.split_once(" :") {
            Some((head, trailing)) => (head, Some(trailing)),
            None => (rest, None),
        };

        let mut parts = head.split(' ').filter(|part| !part.is_empty());
        let command = parts.next()?.to_ascii_uppercase();
        let mut params: Vec<String> = parts.map(str::to_owned).collect();
        if let Some(trailing) = trailing {
            params.push(trailing.to_owned());
        }

        Some(Self {
            prefix,
            command,
            params,
        })
    }

    /// Nick part of the prefix.
    pub fn nick(&self) -> Option<&str> {
        let prefix = self.prefix.as_deref()?;
        prefix.split('!').next()
    }

    /// Parameter at `index`.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }
}

/// Per-connection protocol state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    /// Nick the server knows us by.
    pub nick: String,
    /// Whether our own channel join was already seen.
    pub joined: bool,
}

impl SessionState {
    /// Fresh state for a connection registering as `nick`.
    pub fn new(nick: &str) -> Self {
        Self {
            nick: nick.to_owned(),
            joined: false,
        }
    }
}

/// What to do in response to one server line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrcAction {
    /// Write this line to the server.
    Send(String),
    /// Our own join of this channel completed.
    Joined(String),
    /// Hand this message to the router.
    Relay(RelayMessage),
}

/// Lines sent right after connecting.
pub fn registration(settings: &IrcSettings) -> Vec<String> {
    let mut lines = Vec::with_capacity(3);
    if let Some(password) = &settings.password {
        lines.push(format!("PASS {password}"));
    }
    lines.push(format!("NICK {}", settings.nick));
    lines.push(format!("USER {0} 0 * :{0}", settings.nick));
    lines
}

/// React to one server line.
pub fn interpret(settings: &IrcSettings, state: &mut SessionState, line: &IrcLine) -> Vec<IrcAction> {
    match line.command.as_str() {
        "PING" => vec![IrcAction::Send(format!("PONG :{}", line.param(0).unwrap_or("")))],
        "001" => {
            if let Some(nick) = line.param(0) {
                state.nick = nick.to_owned();
            }
            let mut actions = Vec::with_capacity(2);
            if let Some(password) = &settings.identify {
                actions.push(IrcAction::Send(format!("PRIVMSG NickServ :identify {password}")));
            }
            actions.push(IrcAction::Send(format!("JOIN {}", settings.channel)));
            actions
        }
        // ERR_NICKNAMEINUSE before registration completes.
        "433" => {
            state.nick.push('_');
            vec![IrcAction::Send(format!("NICK {}", state.nick))]
        }
        "JOIN" => {
            let own = line
                .nick()
                .is_some_and(|nick| nick.eq_ignore_ascii_case(&state.nick));
            if own && !state.joined {
                state.joined = true;
                let channel = line.param(0).unwrap_or(&settings.channel).to_owned();
                return vec![IrcAction::Joined(channel)];
            }
            Vec::new()
        }
        "PRIVMSG" => relay_privmsg(settings, state, line)
            .map(IrcAction::Relay)
            .into_iter()
            .collect(),
        _ => Vec::new(),
    }
}

fn relay_privmsg(settings: &IrcSettings, state: &SessionState, line: &IrcLine) -> Option<RelayMessage> {
    let target = line.param(0)?;
    let text = line.param(1)?;
    let nick = line.nick()?;

    if !target.eq_ignore_ascii_case(&settings.channel) || nick.eq_ignore_ascii_case(&state.nick) {
        return None;
    }

    let text = match text.strip_prefix('\u{1}') {
        Some(ctcp) => {
            // Only /me survives; other CTCP requests are not chat.
            let action = ctcp.strip_prefix("ACTION ")?;
            format!("* {}", action.trim_end_matches('\u{1}'))
        }
        None => text.to_owned(),
    };

    let is_service = settings
        .service_nick
        .as_deref()
        .is_some_and(|service| service.eq_ignore_ascii_case(nick));
    if is_service {
        Some(RelayMessage::status(settings.network, nick, text))
    } else {
        Some(RelayMessage::new(settings.network, nick, text))
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A self-healing IRC client bound to one channel.
pub struct IrcClient {
    settings: IrcSettings,
    writer: SharedWriter,
    link: LinkState,
}

impl IrcClient {
    /// Create a disconnected client.
    pub fn new(settings: IrcSettings, link: LinkState) -> Self {
        link.set_connected(false);
        Self {
            settings,
            writer: Arc::new(Mutex::new(None)),
            link,
        }
    }

    /// Outbound handle for the router.
    pub fn sink(&self) -> IrcSink {
        IrcSink {
            network: self.settings.network,
            channel: self.settings.channel.clone(),
            writer: Arc::clone(&self.writer),
        }
    }

    /// Open the connection and send registration.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket cannot be opened or registration
    /// cannot be written.
    pub async fn connect(&self) -> Result<LineReader, ConnectError> {
        let network = self.settings.network;
        let server = &self.settings.server;

        let dial = tokio::time::timeout(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            transport::connect(server, self.settings.use_tls),
        )
        .await
        .unwrap_or_else(|_| {
            Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out").into())
        });
        let io = dial.map_err(|source| ConnectError::Transport {
            network,
            server: server.clone(),
            source,
        })?;
        let (read, write) = tokio::io::split(io);
        *self.writer.lock().await = Some(write);

        for line in registration(&self.settings) {
            write_line(&self.writer, &line)
                .await
                .map_err(|e| ConnectError::Protocol {
                    network,
                    server: server.clone(),
                    source: e.into(),
                })?;
        }

        self.link.set_connected(true);
        info!(network = network.as_str(), server = %server, "connected");
        Ok(BufReader::new(read))
    }

    /// Receive loop. Redials with a fixed delay whenever the connection drops.
    ///
    /// Returns only when the router side of `events` is gone.
    pub async fn run(self, reader: LineReader, events: mpsc::Sender<RelayMessage>) {
        let network = self.settings.network.as_str();
        let mut reader = reader;
        let mut state = SessionState::new(&self.settings.nick);

        loop {
            let error = match self.read_loop(&mut reader, &mut state, &events).await {
                Ok(()) => {
                    info!(network, "router gone, stopping receive loop");
                    return;
                }
                Err(e) => e,
            };

            self.link.set_connected(false);
            self.writer.lock().await.take();
            warn!(network, error = %error, "connection lost");

            reader = loop {
                tokio::time::sleep(self.settings.reconnect_delay).await;
                match self.connect().await {
                    Ok(reader) => break reader,
                    Err(e) => warn!(network, error = %e, "reconnect failed"),
                }
            };
            state = SessionState {
                nick: self.settings.nick.clone(),
                ..state
            };
        }
    }

    /// Read and handle lines until the connection fails (`Err`) or the
    /// router drops its receiver (`Ok`).
    async fn read_loop(
        &self,
        reader: &mut LineReader,
        state: &mut SessionState,
        events: &mpsc::Sender<RelayMessage>,
    ) -> Result<(), ProtocolError> {
        let network = self.settings.network.as_str();
        let mut buf = Vec::with_capacity(512);

        loop {
            buf.clear();
            let read = tokio::time::timeout(
                Duration::from_secs(READ_TIMEOUT_SECS),
                reader.read_until(b'\n', &mut buf),
            )
            .await
            .map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "no traffic from server")
            })??;
            if read == 0 {
                return Err(ProtocolError::StreamClosed);
            }

            let raw = String::from_utf8_lossy(&buf);
            let Some(line) = IrcLine::parse(&raw) else {
                continue;
            };
            if line.command == "ERROR" {
                debug!(network, line = %raw.trim_end(), "server error");
            }

            for action in interpret(&self.settings, state, &line) {
                match action {
                    IrcAction::Send(out) => write_line(&self.writer, &out).await?,
                    IrcAction::Joined(channel) => info!(network, channel = %channel, "joined channel"),
                    IrcAction::Relay(msg) => {
                        if events.send(msg).await.is_err() {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

/// Write one line, waiting at most [`SEND_TIMEOUT`].
///
/// A stalled write may leave half a line on the wire, so the writer is
/// dropped; the read loop's next write then fails and triggers a redial.
async fn write_line(writer: &SharedWriter, line: &str) -> std::io::Result<()> {
    let mut guard = writer.lock().await;
    let Some(stream) = guard.as_mut() else {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotConnected,
            "not connected",
        ));
    };
    let wire = format!("{line}\r\n");
    let outcome = tokio::time::timeout(SEND_TIMEOUT, async {
        stream.write_all(wire.as_bytes()).await?;
        stream.flush().await
    })
    .await;
    match outcome {
        Ok(result) => result,
        Err(_) => {
            guard.take();
            Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "peer stopped reading",
            ))
        }
    }
}

/// Router-facing sink that posts to the client's channel.
#[derive(Clone)]
pub struct IrcSink {
    network: Network,
    channel: String,
    writer: SharedWriter,
}

#[async_trait]
impl ChannelSink for IrcSink {
    async fn send_line(&self, line: &str) -> Result<(), SendError> {
        let text: String = line.chars().filter(|c| *c != '\r' && *c != '\n').collect();
        let wire = format!("PRIVMSG {} :{}", self.channel, text);
        match write_line(&self.writer, &wire).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotConnected => {
                Err(SendError::NotConnected(self.network))
            }
            Err(e) => Err(SendError::Failed {
                network: self.network,
                reason: e.to_string(),
            }),
        }
    }
}
