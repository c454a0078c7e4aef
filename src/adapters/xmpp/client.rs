//! XMPP client connection: STARTTLS, SASL PLAIN, resource binding, then a
//! split into a receive half and a send half.

use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tracing::{debug, info};

use super::stanza::{self, Element, Stanza, StanzaReader};
use crate::adapters::{ProtocolError, SEND_TIMEOUT};
use crate::config::XmppConfig;
use crate::transport::{self, BoxedIo};

/// Resource requested at bind time.
const DEFAULT_RESOURCE: &str = "chatbridge";

/// How long [`XmppSender::close`] waits for a dead socket.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

type Negotiating = StanzaReader<BufReader<BoxedIo>>;

/// Account settings for one connection.
#[derive(Debug, Clone)]
pub struct XmppOptions {
    /// Server address as `host:port`.
    pub server: String,
    /// Account JID, `user@domain`.
    pub jid: String,
    /// Account password.
    pub password: String,
    /// Resource to bind.
    pub resource: String,
    /// Status line advertised with presence.
    pub status_message: String,
}

impl XmppOptions {
    /// Options from configuration.
    pub fn from_config(config: &XmppConfig) -> Self {
        Self {
            server: config.server.clone(),
            jid: config.jid.clone(),
            password: config.password.clone(),
            resource: DEFAULT_RESOURCE.to_owned(),
            status_message: config.status_message.clone(),
        }
    }

    /// Local part of the JID.
    pub fn username(&self) -> &str {
        self.jid.split_once('@').map_or(self.jid.as_str(), |(local, _)| local)
    }

    /// Domain part of the JID, without any resource.
    pub fn domain(&self) -> &str {
        let bare = self.jid.split('/').next().unwrap_or(&self.jid);
        bare.split_once('@').map_or(bare, |(_, domain)| domain)
    }
}

async fn write_all(stream: &mut Negotiating, data: &str) -> Result<(), ProtocolError> {
    let io = stream.get_mut().get_mut();
    io.write_all(data.as_bytes()).await?;
    io.flush().await?;
    Ok(())
}

/// Open a stream over `io` and read the server's features.
async fn open_stream(io: BoxedIo, domain: &str) -> Result<(Negotiating, Element), ProtocolError> {
    let mut stream = StanzaReader::new(BufReader::new(io));
    write_all(&mut stream, &stanza::stream_header(domain)).await?;
    stream.read_stream_header().await?;
    let features = stream.next_element().await?;
    if features.name != "features" {
        return Err(ProtocolError::Unexpected(format!(
            "<{}> instead of stream features",
            features.name
        )));
    }
    Ok((stream, features))
}

fn offers_mechanism(features: &Element, mechanism: &str) -> bool {
    features.child("mechanisms").is_some_and(|mechanisms| {
        mechanisms
            .children
            .iter()
            .any(|m| m.name == "mechanism" && m.text.trim() == mechanism)
    })
}

/// Read until the `iq` result with `id` arrives.
async fn await_iq(stream: &mut Negotiating, id: &str) -> Result<Element, ProtocolError> {
    loop {
        let element = stream.next_element().await?;
        if element.name == "iq" && element.attr("id") == Some(id) {
            if element.attr("type") == Some("error") {
                return Err(ProtocolError::Unexpected(format!("error reply to {id}")));
            }
            return Ok(element);
        }
        debug!(network = "xmpp", element = %element.name, "skipped during negotiation");
    }
}

/// Connect, secure, authenticate and bind, then announce presence.
///
/// # Errors
///
/// Returns an error if any negotiation step fails.
pub async fn connect(options: &XmppOptions) -> Result<(XmppSender, XmppReceiver), ProtocolError> {
    let domain = options.domain();

    let tcp: BoxedIo = Box::new(transport::connect_tcp(&options.server).await?);
    let (mut stream, features) = open_stream(tcp, domain).await?;
    if features.child("starttls").is_none() {
        return Err(ProtocolError::TlsUnavailable);
    }
    write_all(&mut stream, &stanza::starttls()).await?;
    let answer = stream.next_element().await?;
    if answer.name != "proceed" {
        return Err(ProtocolError::Unexpected(format!("<{}> after starttls", answer.name)));
    }

    let tls = transport::upgrade_tls(stream.into_inner().into_inner(), domain).await?;
    let (mut stream, features) = open_stream(Box::new(tls), domain).await?;
    if !offers_mechanism(&features, "PLAIN") {
        return Err(ProtocolError::AuthFailed("server does not offer PLAIN".to_owned()));
    }
    write_all(
        &mut stream,
        &stanza::sasl_plain(options.username(), &options.password),
    )
    .await?;
    let answer = stream.next_element().await?;
    match answer.name.as_str() {
        "success" => {}
        "failure" => {
            let condition = answer
                .children
                .first()
                .map_or_else(|| "unknown".to_owned(), |c| c.name.clone());
            return Err(ProtocolError::AuthFailed(condition));
        }
        other => return Err(ProtocolError::Unexpected(format!("<{other}> after auth"))),
    }

    let (mut stream, features) = open_stream(stream.into_inner().into_inner(), domain).await?;
    write_all(&mut stream, &stanza::bind(&options.resource)).await?;
    let bound = await_iq(&mut stream, stanza::BIND_ID).await?;
    let jid = bound
        .child("bind")
        .and_then(|bind| bind.child("jid"))
        .map_or_else(|| options.jid.clone(), |jid| jid.text.trim().to_owned());

    let session_required = features
        .child("session")
        .is_some_and(|session| session.child("optional").is_none());
    if session_required {
        write_all(&mut stream, &stanza::session()).await?;
        await_iq(&mut stream, stanza::SESSION_ID).await?;
    }

    write_all(&mut stream, &stanza::presence("chat", &options.status_message)).await?;
    info!(network = "xmpp", jid = %jid, "session established");

    Ok(split_session(stream.into_inner()))
}

/// Split a negotiated stream into its send and receive halves.
///
/// The stream root must already be open; the receiver starts at the next
/// top-level stanza.
pub fn split_session(stream: BufReader<BoxedIo>) -> (XmppSender, XmppReceiver) {
    let (read, write) = tokio::io::split(stream);
    (
        XmppSender { writer: write },
        XmppReceiver {
            reader: StanzaReader::new(BufReader::new(read)),
        },
    )
}

/// Receive half of an established session.
pub struct XmppReceiver {
    reader: StanzaReader<BufReader<ReadHalf<BufReader<BoxedIo>>>>,
}

impl XmppReceiver {
    /// Wait for the next stanza.
    ///
    /// # Errors
    ///
    /// Returns an error when the stream ends, breaks, or carries a stream error.
    pub async fn recv(&mut self) -> Result<Stanza, ProtocolError> {
        let element = self.reader.next_element().await?;
        if element.name == "error" {
            let condition = element
                .children
                .first()
                .map_or("unknown", |c| c.name.as_str());
            return Err(ProtocolError::Unexpected(format!("stream error {condition}")));
        }
        Ok(Stanza::classify(element))
    }
}

/// Send half of an established session.
pub struct XmppSender {
    writer: WriteHalf<BufReader<BoxedIo>>,
}

impl XmppSender {
    async fn write(&mut self, data: &str) -> std::io::Result<()> {
        let writer = &mut self.writer;
        tokio::time::timeout(SEND_TIMEOUT, async {
            writer.write_all(data.as_bytes()).await?;
            writer.flush().await
        })
        .await
        .unwrap_or_else(|_| {
            Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "peer stopped reading",
            ))
        })
    }

    /// Post `body` to `room`.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket write fails or stalls.
    pub async fn send_groupchat(&mut self, room: &str, body: &str) -> std::io::Result<()> {
        self.write(&stanza::groupchat(room, body)).await
    }

    /// Join `room` as `nick` without history replay.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket write fails.
    pub async fn join_muc(&mut self, room: &str, nick: &str) -> std::io::Result<()> {
        self.write(&stanza::muc_join(room, nick)).await
    }

    /// Answer a ping.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket write fails.
    pub async fn pong(&mut self, id: &str, to: &str) -> std::io::Result<()> {
        self.write(&stanza::pong(id, to)).await
    }

    /// Close the stream, giving up after a short grace period.
    pub async fn close(mut self) {
        let closing = async {
            self.write(stanza::STREAM_CLOSE).await?;
            self.writer.shutdown().await
        };
        match tokio::time::timeout(CLOSE_GRACE, closing).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(network = "xmpp", error = %e, "stream close failed"),
            Err(_) => debug!(network = "xmpp", "stream close timed out"),
        }
    }
}
