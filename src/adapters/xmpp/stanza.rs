//! Minimal XMPP stanza model: a streaming element reader over quick-xml
//! and the handful of outbound stanzas the bridge sends.

use std::borrow::Cow;

use base64::Engine;
use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tokio::io::AsyncBufRead;

use crate::adapters::ProtocolError;

/// Namespaces used during negotiation.
pub mod ns {
    /// Client stream content.
    pub const CLIENT: &str = "jabber:client";
    /// Stream framing.
    pub const STREAM: &str = "http://etherx.jabber.org/streams";
    /// STARTTLS negotiation.
    pub const TLS: &str = "urn:ietf:params:xml:ns:xmpp-tls";
    /// SASL authentication.
    pub const SASL: &str = "urn:ietf:params:xml:ns:xmpp-sasl";
    /// Resource binding.
    pub const BIND: &str = "urn:ietf:params:xml:ns:xmpp-bind";
    /// Legacy session establishment.
    pub const SESSION: &str = "urn:ietf:params:xml:ns:xmpp-session";
    /// Multi-user chat.
    pub const MUC: &str = "http://jabber.org/protocol/muc";
}

/// Id of the resource bind request.
pub const BIND_ID: &str = "bind_1";

/// Id of the session request.
pub const SESSION_ID: &str = "sess_1";

/// A parsed element with its subtree. Names are local names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    /// Local name, prefix stripped.
    pub name: String,
    /// Attributes in document order, keys as written.
    pub attrs: Vec<(String, String)>,
    /// Child elements.
    pub children: Vec<Element>,
    /// Concatenated text content.
    pub text: String,
}

impl Element {
    /// Value of attribute `key`.
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    /// First child named `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.name == name)
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<Element, ProtocolError> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr.unescape_value()?.into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        ..Element::default()
    })
}

/// Reads one top-level stanza at a time from an XMPP stream.
pub struct StanzaReader<R> {
    reader: Reader<R>,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> StanzaReader<R> {
    /// Start reading a new stream from `inner`.
    pub fn new(inner: R) -> Self {
        let mut reader = Reader::from_reader(inner);
        // The stream root may have been opened on a previous reader.
        reader.config_mut().check_end_names = false;
        Self {
            reader,
            buf: Vec::with_capacity(4096),
        }
    }

    /// Read up to and including the `<stream:stream>` open tag.
    ///
    /// # Errors
    ///
    /// Returns an error if the peer sends anything else first.
    pub async fn read_stream_header(&mut self) -> Result<Element, ProtocolError> {
        loop {
            self.buf.clear();
            match self.reader.read_event_into_async(&mut self.buf).await? {
                Event::Start(start) => {
                    let header = element_from_start(&start)?;
                    if header.name != "stream" {
                        return Err(ProtocolError::Unexpected(format!(
                            "<{}> instead of stream header",
                            header.name
                        )));
                    }
                    return Ok(header);
                }
                Event::Eof => return Err(ProtocolError::StreamClosed),
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) | Event::Text(_) => {}
                other => {
                    return Err(ProtocolError::Unexpected(format!(
                        "{other:?} instead of stream header"
                    )))
                }
            }
        }
    }

    /// Read the next complete top-level element.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::StreamClosed`] at `</stream:stream>` or EOF,
    /// and an XML error for malformed input.
    pub async fn next_element(&mut self) -> Result<Element, ProtocolError> {
        let mut stack: Vec<Element> = Vec::new();
        loop {
            self.buf.clear();
            let complete = match self.reader.read_event_into_async(&mut self.buf).await? {
                Event::Start(start) => {
                    stack.push(element_from_start(&start)?);
                    None
                }
                Event::Empty(start) => Some(element_from_start(&start)?),
                Event::End(_) => match stack.pop() {
                    Some(element) => Some(element),
                    None => return Err(ProtocolError::StreamClosed),
                },
                Event::Text(text) => {
                    if let Some(top) = stack.last_mut() {
                        top.text.push_str(&text.unescape()?);
                    }
                    None
                }
                Event::CData(data) => {
                    if let Some(top) = stack.last_mut() {
                        let raw = data.into_inner();
                        top.text.push_str(&String::from_utf8_lossy(&raw));
                    }
                    None
                }
                Event::Eof => return Err(ProtocolError::StreamClosed),
                Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => None,
            };

            if let Some(element) = complete {
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
        }
    }

    /// The underlying reader.
    pub fn get_mut(&mut self) -> &mut R {
        self.reader.get_mut()
    }

    /// Give back the underlying reader, e.g. to restart the stream.
    pub fn into_inner(self) -> R {
        self.reader.into_inner()
    }
}

// ---------------------------------------------------------------------------
// Inbound classification
// ---------------------------------------------------------------------------

/// A `<message>` with a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Full sender JID; `room/nick` for MUC traffic.
    pub from: String,
    /// `type` attribute.
    pub kind: String,
    /// Body text.
    pub body: String,
    /// Carries a delay stamp, i.e. replayed history.
    pub delayed: bool,
}

/// An inbound stanza, as far as the bridge cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stanza {
    /// A message with a body.
    Chat(ChatMessage),
    /// An XEP-0199 ping that must be answered.
    Ping {
        /// Request id.
        id: String,
        /// Requesting entity.
        from: String,
    },
    /// Anything else; carries the element name.
    Other(String),
}

impl Stanza {
    /// Classify a top-level element.
    pub fn classify(element: Element) -> Self {
        match element.name.as_str() {
            "message" => {
                let Some(body) = element.child("body") else {
                    return Stanza::Other(element.name);
                };
                Stanza::Chat(ChatMessage {
                    from: element.attr("from").unwrap_or_default().to_owned(),
                    kind: element.attr("type").unwrap_or("normal").to_owned(),
                    body: body.text.clone(),
                    delayed: element.child("delay").is_some(),
                })
            }
            "iq" if element.attr("type") == Some("get") && element.child("ping").is_some() => {
                Stanza::Ping {
                    id: element.attr("id").unwrap_or_default().to_owned(),
                    from: element.attr("from").unwrap_or_default().to_owned(),
                }
            }
            _ => Stanza::Other(element.name),
        }
    }
}

// ---------------------------------------------------------------------------
// Outbound stanzas
// ---------------------------------------------------------------------------

fn esc(value: &str) -> Cow<'_, str> {
    escape(value)
}

/// Opening tag of a client stream to `domain`.
pub fn stream_header(domain: &str) -> String {
    format!(
        "<?xml version='1.0'?><stream:stream to='{}' xmlns='{}' xmlns:stream='{}' version='1.0'>",
        esc(domain),
        ns::CLIENT,
        ns::STREAM
    )
}

/// STARTTLS request.
pub fn starttls() -> String {
    format!("<starttls xmlns='{}'/>", ns::TLS)
}

/// SASL PLAIN authentication with an empty authorization identity.
pub fn sasl_plain(username: &str, password: &str) -> String {
    let credentials = format!("\0{username}\0{password}");
    let encoded = base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());
    format!(
        "<auth xmlns='{}' mechanism='PLAIN'>{}</auth>",
        ns::SASL,
        encoded
    )
}

/// Resource bind request.
pub fn bind(resource: &str) -> String {
    format!(
        "<iq type='set' id='{}'><bind xmlns='{}'><resource>{}</resource></bind></iq>",
        BIND_ID,
        ns::BIND,
        esc(resource)
    )
}

/// Legacy session request.
pub fn session() -> String {
    format!(
        "<iq type='set' id='{}'><session xmlns='{}'/></iq>",
        SESSION_ID,
        ns::SESSION
    )
}

/// Initial presence advertising `show` and a status line.
pub fn presence(show: &str, status: &str) -> String {
    format!(
        "<presence><show>{}</show><status>{}</status></presence>",
        esc(show),
        esc(status)
    )
}

/// Room join that asks for no history replay.
pub fn muc_join(room: &str, nick: &str) -> String {
    format!(
        "<presence to='{}/{}'><x xmlns='{}'><history maxstanzas='0'/></x></presence>",
        esc(room),
        esc(nick),
        ns::MUC
    )
}

/// Group chat message to `room`.
pub fn groupchat(room: &str, body: &str) -> String {
    format!(
        "<message to='{}' type='groupchat'><body>{}</body></message>",
        esc(room),
        esc(body)
    )
}

/// Closing tag of the stream.
pub const STREAM_CLOSE: &str = "</stream:stream>";

/// Answer to a ping.
pub fn pong(id: &str, to: &str) -> String {
    format!("<iq type='result' id='{}' to='{}'/>", esc(id), esc(to))
}
