//! The message every adapter produces and the router consumes.

use std::fmt;

/// One of the four bridged networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Network {
    /// Plain IRC channel.
    Irc,
    /// Gitter room over its IRC gateway.
    Gitter,
    /// Telegram group.
    Telegram,
    /// XMPP multi-user chat.
    Xmpp,
}

impl Network {
    /// All networks, in a fixed order.
    pub const ALL: [Network; 4] = [
        Network::Irc,
        Network::Gitter,
        Network::Telegram,
        Network::Xmpp,
    ];

    /// Lowercase identifier used in log fields.
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Irc => "irc",
            Network::Gitter => "gitter",
            Network::Telegram => "telegram",
            Network::Xmpp => "xmpp",
        }
    }

    /// Position in [`Network::ALL`].
    pub fn index(self) -> usize {
        match self {
            Network::Irc => 0,
            Network::Gitter => 1,
            Network::Telegram => 2,
            Network::Xmpp => 3,
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Network::Irc => "IRC",
            Network::Gitter => "Gitter",
            Network::Telegram => "Telegram",
            Network::Xmpp => "XMPP",
        };
        f.write_str(label)
    }
}

/// Whether a message is conversation or a service notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    /// Written by a person.
    #[default]
    Normal,
    /// Posted by the network's own service account.
    Status,
}

/// Where a Telegram message came from, needed for admin commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelegramOrigin {
    /// Chat the message was posted in.
    pub chat_id: i64,
    /// Whether that chat is a group or supergroup.
    pub is_group: bool,
    /// Telegram user id of the sender.
    pub sender_id: i64,
    /// Sender's `@username`, without the `@`.
    pub sender_username: Option<String>,
}

/// A chat line received on one network, to be relayed to the others.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayMessage {
    /// Network the message arrived on.
    pub source: Network,
    /// Display name of the sender.
    pub author: String,
    /// Raw message text.
    pub text: String,
    /// Conversation or status notice.
    pub kind: MessageKind,
    /// Present only for messages from Telegram.
    pub telegram: Option<TelegramOrigin>,
}

impl RelayMessage {
    /// A normal message.
    pub fn new(source: Network, author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            source,
            author: author.into(),
            text: text.into(),
            kind: MessageKind::Normal,
            telegram: None,
        }
    }

    /// A status notice from a service account.
    pub fn status(source: Network, author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Status,
            ..Self::new(source, author, text)
        }
    }

    /// Attach the Telegram chat and sender details.
    pub fn with_telegram_origin(mut self, origin: TelegramOrigin) -> Self {
        self.telegram = Some(origin);
        self
    }

    /// Whether this is a status notice.
    pub fn is_status(&self) -> bool {
        self.kind == MessageKind::Status
    }
}
