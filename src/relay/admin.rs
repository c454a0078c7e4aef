//! Telegram admin commands: `/start` binds the relay group, `/status`
//! reports the relay state privately to the admin who asked.

use std::sync::Arc;

use super::message::TelegramOrigin;
use super::stats::{LinkStates, RelayStats};
use super::target::ActiveGroupTarget;

/// A recognized admin command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    /// Bind the relay to the current group.
    Start,
    /// Report relay status.
    Status,
}

impl AdminCommand {
    /// Parse `/start`, `/status` and their `/cmd@botname` forms.
    pub fn parse(text: &str) -> Option<Self> {
        let without_slash = text.trim().strip_prefix('/')?;
        let full_command = without_slash
            .split_whitespace()
            .next()
            .unwrap_or(without_slash);
        // Strip @bot_name suffix if present
        let command = full_command.split('@').next().unwrap_or(full_command);
        match command {
            "start" => Some(Self::Start),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

/// What the handler decided for one Telegram message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminAction {
    /// Not an admin command; relay it normally.
    NotCommand,
    /// The relay group was (re)bound.
    Bound {
        /// Newly bound chat.
        chat_id: i64,
        /// Chat bound before, if any.
        previous: Option<i64>,
    },
    /// Send `text` privately to `chat_id`.
    StatusReply {
        /// The admin's own chat.
        chat_id: i64,
        /// Status report.
        text: String,
    },
    /// Admin command with no effect; swallowed.
    Ignored,
}

/// Intercepts admin commands before Telegram messages reach the router.
#[derive(Debug, Clone)]
pub struct AdminHandler {
    admins: Vec<String>,
    target: Arc<ActiveGroupTarget>,
    links: LinkStates,
    stats: Arc<RelayStats>,
}

impl AdminHandler {
    /// Create a handler for the given admin usernames.
    pub fn new(
        admins: Vec<String>,
        target: Arc<ActiveGroupTarget>,
        links: LinkStates,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            admins,
            target,
            links,
            stats,
        }
    }

    /// Whether `username` is on the admin list.
    pub fn is_admin(&self, username: Option<&str>) -> bool {
        username.is_some_and(|name| self.admins.iter().any(|admin| admin == name))
    }

    /// Decide what to do with a message from `origin`.
    ///
    /// Only `/`-prefixed text from an admin is intercepted; every other
    /// message, including slash text from non-admins, is relayed.
    pub fn handle(&self, origin: &TelegramOrigin, text: &str) -> AdminAction {
        if !text.starts_with('/') || !self.is_admin(origin.sender_username.as_deref()) {
            return AdminAction::NotCommand;
        }

        match AdminCommand::parse(text) {
            Some(AdminCommand::Start) if origin.is_group => {
                let previous = self.target.bind(origin.chat_id);
                AdminAction::Bound {
                    chat_id: origin.chat_id,
                    previous,
                }
            }
            Some(AdminCommand::Status) => AdminAction::StatusReply {
                chat_id: origin.sender_id,
                text: self.status_report(),
            },
            Some(AdminCommand::Start) | None => AdminAction::Ignored,
        }
    }

    /// The `/status` text.
    pub fn status_report(&self) -> String {
        format!(
            "groupId: {}, IRC: {}, Gitter: {}, XMPP: {}\nfailed sends: {}",
            self.target.raw(),
            self.links.irc.is_connected(),
            self.links.gitter.is_connected(),
            self.links.xmpp.is_connected(),
            self.stats.failure_summary(),
        )
    }
}
