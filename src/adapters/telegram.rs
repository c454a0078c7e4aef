//! Telegram Bot API adapter -- in-process async long polling.
//!
//! Polls `getUpdates`, normalizes messages into [`RelayMessage`]s carrying
//! their [`TelegramOrigin`], and sends outbound text via `sendMessage`.
//! Photos are re-hosted on imgur when a client id is configured.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::imgur::ImgurClient;
use super::ConnectError;
use crate::relay::router::TelegramSink;
use crate::relay::{Network, RelayMessage, SendError, SendOptions, TelegramOrigin};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Telegram adapter errors.
#[derive(Debug, Error)]
pub enum TelegramError {
    /// The Telegram API returned an error response.
    #[error("Telegram API error: {0}")]
    Api(String),
    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    /// JSON deserialization failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Telegram API types (minimal subset)
// ---------------------------------------------------------------------------

/// Generic Telegram Bot API response wrapper.
#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

/// Telegram `Update` object.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    /// Monotonic update id.
    pub update_id: i64,
    /// New incoming message, if this update carries one.
    #[serde(default)]
    pub message: Option<TgMessage>,
}

/// Telegram `Message` object (subset of fields we use).
#[derive(Debug, Clone, Deserialize)]
pub struct TgMessage {
    /// Message id within the chat.
    pub message_id: i64,
    /// Sender; absent for channel posts.
    #[serde(default)]
    pub from: Option<TgUser>,
    /// Chat the message was posted in.
    pub chat: TgChat,
    /// Text of a text message.
    #[serde(default)]
    pub text: Option<String>,
    /// Caption of a media message.
    #[serde(default)]
    pub caption: Option<String>,
    /// Available sizes of a photo, smallest first.
    #[serde(default)]
    pub photo: Vec<PhotoSize>,
}

/// Telegram `User` object.
#[derive(Debug, Clone, Deserialize)]
pub struct TgUser {
    /// User id; also the id of the private chat with the bot.
    pub id: i64,
    /// First name, always present.
    #[serde(default)]
    pub first_name: String,
    /// `@username` without the `@`.
    #[serde(default)]
    pub username: Option<String>,
}

impl TgUser {
    /// Username if set, else first name.
    pub fn display_name(&self) -> &str {
        match self.username.as_deref() {
            Some(username) if !username.is_empty() => username,
            _ => &self.first_name,
        }
    }
}

/// Telegram `Chat` object.
#[derive(Debug, Clone, Deserialize)]
pub struct TgChat {
    /// Chat id.
    pub id: i64,
    /// `private`, `group`, `supergroup` or `channel`.
    #[serde(rename = "type")]
    pub kind: String,
}

impl TgChat {
    /// Whether this is a group or supergroup.
    pub fn is_group(&self) -> bool {
        matches!(self.kind.as_str(), "group" | "supergroup")
    }
}

/// One size of a photo.
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    /// File id for `getFile`.
    pub file_id: String,
}

/// Telegram `File` object.
#[derive(Debug, Deserialize)]
struct TgFile {
    file_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Wrap a Telegram message with its final relay `text`.
///
/// Returns `None` for messages without a sender.
pub fn normalize(message: &TgMessage, text: String) -> Option<RelayMessage> {
    let user = message.from.as_ref()?;
    let origin = TelegramOrigin {
        chat_id: message.chat.id,
        is_group: message.chat.is_group(),
        sender_id: user.id,
        sender_username: user.username.clone().filter(|name| !name.is_empty()),
    };
    Some(RelayMessage::new(Network::Telegram, user.display_name(), text).with_telegram_origin(origin))
}

/// Relay text for an uploaded photo: caption then link, or just the link.
pub fn photo_text(caption: Option<&str>, link: &str) -> String {
    match caption.map(str::trim) {
        Some(caption) if !caption.is_empty() => format!("{caption} {link}"),
        _ => link.to_owned(),
    }
}

/// Text to relay for a message, given the hosted link of its photo if the
/// upload happened and succeeded.
///
/// Message text wins; otherwise the photo link (after any caption); otherwise
/// the caption alone. `None` when nothing is left to relay.
pub fn relay_text(text: Option<&str>, caption: Option<&str>, photo_link: Option<&str>) -> Option<String> {
    let text = match (text.filter(|text| !text.is_empty()), photo_link) {
        (Some(text), _) => text.to_owned(),
        (None, Some(link)) => photo_text(caption, link),
        (None, None) => caption.unwrap_or_default().to_owned(),
    };
    (!text.trim().is_empty()).then_some(text)
}

/// Request body for `sendMessage`.
pub fn send_message_params(chat_id: i64, text: &str, options: SendOptions) -> serde_json::Value {
    let mut params = serde_json::json!({
        "chat_id": chat_id,
        "text": text,
    });
    if options.quiet {
        params["link_preview_options"] = serde_json::json!({ "is_disabled": true });
        params["disable_notification"] = serde_json::Value::Bool(true);
    }
    params
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Base URL for the Telegram Bot API.
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Initial backoff on poll failure, in milliseconds.
const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Maximum backoff on poll failure, in milliseconds.
const MAX_BACKOFF_MS: u64 = 30_000;

/// Extra seconds added to the HTTP timeout beyond the long-poll timeout,
/// so the TCP socket stays open while Telegram holds the request.
const POLL_TIMEOUT_MARGIN_SECS: u64 = 10;

/// Thin Bot API client.
#[derive(Clone)]
pub struct TelegramClient {
    client: reqwest::Client,
    token: String,
}

impl std::fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramClient")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl TelegramClient {
    /// Create a client for the bot `token`.
    pub fn new(client: reqwest::Client, token: impl Into<String>) -> Self {
        Self {
            client,
            token: token.into(),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, TelegramError> {
        let url = format!("{}/bot{}/{}", TELEGRAM_API_BASE, self.token, method);
        let mut request = self.client.post(&url).json(params);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let body = request.send().await?.text().await?;
        let response: TelegramResponse<T> = serde_json::from_str(&body)?;
        if !response.ok {
            return Err(TelegramError::Api(
                response
                    .description
                    .unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        response
            .result
            .ok_or_else(|| TelegramError::Api(format!("{method} returned no result")))
    }

    /// The bot's own account; validates the token.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is rejected or the API is unreachable.
    pub async fn get_me(&self) -> Result<TgUser, TelegramError> {
        self.call("getMe", &serde_json::json!({}), None).await
    }

    /// Long-poll for updates after `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an API error response.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_secs: u32,
    ) -> Result<Vec<Update>, TelegramError> {
        let mut params = serde_json::json!({
            "timeout": timeout_secs,
            "allowed_updates": ["message"],
        });
        if let Some(off) = offset {
            params["offset"] = serde_json::Value::from(off);
        }

        let http_timeout_secs = u64::from(timeout_secs).saturating_add(POLL_TIMEOUT_MARGIN_SECS);
        self.call(
            "getUpdates",
            &params,
            Some(Duration::from_secs(http_timeout_secs)),
        )
        .await
    }

    /// Send `text` to `chat_id`.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure or an API error response.
    pub async fn send_text(
        &self,
        chat_id: i64,
        text: &str,
        options: SendOptions,
    ) -> Result<(), TelegramError> {
        let params = send_message_params(chat_id, text, options);
        let _sent: serde_json::Value = self.call("sendMessage", &params, None).await?;
        Ok(())
    }

    /// Direct download URL of a file. Embeds the bot token.
    ///
    /// # Errors
    ///
    /// Returns an error if `getFile` fails or returns no path.
    pub async fn file_url(&self, file_id: &str) -> Result<String, TelegramError> {
        let file: TgFile = self
            .call("getFile", &serde_json::json!({ "file_id": file_id }), None)
            .await?;
        let path = file
            .file_path
            .ok_or_else(|| TelegramError::Api("getFile returned no file_path".to_owned()))?;
        Ok(format!("{}/file/bot{}/{}", TELEGRAM_API_BASE, self.token, path))
    }
}

#[async_trait]
impl TelegramSink for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        options: SendOptions,
    ) -> Result<(), SendError> {
        self.send_text(chat_id, text, options)
            .await
            .map_err(|e| SendError::Failed {
                network: Network::Telegram,
                reason: e.to_string(),
            })
    }
}

// ---------------------------------------------------------------------------
// Adapter
// ---------------------------------------------------------------------------

/// Telegram adapter: polling loop plus photo re-hosting.
pub struct TelegramAdapter {
    client: TelegramClient,
    imgur: Option<ImgurClient>,
    poll_timeout_secs: u32,
}

impl TelegramAdapter {
    /// Create an adapter. `imgur` enables photo relaying.
    pub fn new(client: TelegramClient, imgur: Option<ImgurClient>, poll_timeout_secs: u32) -> Self {
        Self {
            client,
            imgur,
            poll_timeout_secs,
        }
    }

    /// Verify the bot token with `getMe`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Api`] if the token is rejected.
    pub async fn authorize(&self) -> Result<TgUser, ConnectError> {
        let me = self.client.get_me().await.map_err(|e| ConnectError::Api {
            network: Network::Telegram,
            reason: e.to_string(),
        })?;
        info!(
            network = "telegram",
            account = %me.display_name(),
            "authorized"
        );
        Ok(me)
    }

    /// Poll loop with exponential backoff on errors.
    ///
    /// Returns when the router side of `events` is gone.
    pub async fn run(self, events: mpsc::Sender<RelayMessage>) {
        let mut offset: Option<i64> = None;
        let mut backoff_ms: u64 = INITIAL_BACKOFF_MS;

        loop {
            match self.client.get_updates(offset, self.poll_timeout_secs).await {
                Ok(updates) => {
                    backoff_ms = INITIAL_BACKOFF_MS;

                    for update in updates {
                        // Advance offset so we don't re-process this update.
                        offset = Some(update.update_id.saturating_add(1));

                        let Some(message) = update.message else {
                            debug!(
                                network = "telegram",
                                update_id = update.update_id,
                                "update without message"
                            );
                            continue;
                        };
                        let Some(msg) = self.relay_message(&message).await else {
                            debug!(
                                network = "telegram",
                                message_id = message.message_id,
                                "nothing to relay"
                            );
                            continue;
                        };
                        if events.send(msg).await.is_err() {
                            info!(network = "telegram", "router gone, stopping poll loop");
                            return;
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        network = "telegram",
                        error = %e,
                        backoff_ms,
                        "poll error, backing off"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = backoff_ms.saturating_mul(2).min(MAX_BACKOFF_MS);
                }
            }
        }
    }

    async fn relay_message(&self, message: &TgMessage) -> Option<RelayMessage> {
        let has_text = message.text.as_deref().is_some_and(|text| !text.is_empty());
        let link = match (&self.imgur, message.photo.last()) {
            (Some(imgur), Some(photo)) if !has_text => match self.rehost_photo(imgur, photo).await {
                Ok(link) => Some(link),
                Err(e) => {
                    warn!(network = "telegram", error = %e, "photo upload failed, relaying caption");
                    None
                }
            },
            _ => None,
        };
        let text = relay_text(
            message.text.as_deref(),
            message.caption.as_deref(),
            link.as_deref(),
        )?;
        normalize(message, text)
    }

    async fn rehost_photo(&self, imgur: &ImgurClient, photo: &PhotoSize) -> anyhow::Result<String> {
        let url = self.client.file_url(&photo.file_id).await?;
        let image = imgur.upload_by_url(&url).await?;
        Ok(image.link)
    }
}
