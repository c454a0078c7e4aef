//! Configuration loading and validation.
//!
//! The bridge reads one TOML file at startup. Precedence for secrets:
//! env vars (or the `.env` beside the config) > config file > defaults.
//! Everything is validated eagerly; a missing required field aborts startup.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// Env var naming the config file when `--config` is not given.
pub const CONFIG_PATH_ENV: &str = "CHATBRIDGE_CONFIG";

/// Config file used when neither `--config` nor [`CONFIG_PATH_ENV`] is set.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config at {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The config file is not valid TOML for [`Config`].
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
    /// A required field is absent or empty.
    #[error("missing required config field `{0}`")]
    Missing(&'static str),
    /// A field is present but unusable.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Plain IRC network.
    pub irc: IrcConfig,
    /// Gitter room, reached through its IRC gateway.
    pub gitter: GitterConfig,
    /// Telegram bot and relay group.
    pub telegram: TelegramConfig,
    /// XMPP multi-user chat.
    pub xmpp: XmppConfig,
    /// Optional image host used for Telegram photos.
    pub imgur: ImgurConfig,
    /// Log output.
    pub logging: LoggingConfig,
}

/// IRC network settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IrcConfig {
    /// Server address as `host:port`.
    pub server: String,
    /// Connect with TLS.
    pub use_tls: bool,
    /// Server password (`PASS`), empty for none.
    pub password: String,
    /// Nickname of the bridge.
    pub nick: String,
    /// Channel to join, including the `#`.
    pub channel: String,
    /// NickServ password sent after registration, empty for none.
    pub identify: String,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            server: "irc.freenode.net:6667".to_owned(),
            use_tls: false,
            password: String::new(),
            nick: String::new(),
            channel: String::new(),
            identify: String::new(),
        }
    }
}

/// Gitter IRC gateway settings. TLS is always used.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitterConfig {
    /// Gateway address as `host:port`.
    pub server: String,
    /// Gitter IRC token.
    pub password: String,
    /// Gitter username.
    pub nick: String,
    /// Room channel name, e.g. `#org/repo`.
    pub channel: String,
    /// Nick of Gitter's own service bot, whose messages are status notices.
    pub service_nick: String,
}

impl Default for GitterConfig {
    fn default() -> Self {
        Self {
            server: "irc.gitter.im:6697".to_owned(),
            password: String::new(),
            nick: String::new(),
            channel: String::new(),
            service_nick: "gitter".to_owned(),
        }
    }
}

/// Telegram bot settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot API token.
    pub token: String,
    /// Usernames allowed to issue admin commands. A whitespace-separated
    /// string is accepted as well as a list.
    #[serde(deserialize_with = "deserialize_admins")]
    pub admins: Vec<String>,
    /// Relay group chat id at startup, `0` for unbound.
    pub group_id: i64,
    /// Long-poll timeout for `getUpdates`, in seconds.
    pub poll_timeout_secs: u32,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            admins: Vec::new(),
            group_id: 0,
            poll_timeout_secs: default_poll_timeout(),
        }
    }
}

/// XMPP settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct XmppConfig {
    /// Server address as `host:port`.
    pub server: String,
    /// Account JID, `user@domain`.
    pub jid: String,
    /// Account password.
    pub password: String,
    /// Room JID, `room@conference.domain`.
    pub muc: String,
    /// Nick used inside the room.
    pub nick: String,
    /// Status text advertised with our presence.
    pub status_message: String,
    /// Seconds between reconnect attempts.
    pub reconnect_interval_secs: u64,
}

impl Default for XmppConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            jid: String::new(),
            password: String::new(),
            muc: String::new(),
            nick: String::new(),
            status_message: "https://github.com/pycckuu/chatbridge".to_owned(),
            reconnect_interval_secs: default_reconnect_interval(),
        }
    }
}

/// Image host settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImgurConfig {
    /// Imgur API client id; empty disables photo uploads.
    pub client_id: String,
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the daily-rotated JSON log.
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
        }
    }
}

// Default value functions for serde

fn default_poll_timeout() -> u32 {
    60
}
fn default_reconnect_interval() -> u64 {
    3
}

fn deserialize_admins<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Admins {
        List(Vec<String>),
        Joined(String),
    }

    let names = match Admins::deserialize(deserializer)? {
        Admins::List(list) => list,
        Admins::Joined(joined) => joined.split_whitespace().map(str::to_owned).collect(),
    };
    Ok(names
        .into_iter()
        .map(|name| name.trim().trim_start_matches('@').to_owned())
        .filter(|name| !name.is_empty())
        .collect())
}

impl Config {
    /// Parse a TOML string without validating it.
    ///
    /// # Errors
    ///
    /// Returns the TOML error if the text does not match the schema.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Apply secret overrides (env > config > defaults).
    ///
    /// Takes a resolver function for testability (avoids `set_var` in tests).
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("CHATBRIDGE_IRC_PASSWORD") {
            self.irc.password = v;
        }
        if let Some(v) = env("CHATBRIDGE_IRC_IDENTIFY") {
            self.irc.identify = v;
        }
        if let Some(v) = env("CHATBRIDGE_GITTER_PASSWORD") {
            self.gitter.password = v;
        }
        if let Some(v) = env("CHATBRIDGE_TELEGRAM_TOKEN") {
            self.telegram.token = v;
        }
        if let Some(v) = env("CHATBRIDGE_TELEGRAM_GROUP_ID") {
            match v.trim().parse() {
                Ok(id) => self.telegram.group_id = id,
                Err(_) => tracing::warn!(
                    var = "CHATBRIDGE_TELEGRAM_GROUP_ID",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("CHATBRIDGE_XMPP_PASSWORD") {
            self.xmpp.password = v;
        }
        if let Some(v) = env("CHATBRIDGE_IMGUR_CLIENT_ID") {
            self.imgur.client_id = v;
        }
    }

    /// Check that every required field is present and usable.
    ///
    /// # Errors
    ///
    /// Returns the first problem found, in file order.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("irc.server", &self.irc.server)?;
        require("irc.nick", &self.irc.nick)?;
        require("irc.channel", &self.irc.channel)?;
        require_address("irc.server", &self.irc.server)?;

        require("gitter.server", &self.gitter.server)?;
        require("gitter.password", &self.gitter.password)?;
        require("gitter.nick", &self.gitter.nick)?;
        require("gitter.channel", &self.gitter.channel)?;
        require_address("gitter.server", &self.gitter.server)?;

        require("telegram.token", &self.telegram.token)?;
        if self.telegram.admins.is_empty() {
            return Err(ConfigError::Missing("telegram.admins"));
        }
        if self.telegram.poll_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "telegram.poll_timeout_secs",
                reason: "must be at least 1".to_owned(),
            });
        }

        require("xmpp.server", &self.xmpp.server)?;
        require("xmpp.jid", &self.xmpp.jid)?;
        require("xmpp.password", &self.xmpp.password)?;
        require("xmpp.muc", &self.xmpp.muc)?;
        require("xmpp.nick", &self.xmpp.nick)?;
        require_address("xmpp.server", &self.xmpp.server)?;
        if !self.xmpp.jid.contains('@') {
            return Err(ConfigError::Invalid {
                field: "xmpp.jid",
                reason: format!("`{}` is not of the form user@domain", self.xmpp.jid),
            });
        }
        if self.xmpp.reconnect_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "xmpp.reconnect_interval_secs",
                reason: "must be at least 1".to_owned(),
            });
        }

        Ok(())
    }

    /// Whether Telegram photos should be uploaded to the image host.
    pub fn image_upload_enabled(&self) -> bool {
        !self.imgur.client_id.trim().is_empty()
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Missing(field));
    }
    Ok(())
}

fn require_address(field: &'static str, value: &str) -> Result<(), ConfigError> {
    match crate::transport::split_host_port(value) {
        Ok(_) => Ok(()),
        Err(e) => Err(ConfigError::Invalid {
            field,
            reason: e.to_string(),
        }),
    }
}

/// Resolve the config path: explicit argument, then [`CONFIG_PATH_ENV`], then `config.toml`.
pub fn resolve_config_path(
    explicit: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if let Some(p) = env(CONFIG_PATH_ENV) {
        return PathBuf::from(p);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// Read and parse a config file, without overrides or validation.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn read_config(path: &Path) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a config file, apply secret overrides and validate the result.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if a required
/// field is missing after overrides.
pub fn load_config(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let mut config = read_config(path)?;
    config.apply_overrides(env);
    config.validate()?;
    tracing::info!(path = %path.display(), "configuration loaded");
    Ok(config)
}
