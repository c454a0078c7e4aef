//! Tracing setup for the relay and for one-shot commands.
//!
//! `start` logs JSON to a daily-rotated file plus human-readable lines on
//! stderr; `check` and startup failures log to stderr only.
//!
//! Every relay task runs inside a span naming its role and source network
//! ([`receive_span`], [`route_span`]). Events about one network also carry a
//! `network` field, so a failed XMPP send while routing an IRC message is
//! logged as `route{source=irc}` with `network=xmpp`.

use std::path::Path;

use anyhow::Context;
use tracing::{info_span, Span};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::relay::Network;

/// File name prefix of the rotated log.
pub const LOG_FILE_PREFIX: &str = "chatbridge.log";

/// Filter used when `RUST_LOG` is unset or invalid.
const DEFAULT_DIRECTIVE: &str = "info";

/// Keeps the file writer alive; dropping it flushes pending entries.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Span for an adapter's receive loop.
pub fn receive_span(source: Network) -> Span {
    info_span!("receive", source = source.as_str())
}

/// Span for the router loop draining one adapter's messages.
pub fn route_span(source: Network) -> Span {
    info_span!("route", source = source.as_str())
}

/// Install relay logging: JSON lines into `{logs_dir}/chatbridge.log.YYYY-MM-DD`
/// tagged with the current task span, and plain lines on stderr.
///
/// # Errors
///
/// Returns an error if the logs directory cannot be created or a global
/// subscriber is already installed.
pub fn init_production(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX));

    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(file_writer);
    let console_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter())
        .with(json_layer)
        .with(console_layer)
        .try_init()
        .context("failed to install log subscriber")?;

    Ok(LoggingGuard { _guard: guard })
}

/// Install stderr-only logging. A second call is a no-op.
pub fn init_cli() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .try_init();
}

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}
