//! chatbridge CLI entry point.
//!
//! Provides `start` to run the relay and `check` to validate a
//! configuration file without connecting anywhere.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use chatbridge::config::{load_config, resolve_config_path, Config};
use chatbridge::credentials::load_beside;
use chatbridge::{bridge, logging};

/// chatbridge — relay between IRC, Gitter, Telegram and XMPP.
#[derive(Parser)]
#[command(name = "chatbridge", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Connect to every network and relay messages until interrupted.
    Start {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Load and validate the configuration, then exit.
    Check {
        /// Path to the TOML configuration file.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Start { config } => handle_start(config).await,
        Command::Check { config } => handle_check(config),
    }
}

/// Resolve, read and validate the configuration, with secrets taken from
/// the `.env` beside it or from the process environment.
fn load(explicit: Option<PathBuf>) -> anyhow::Result<Config> {
    let path = resolve_config_path(explicit, |key| std::env::var(key).ok());
    let credentials = load_beside(&path)
        .with_context(|| format!("failed to load credentials beside {}", path.display()))?;
    load_config(&path, |key| credentials.resolve(key))
        .with_context(|| format!("failed to load {}", path.display()))
}

/// Run the relay.
async fn handle_start(explicit: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match load(explicit) {
        Ok(config) => config,
        Err(e) => {
            logging::init_cli();
            error!(error = format!("{e:#}"), "startup failed");
            return Err(e);
        }
    };

    // Set up production logging (JSON file + stderr).
    let _logging_guard = logging::init_production(&config.logging.dir)?;
    info!(version = env!("CARGO_PKG_VERSION"), "chatbridge starting");

    if let Err(e) = bridge::run(config).await {
        error!(error = format!("{e:#}"), "bridge stopped");
        return Err(e);
    }
    Ok(())
}

/// Validate the configuration and report what would be connected.
fn handle_check(explicit: Option<PathBuf>) -> anyhow::Result<()> {
    logging::init_cli();
    let config = load(explicit)?;
    info!(
        irc = %config.irc.server,
        gitter = %config.gitter.server,
        xmpp = %config.xmpp.server,
        group_id = config.telegram.group_id,
        admins = config.telegram.admins.len(),
        image_upload = config.image_upload_enabled(),
        "configuration is valid"
    );
    Ok(())
}
