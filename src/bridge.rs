//! Startup wiring: connect every adapter, build the router, run until
//! shutdown.
//!
//! IRC, Gitter and the Telegram token are checked eagerly and any failure
//! aborts startup. XMPP is allowed to start disconnected; its supervisor
//! keeps retrying in the background.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{error, info, warn, Instrument};

use crate::adapters::imgur::ImgurClient;
use crate::adapters::irc::{IrcClient, IrcSettings};
use crate::adapters::telegram::{TelegramAdapter, TelegramClient};
use crate::adapters::xmpp::XmppAdapter;
use crate::config::Config;
use crate::logging::{receive_span, route_span};
use crate::relay::admin::AdminHandler;
use crate::relay::router::run_inbound;
use crate::relay::stats::{LinkStates, RelayStats};
use crate::relay::target::ActiveGroupTarget;
use crate::relay::transform::MessageTransformer;
use crate::relay::{Network, Router, Sinks};

/// Capacity of each adapter's inbound channel.
const INBOUND_CAPACITY: usize = 100;

/// Run the bridge until Ctrl-C or until a relay task stops.
///
/// # Errors
///
/// Returns an error if a mandatory network cannot be reached at startup, or
/// if a relay task exits on its own.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let stats = Arc::new(RelayStats::new());
    let links = LinkStates::default();
    let target = Arc::new(ActiveGroupTarget::new(config.telegram.group_id));
    let transformer = MessageTransformer::new().context("failed to compile message patterns")?;
    let http = reqwest::Client::new();

    let telegram_client = TelegramClient::new(http.clone(), config.telegram.token.clone());
    let imgur = config
        .image_upload_enabled()
        .then(|| ImgurClient::new(http.clone(), config.imgur.client_id.clone()));
    let telegram = TelegramAdapter::new(
        telegram_client.clone(),
        imgur,
        config.telegram.poll_timeout_secs,
    );
    telegram.authorize().await?;

    let irc = IrcClient::new(IrcSettings::for_irc(&config.irc), links.irc.clone());
    let irc_reader = irc.connect().await?;

    let gitter = IrcClient::new(IrcSettings::for_gitter(&config.gitter), links.gitter.clone());
    let gitter_reader = gitter.connect().await?;

    let xmpp = XmppAdapter::new(&config.xmpp, links.xmpp.clone());
    let xmpp_session = match xmpp.connect().await {
        Ok(session) => Some(session),
        Err(e) => {
            warn!(network = "xmpp", error = %e, "initial connect failed, retrying in background");
            None
        }
    };

    let sinks = Sinks {
        irc: Arc::new(irc.sink()),
        gitter: Arc::new(gitter.sink()),
        xmpp: Arc::new(xmpp.sink()),
        telegram: Arc::new(telegram_client),
    };
    let admin = AdminHandler::new(
        config.telegram.admins.clone(),
        Arc::clone(&target),
        links,
        Arc::clone(&stats),
    );
    let router = Arc::new(Router::new(sinks, transformer, target, stats, admin));

    let mut tasks = JoinSet::new();

    let (irc_tx, irc_rx) = mpsc::channel(INBOUND_CAPACITY);
    tasks.spawn(irc.run(irc_reader, irc_tx).instrument(receive_span(Network::Irc)));
    tasks.spawn(run_inbound(Arc::clone(&router), Network::Irc, irc_rx).instrument(route_span(Network::Irc)));

    let (gitter_tx, gitter_rx) = mpsc::channel(INBOUND_CAPACITY);
    tasks.spawn(gitter.run(gitter_reader, gitter_tx).instrument(receive_span(Network::Gitter)));
    tasks.spawn(
        run_inbound(Arc::clone(&router), Network::Gitter, gitter_rx).instrument(route_span(Network::Gitter)),
    );

    let (telegram_tx, telegram_rx) = mpsc::channel(INBOUND_CAPACITY);
    tasks.spawn(telegram.run(telegram_tx).instrument(receive_span(Network::Telegram)));
    tasks.spawn(
        run_inbound(Arc::clone(&router), Network::Telegram, telegram_rx)
            .instrument(route_span(Network::Telegram)),
    );

    let (xmpp_tx, xmpp_rx) = mpsc::channel(INBOUND_CAPACITY);
    tasks.spawn(xmpp.run(xmpp_session, xmpp_tx).instrument(receive_span(Network::Xmpp)));
    tasks.spawn(run_inbound(router, Network::Xmpp, xmpp_rx).instrument(route_span(Network::Xmpp)));

    info!(group_id = config.telegram.group_id, "bridge running");

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            Ok(())
        }
        Some(joined) = tasks.join_next() => {
            if let Err(e) = &joined {
                error!(error = %e, "relay task panicked");
            }
            Err(anyhow::anyhow!("a relay task stopped unexpectedly"))
        }
    };

    tasks.shutdown().await;
    info!("bridge shut down");
    result
}
