//! Fan-out rules and send accounting of the router.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chatbridge::relay::admin::AdminHandler;
use chatbridge::relay::router::{Delivery, Destination, DropReason, Plan};
use chatbridge::relay::stats::{LinkStates, RelayStats};
use chatbridge::relay::target::{ActiveGroupTarget, UNBOUND};
use chatbridge::relay::transform::MessageTransformer;
use chatbridge::relay::{
    ChannelSink, Network, RelayMessage, Router, SendError, SendOptions, Sinks, TelegramOrigin,
    TelegramSink,
};

const GROUP: i64 = -1_001;

// ---------------------------------------------------------------------------
// Recording sinks
// ---------------------------------------------------------------------------

#[derive(Default)]
struct RecordingChannel {
    network: Option<Network>,
    lines: Mutex<Vec<String>>,
    offline: bool,
}

impl RecordingChannel {
    fn online() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn offline(network: Network) -> Arc<Self> {
        Arc::new(Self {
            network: Some(network),
            offline: true,
            ..Self::default()
        })
    }

    fn lines(&self) -> Vec<String> {
        self.lines.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ChannelSink for RecordingChannel {
    async fn send_line(&self, line: &str) -> Result<(), SendError> {
        if self.offline {
            return Err(SendError::NotConnected(self.network.unwrap_or(Network::Irc)));
        }
        self.lines.lock().expect("lock").push(line.to_owned());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingTelegram {
    sent: Mutex<Vec<(i64, String, SendOptions)>>,
}

impl RecordingTelegram {
    fn sent(&self) -> Vec<(i64, String, SendOptions)> {
        self.sent.lock().expect("lock").clone()
    }
}

#[async_trait]
impl TelegramSink for RecordingTelegram {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        options: SendOptions,
    ) -> Result<(), SendError> {
        self.sent
            .lock()
            .expect("lock")
            .push((chat_id, text.to_owned(), options));
        Ok(())
    }
}

struct Harness {
    router: Router,
    irc: Arc<RecordingChannel>,
    gitter: Arc<RecordingChannel>,
    xmpp: Arc<RecordingChannel>,
    telegram: Arc<RecordingTelegram>,
}

fn harness_with(group: i64, xmpp: Arc<RecordingChannel>) -> Harness {
    let irc = RecordingChannel::online();
    let gitter = RecordingChannel::online();
    let telegram = Arc::new(RecordingTelegram::default());
    let target = Arc::new(ActiveGroupTarget::new(group));
    let stats = Arc::new(RelayStats::new());
    let admin = AdminHandler::new(
        vec!["admin".to_owned()],
        Arc::clone(&target),
        LinkStates::default(),
        Arc::clone(&stats),
    );
    let sinks = Sinks {
        irc: irc.clone(),
        gitter: gitter.clone(),
        xmpp: xmpp.clone(),
        telegram: telegram.clone(),
    };
    let transformer = MessageTransformer::new().expect("patterns compile");
    Harness {
        router: Router::new(sinks, transformer, target, stats, admin),
        irc,
        gitter,
        xmpp,
        telegram,
    }
}

fn harness(group: i64) -> Harness {
    harness_with(group, RecordingChannel::online())
}

fn telegram_message(chat_id: i64, username: &str, text: &str) -> RelayMessage {
    RelayMessage::new(Network::Telegram, username, text).with_telegram_origin(TelegramOrigin {
        chat_id,
        is_group: chat_id < 0,
        sender_id: 77,
        sender_username: Some(username.to_owned()),
    })
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

#[test]
fn irc_message_goes_to_every_other_network() {
    let h = harness(GROUP);
    let plan = h
        .router
        .plan(&RelayMessage::new(Network::Irc, "alice", "hello"));

    let Plan::Deliver(deliveries) = plan else {
        panic!("expected deliveries, got {plan:?}");
    };
    let destinations: Vec<Destination> = deliveries.iter().map(|d| d.destination).collect();
    assert_eq!(
        destinations,
        vec![
            Destination::Channel(Network::Gitter),
            Destination::TelegramChat(GROUP),
            Destination::Channel(Network::Xmpp),
        ]
    );
    assert!(deliveries.iter().all(|d| d.text == "<alice> hello"));
}

#[test]
fn telegram_skipped_while_unbound() {
    let h = harness(UNBOUND);
    let plan = h
        .router
        .plan(&RelayMessage::new(Network::Xmpp, "bob", "hi"));

    let Plan::Deliver(deliveries) = plan else {
        panic!("expected deliveries, got {plan:?}");
    };
    assert!(deliveries
        .iter()
        .all(|d| d.destination.network() != Network::Telegram));
    assert_eq!(deliveries.len(), 2);
}

#[test]
fn telegram_message_dropped_while_unbound() {
    let h = harness(UNBOUND);
    let plan = h.router.plan(&telegram_message(-5, "carol", "hi"));
    assert_eq!(plan, Plan::Dropped(DropReason::NoRelayGroup));
}

#[test]
fn multiline_text_is_split_for_irc_only() {
    let h = harness(GROUP);
    let plan = h
        .router
        .plan(&RelayMessage::new(Network::Xmpp, "dave", "one\r\n\ntwo"));

    let Plan::Deliver(deliveries) = plan else {
        panic!("expected deliveries, got {plan:?}");
    };
    let irc: Vec<&str> = deliveries
        .iter()
        .filter(|d| d.destination == Destination::Channel(Network::Irc))
        .map(|d| d.text.as_str())
        .collect();
    assert_eq!(irc, vec!["<dave> one", "<dave> two"]);

    let telegram: Vec<&Delivery> = deliveries
        .iter()
        .filter(|d| d.destination.network() == Network::Telegram)
        .collect();
    assert_eq!(telegram.len(), 1);
    assert_eq!(telegram[0].text, "<dave> one\r\n\ntwo");
}

#[test]
fn irc_formatting_is_stripped_before_relay() {
    let h = harness(GROUP);
    let plan = h
        .router
        .plan(&RelayMessage::new(Network::Irc, "erin", "\x02bold\x02 \x0304red"));

    let Plan::Deliver(deliveries) = plan else {
        panic!("expected deliveries, got {plan:?}");
    };
    assert!(deliveries.iter().all(|d| d.text == "<erin> bold red"));
}

#[test]
fn formatting_only_message_is_dropped() {
    let h = harness(GROUP);
    let plan = h
        .router
        .plan(&RelayMessage::new(Network::Irc, "erin", "\x02\x02"));
    assert_eq!(plan, Plan::Dropped(DropReason::Empty));
}

#[test]
fn gitter_status_notice_filtered_unless_opened_or_closed() {
    let h = harness(GROUP);

    let pushed = RelayMessage::status(Network::Gitter, "gitter", "[Github] alice pushed 3 commits");
    assert_eq!(h.router.plan(&pushed), Plan::Dropped(DropReason::FilteredStatus));

    let opened = RelayMessage::status(Network::Gitter, "gitter", "[Github] alice opened issue #42");
    let Plan::Deliver(deliveries) = h.router.plan(&opened) else {
        panic!("opened issue should be relayed");
    };
    assert!(!deliveries.is_empty());
    for delivery in &deliveries {
        assert_eq!(delivery.text, "[Github] alice opened issue #42");
        assert!(delivery.options.quiet);
    }
}

#[test]
fn telegram_dm_is_also_posted_into_the_group() {
    let h = harness(GROUP);
    let plan = h.router.plan(&telegram_message(555, "frank", "psst"));

    let Plan::Deliver(deliveries) = plan else {
        panic!("expected deliveries, got {plan:?}");
    };
    assert_eq!(deliveries[0].destination, Destination::TelegramChat(GROUP));
    assert_eq!(deliveries[0].text, "<frank> psst");
    assert_eq!(deliveries.len(), 4);
}

#[test]
fn telegram_group_message_is_not_echoed() {
    let h = harness(GROUP);
    let plan = h.router.plan(&telegram_message(GROUP, "frank", "hey"));

    let Plan::Deliver(deliveries) = plan else {
        panic!("expected deliveries, got {plan:?}");
    };
    assert!(deliveries
        .iter()
        .all(|d| d.destination.network() != Network::Telegram));
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn route_sends_through_sinks() {
    let h = harness(GROUP);
    let outcome = h
        .router
        .route(&RelayMessage::new(Network::Gitter, "gina", "hi all"))
        .await;

    assert_eq!(outcome.delivered, 3);
    assert_eq!(outcome.failed, 0);
    assert_eq!(h.irc.lines(), vec!["<gina> hi all"]);
    assert!(h.gitter.lines().is_empty());
    assert_eq!(h.xmpp.lines(), vec!["<gina> hi all"]);
    assert_eq!(
        h.telegram.sent(),
        vec![(GROUP, "<gina> hi all".to_owned(), SendOptions::default())]
    );
}

#[tokio::test]
async fn failed_send_is_counted_and_others_still_delivered() {
    let h = harness_with(GROUP, RecordingChannel::offline(Network::Xmpp));
    let outcome = h
        .router
        .route(&RelayMessage::new(Network::Irc, "hank", "ping"))
        .await;

    assert_eq!(outcome.delivered, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(h.router.stats().failures(Network::Xmpp), 1);
    assert_eq!(h.router.stats().relayed(Network::Gitter), 1);
    assert_eq!(h.gitter.lines(), vec!["<hank> ping"]);
}

#[tokio::test]
async fn admin_start_binds_group_without_relaying() {
    let h = harness(UNBOUND);
    let outcome = h.router.handle(telegram_message(-42, "admin", "/start")).await;

    assert_eq!(outcome.delivered, 0);
    assert_eq!(h.router.target().get(), Some(-42));
    assert!(h.irc.lines().is_empty());
}

#[tokio::test]
async fn admin_status_replies_privately() {
    let h = harness(GROUP);
    h.router.handle(telegram_message(GROUP, "admin", "/status")).await;

    let sent = h.telegram.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, 77);
    assert!(sent[0].1.starts_with(&format!("groupId: {GROUP}")));
    assert!(h.irc.lines().is_empty());
}

#[tokio::test]
async fn non_admin_slash_text_is_relayed() {
    let h = harness(GROUP);
    h.router.handle(telegram_message(GROUP, "mallory", "/start")).await;

    assert_eq!(h.router.target().get(), Some(GROUP));
    assert_eq!(h.irc.lines(), vec!["<mallory> /start"]);
}
