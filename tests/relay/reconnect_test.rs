//! Reconnect supervision with a paused clock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use chatbridge::relay::message::Network;
use chatbridge::relay::reconnect::{ReconnectPolicy, Supervisor, SupervisorState};
use chatbridge::relay::stats::LinkState;

#[tokio::test(start_paused = true)]
async fn retries_at_fixed_interval_until_success() {
    let link = LinkState::new();
    let mut supervisor = Supervisor::new(
        Network::Xmpp,
        ReconnectPolicy::fixed(Duration::from_secs(3)),
        link.clone(),
    );
    assert!(link.is_connected());

    supervisor.connection_lost(&"stream closed by peer");
    assert_eq!(supervisor.state(), SupervisorState::Reconnecting);
    assert!(!link.is_connected());

    let counter = AtomicU32::new(0);
    let attempts = &counter;
    let started = tokio::time::Instant::now();
    let value = supervisor
        .reconnect(move || async move {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 3 {
                Err("connection refused")
            } else {
                Ok(n)
            }
        })
        .await;

    assert_eq!(value, 3);
    assert_eq!(counter.load(Ordering::SeqCst), 4);
    assert_eq!(started.elapsed(), Duration::from_secs(12));
    assert_eq!(supervisor.state(), SupervisorState::Connected);
    assert!(link.is_connected());
}

#[tokio::test(start_paused = true)]
async fn starts_disconnected_after_failed_startup() {
    let link = LinkState::new();
    let mut supervisor = Supervisor::disconnected(Network::Xmpp, ReconnectPolicy::default(), link.clone());
    assert_eq!(supervisor.state(), SupervisorState::Reconnecting);
    assert!(!link.is_connected());

    let started = tokio::time::Instant::now();
    supervisor.reconnect(|| async { Ok::<_, String>(()) }).await;
    assert_eq!(started.elapsed(), Duration::from_secs(3));
    assert!(link.is_connected());
}
