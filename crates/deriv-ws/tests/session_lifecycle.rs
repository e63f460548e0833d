//! Integration tests for the session lifecycle against the simulated venue.
//!
//! Covers connect/authorize, correlated requests, subscriptions, reconnect
//! with subscription restore, exhaustion to Closed, and heartbeat expiry.

use deriv_core::AccountType;
use deriv_ws::{
    BackoffPolicy, BoxFuture, Channel, ConnectionConfig, ConnectionManager, Connector,
    Credentials, HeartbeatConfig, Link, SessionState, SimConfig, SimHandle, SimulatedConnector, StreamEvent, StreamPayload,
    SubscriptionKey, WsError, WsRequest,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

const DEMO_TOKEN: &str = "abcdefghij12345";
const REAL_TOKEN: &str = "zyxwvutsrq98765";

fn config(max_attempts: u32) -> ConnectionConfig {
    ConnectionConfig {
        primary_url: "sim://primary".to_string(),
        backup_url: Some("sim://backup".to_string()),
        credentials: Credentials::new(Some(DEMO_TOKEN.into()), Some(REAL_TOKEN.into())),
        request_timeout_ms: 2_000,
        connect_timeout_ms: 1_000,
        disconnect_timeout_ms: 1_000,
        backoff: BackoffPolicy {
            base_delay_ms: 10,
            max_delay_ms: 50,
            max_attempts,
            jitter_ms: 0,
        },
        heartbeat: HeartbeatConfig {
            interval_ms: 200,
            ack_timeout_ms: 200,
            max_missed: 2,
        },
        ..ConnectionConfig::default()
    }
}

fn manager_with(config: ConnectionConfig) -> (ConnectionManager, SimHandle) {
    let connector = SimulatedConnector::new(SimConfig {
        tick_interval_ms: 20,
        ..SimConfig::default()
    });
    let handle = connector.handle();
    (ConnectionManager::new(config, Arc::new(connector)), handle)
}

async fn wait_until<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<StreamEvent>) -> StreamEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("stream event within timeout")
        .expect("subscriber channel open")
}

fn ticks_key() -> SubscriptionKey {
    SubscriptionKey::new(Channel::Ticks, "R_100")
}

#[tokio::test]
async fn test_connect_authorizes_and_reports_account() {
    let (manager, handle) = manager_with(config(3));

    let view = manager.connect().await.expect("connect");
    assert!(view.is_ready());
    assert_eq!(handle.connect_attempts(), 1);

    let account = view.account().expect("account info after authorize");
    assert_eq!(account.login_id, "VRTC5550001");
    assert_eq!(account.currency, "USD");
    assert!(account.is_virtual);
    assert!(view.last_heartbeat().is_some());
    assert_eq!(
        manager.session_info().endpoint.as_deref(),
        Some("sim://primary")
    );

    manager.disconnect().await;
    assert_eq!(manager.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_malformed_token_refused_before_dialing() {
    let mut cfg = config(3);
    cfg.credentials = Credentials::new(Some("short".into()), None);
    let (manager, handle) = manager_with(cfg);

    let err = manager.connect().await.unwrap_err();
    match err {
        WsError::Auth {
            diagnostic: Some(diagnostic),
            ..
        } => {
            assert!(!diagnostic.is_acceptable());
            assert_eq!(diagnostic.length, 5);
        }
        other => panic!("expected Auth with diagnostic, got {other:?}"),
    }
    assert_eq!(handle.connect_attempts(), 0);
    assert_eq!(manager.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_rejected_token_fails_connect() {
    let (manager, handle) = manager_with(config(3));
    handle.reject_auth(true);

    let err = manager.connect().await.unwrap_err();
    assert!(err.is_auth());
    assert!(err.is_fatal());
    assert_eq!(manager.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_send_requires_ready_session() {
    let (manager, _handle) = manager_with(config(3));
    let err = manager.send(WsRequest::ping()).unwrap_err();
    assert!(matches!(err, WsError::NotReady(SessionState::Disconnected)));
}

#[tokio::test]
async fn test_correlated_request_round_trip() {
    let (manager, _handle) = manager_with(config(3));
    manager.connect().await.expect("connect");

    let (a, b) = tokio::join!(
        manager.request(WsRequest::balance()),
        manager.request(WsRequest::ping())
    );
    assert_eq!(a.expect("balance")["balance"]["balance"], 10_000.0);
    assert_eq!(b.expect("ping")["ping"], "pong");
    assert_eq!(manager.stats().pending_requests, 0);

    manager.disconnect().await;
}

#[tokio::test]
async fn test_api_error_surfaces_as_api_variant() {
    let (manager, _handle) = manager_with(config(3));
    manager.connect().await.expect("connect");

    let err = manager
        .request(WsRequest::open_contract(1))
        .await
        .unwrap_err();
    assert!(matches!(err, WsError::Api { ref code, .. } if code == "InvalidContractId"));

    manager.disconnect().await;
}

#[tokio::test]
async fn test_subscribe_delivers_ordered_ticks() {
    let (manager, _handle) = manager_with(config(3));
    manager.connect().await.expect("connect");

    let (tx, mut rx) = mpsc::unbounded_channel();
    let ack = manager
        .subscribe(ticks_key(), WsRequest::ticks("R_100"), Arc::new(tx))
        .await
        .expect("subscribe");
    assert!(ack["subscription"]["id"].is_string());
    assert!(manager.is_subscribed(&ticks_key()));

    let mut last_seq = 0;
    for _ in 0..4 {
        let event = next_event(&mut rx).await;
        assert_eq!(event.key, ticks_key());
        assert!(event.seq > last_seq);
        last_seq = event.seq;
        match event.payload {
            StreamPayload::Tick(tick) => {
                assert_eq!(tick.symbol, "R_100");
                assert!(tick.quote > 0.0);
            }
            other => panic!("expected tick, got {other:?}"),
        }
    }

    manager.disconnect().await;
}

#[tokio::test]
async fn test_duplicate_subscription_rejected() {
    let (manager, _handle) = manager_with(config(3));
    manager.connect().await.expect("connect");

    let (tx, _rx) = mpsc::unbounded_channel();
    let tx = Arc::new(tx);
    manager
        .subscribe(ticks_key(), WsRequest::ticks("R_100"), tx.clone())
        .await
        .expect("first subscribe");
    let err = manager
        .subscribe(ticks_key(), WsRequest::ticks("R_100"), tx)
        .await
        .unwrap_err();
    assert!(matches!(err, WsError::DuplicateSubscription(_)));
    assert_eq!(manager.stats().subscriptions, 1);

    manager.unsubscribe(&ticks_key()).await.expect("unsubscribe");
    assert!(!manager.is_subscribed(&ticks_key()));
    assert_eq!(manager.stats().subscriptions, 0);

    manager.disconnect().await;
}

#[tokio::test]
async fn test_reconnect_restores_subscriptions() {
    let (manager, handle) = manager_with(config(5));
    let view = manager.connect().await.expect("connect");

    let (tx, mut rx) = mpsc::unbounded_channel();
    manager
        .subscribe(ticks_key(), WsRequest::ticks("R_100"), Arc::new(tx))
        .await
        .expect("subscribe");
    next_event(&mut rx).await;

    handle.fail_next_connects(2);
    assert!(handle.drop_link());

    assert!(
        wait_until(
            || view.snapshot().reconnects_total == 1 && view.is_ready(),
            Duration::from_secs(3)
        )
        .await
    );
    // Two failed attempts, then success on the third (primary again).
    assert_eq!(handle.connect_attempts(), 4);
    assert_eq!(
        manager.session_info().endpoint.as_deref(),
        Some("sim://primary")
    );

    while rx.try_recv().is_ok() {}
    let event = next_event(&mut rx).await;
    assert_eq!(event.key, ticks_key());

    manager.disconnect().await;
}

#[tokio::test]
async fn test_exhausted_reconnects_close_session() {
    let (manager, handle) = manager_with(config(2));
    let view = manager.connect().await.expect("connect");

    handle.fail_next_connects(10);
    handle.drop_link();

    let report = tokio::time::timeout(Duration::from_secs(3), view.wait_fatal())
        .await
        .expect("fatal report within timeout")
        .expect("fatal report");
    assert!(matches!(report.error, WsError::ConnectionLost { attempts: 2 }));
    assert_eq!(report.state, SessionState::Reconnecting);
    assert!(report.to_string().contains("state=reconnecting"));
    assert_eq!(view.state(), SessionState::Closed);

    let err = manager.send(WsRequest::ping()).unwrap_err();
    assert!(matches!(err, WsError::NotReady(SessionState::Closed)));

    manager.disconnect().await;
    assert_eq!(manager.state(), SessionState::Closed);
}

#[tokio::test]
async fn test_auth_rejection_during_reconnect_is_fatal() {
    let (manager, handle) = manager_with(config(5));
    let view = manager.connect().await.expect("connect");

    handle.reject_auth(true);
    handle.drop_link();

    let report = tokio::time::timeout(Duration::from_secs(3), view.wait_fatal())
        .await
        .expect("fatal report within timeout")
        .expect("fatal report");
    assert!(report.error.is_auth());
    assert!(report.token_diagnostic.is_some());
    assert_eq!(view.state(), SessionState::Closed);
    // No retry after the venue rejected the credentials.
    assert_eq!(handle.connect_attempts(), 2);

    manager.disconnect().await;
}

#[tokio::test]
async fn test_missed_heartbeats_force_reconnect() {
    let (manager, handle) = manager_with(config(5));
    let view = manager.connect().await.expect("connect");

    handle.mute_pings(true);
    assert!(
        wait_until(
            || view.snapshot().reconnects_total >= 1,
            Duration::from_secs(5)
        )
        .await
    );
    handle.mute_pings(false);
    assert!(view.wait_for_state(SessionState::Ready, Duration::from_secs(2)).await);

    manager.disconnect().await;
}

#[tokio::test]
async fn test_unanswered_request_times_out() {
    let mut cfg = config(3);
    cfg.request_timeout_ms = 100;
    let (manager, handle) = manager_with(cfg);
    manager.connect().await.expect("connect");

    handle.mute_pings(true);
    let err = manager.request(WsRequest::ping()).await.unwrap_err();
    assert!(matches!(err, WsError::RequestTimeout { .. }));
    assert_eq!(manager.stats().request_timeouts_total, 1);
    assert_eq!(manager.stats().pending_requests, 0);

    manager.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_cancels_pending_requests() {
    let (manager, handle) = manager_with(config(3));
    manager.connect().await.expect("connect");

    handle.mute_pings(true);
    let pending = manager.send(WsRequest::ping()).expect("send");
    manager.disconnect().await;

    assert!(matches!(pending.wait().await, Err(WsError::Cancelled)));
    assert_eq!(manager.state(), SessionState::Disconnected);
    assert_eq!(manager.stats().pending_requests, 0);
}

#[tokio::test]
async fn test_switch_account_keeps_subscriptions() {
    let (manager, _handle) = manager_with(config(3));
    let view = manager.connect().await.expect("connect");

    let (tx, mut rx) = mpsc::unbounded_channel();
    manager
        .subscribe(ticks_key(), WsRequest::ticks("R_100"), Arc::new(tx))
        .await
        .expect("subscribe");

    manager
        .switch_account(AccountType::Real)
        .await
        .expect("switch account");
    assert_eq!(view.account_type(), AccountType::Real);
    assert!(view.is_ready());
    assert!(manager.is_subscribed(&ticks_key()));

    while rx.try_recv().is_ok() {}
    next_event(&mut rx).await;

    // Switching to the current account is a no-op.
    manager
        .switch_account(AccountType::Real)
        .await
        .expect("no-op switch");

    manager.disconnect().await;
}

/// Connector whose handshake never completes.
struct StalledConnector;

impl Connector for StalledConnector {
    fn connect<'a>(&'a self, _url: &'a str) -> BoxFuture<'a, deriv_ws::WsResult<Link>> {
        Box::pin(std::future::pending())
    }
}

#[tokio::test]
async fn test_disconnect_interrupts_initial_connect() {
    let manager = Arc::new(ConnectionManager::new(
        ConnectionConfig {
            connect_timeout_ms: 60_000,
            ..config(3)
        },
        Arc::new(StalledConnector),
    ));

    let connecting = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect().await.map(|_| ()) }
    });
    assert!(
        manager
            .session()
            .wait_for_state(SessionState::Connecting, Duration::from_secs(2))
            .await
    );

    let started = Instant::now();
    tokio::time::timeout(Duration::from_secs(2), manager.disconnect())
        .await
        .expect("disconnect does not wait for the connect timeout");
    assert!(started.elapsed() < Duration::from_secs(2));

    let result = connecting.await.unwrap();
    assert!(matches!(result, Err(WsError::Cancelled)), "{result:?}");
    assert_eq!(manager.state(), SessionState::Disconnected);
}
