//! Live connector tests against an in-process WebSocket server.
//!
//! Covers:
//! - Authorization and the connectivity check over a real socket
//! - Token rejection reporting
//! - Reconnect after the server drops the link

mod integration;
use integration::common::mock_ws::MockWsServer;

use deriv_bot::check::run_check;
use deriv_bot::{AppConfig, AppError, Application};
use deriv_core::AccountType;
use deriv_ws::SessionState;
use std::time::Duration;
use tokio::time::timeout;

const TOKEN: &str = "abcdefghij12345";

fn live_config(server: &MockWsServer) -> AppConfig {
    let mut config = AppConfig {
        simulation: false,
        ..AppConfig::default()
    };
    config.tokens.demo = Some(TOKEN.to_string());
    config.connection.primary_url = server.url();
    config.connection.backup_url = None;
    config.connection.request_timeout_ms = 2_000;
    config.connection.connect_timeout_ms = 2_000;
    config.connection.reconnect_base_delay_ms = 20;
    config.connection.reconnect_max_delay_ms = 100;
    config.connection.reconnect_jitter_ms = 0;
    config
}

#[tokio::test]
async fn test_check_passes_against_server() {
    let server = MockWsServer::start().await;
    let app = Application::new(live_config(&server)).unwrap();

    let report = timeout(Duration::from_secs(10), run_check(&app))
        .await
        .expect("check finished");

    assert!(report.passed(), "{report}");
    assert!(report.step("account").unwrap().detail.contains("VRTC1000001"));
    assert!(report.step("tick").unwrap().detail.contains("1234.56"));
    assert_eq!(server.connection_count().await, 2);
    assert_eq!(server.received_method("authorize").await, 2);

    let first = &server.received().await[0];
    assert_eq!(first["authorize"], TOKEN);
    assert!(first["req_id"].is_u64());

    server.shutdown().await;
}

#[tokio::test]
async fn test_rejected_token_fails_check_with_diagnostic() {
    let server = MockWsServer::start().await;
    server.reject_auth(true);
    let app = Application::new(live_config(&server)).unwrap();

    let report = run_check(&app).await;
    assert!(!report.passed());
    let connect = report.step("connect").unwrap();
    assert!(connect.detail.contains("InvalidToken"), "{}", connect.detail);
    assert!(report.to_string().contains("length=15"));
    assert!(!report.to_string().contains(TOKEN), "token leaked");

    server.shutdown().await;
}

#[tokio::test]
async fn test_run_reports_auth_failure() {
    let server = MockWsServer::start().await;
    server.reject_auth(true);
    let app = Application::new(live_config(&server)).unwrap();

    let err = app
        .run_until(tokio_util::sync::CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Session(ref e) if e.is_auth()), "{err}");

    server.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_server_drop() {
    let server = MockWsServer::start().await;
    let app = Application::new(live_config(&server)).unwrap();
    let connection = app.connection().clone();

    let session = connection.connect().await.expect("connect");
    assert_eq!(session.account_type(), AccountType::Demo);
    assert_eq!(server.connection_count().await, 1);

    server.drop_connections();

    let reconnected = timeout(Duration::from_secs(5), async {
        loop {
            if server.connection_count().await >= 2 && session.is_ready() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reconnected.is_ok(), "session came back");
    assert_eq!(server.received_method("authorize").await, 2);

    connection.disconnect().await;
    assert_eq!(connection.state(), SessionState::Disconnected);
    server.shutdown().await;
}
