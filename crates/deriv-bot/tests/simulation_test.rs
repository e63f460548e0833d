//! Full application runs against the simulated venue.

use deriv_bot::{AppConfig, AppError, Application};
use deriv_core::Money;
use deriv_ws::SessionState;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// History ending in short=110, medium=100, long=90: a weak Buy.
fn rising_script() -> Vec<f64> {
    let mut script = vec![80.0; 10];
    script.extend([90.0; 5]);
    script.extend([110.0; 5]);
    script
}

fn sim_config(threshold: f64) -> AppConfig {
    let mut config = AppConfig::default();
    config.trader.signal_threshold = threshold;
    config.trader.shutdown_drain_timeout_secs = 5;
    config.sim.tick_interval_ms = 20;
    config.sim.contract_ticks = 3;
    config.sim.script = rising_script();
    config.connection.reconnect_jitter_ms = 0;
    config
}

fn initial_balance() -> Money {
    Money::from_f64(10_000.0).unwrap()
}

#[tokio::test]
async fn test_trades_and_settles_then_shuts_down() {
    let app = Application::new(sim_config(0.1)).unwrap();
    let sim = app.sim().unwrap().clone();
    let connection = app.connection().clone();
    let shutdown = CancellationToken::new();

    let run = tokio::spawn(app.run_until(shutdown.clone()));

    let mut traded = false;
    for _ in 0..200 {
        if sim.balance() != initial_balance() {
            traded = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(traded, "an order reached the venue");

    shutdown.cancel();
    let summary = run.await.unwrap().expect("clean shutdown");
    assert!(summary.stats.total_trades >= 1);
    assert_eq!(summary.unsettled, 0);
    assert_eq!(sim.open_contracts(), 0);
    assert_eq!(connection.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn test_threshold_blocks_weak_signal() {
    let app = Application::new(sim_config(0.5)).unwrap();
    let sim = app.sim().unwrap().clone();
    let shutdown = CancellationToken::new();

    let run = tokio::spawn(app.run_until(shutdown.clone()));
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown.cancel();

    let summary = run.await.unwrap().expect("clean shutdown");
    assert_eq!(summary.stats.total_trades, 0);
    assert_eq!(sim.balance(), initial_balance());
}

#[tokio::test]
async fn test_exhausted_reconnects_halt_trading() {
    let mut config = sim_config(0.5);
    config.connection.reconnect_base_delay_ms = 10;
    config.connection.reconnect_max_delay_ms = 20;
    config.connection.max_reconnect_attempts = 2;
    let app = Application::new(config).unwrap();
    let sim = app.sim().unwrap().clone();
    let connection = app.connection().clone();

    let run = tokio::spawn(app.run_until(CancellationToken::new()));
    assert!(
        connection
            .session()
            .wait_for_state(SessionState::Ready, Duration::from_secs(2))
            .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    sim.fail_next_connects(10);
    assert!(sim.drop_link());

    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run stopped")
        .unwrap();
    match result {
        Err(AppError::Fatal(report)) => {
            assert!(report.error.is_fatal());
            assert!(report.to_string().contains("last_heartbeat="));
        }
        other => panic!("expected a fatal report, got {other:?}"),
    }
}
