//! Prometheus metrics for the Deriv bot.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`: a registration failure means
//! duplicate metric names, a programming error that should crash at
//! startup. These panics only occur during static initialization.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_int_counter,
    register_int_gauge, CounterVec, Encoder, Gauge, GaugeVec, IntCounter, IntGauge, TextEncoder,
};

use crate::error::TelemetryResult;

/// Session states, as reported by the transport.
const SESSION_STATES: [&str; 6] = [
    "disconnected",
    "connecting",
    "authenticating",
    "ready",
    "reconnecting",
    "closed",
];

/// Labels: state. Only the active state is 1.
pub static SESSION_STATE: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "deriv_session_state",
        "Session state machine current state (1=active, 0=inactive)",
        &["state"]
    )
    .unwrap()
});

pub static RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "deriv_reconnect_total",
        "Total session reconnects",
        &["reason"]
    )
    .unwrap()
});

pub static REQUEST_TIMEOUT_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "deriv_request_timeout_total",
        "Requests that got no response before their deadline"
    )
    .unwrap()
});

pub static SIGNALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "deriv_signals_total",
        "Signals emitted after warm-up",
        &["symbol", "direction"]
    )
    .unwrap()
});

/// Labels: outcome (placed/rejected/won/lost).
pub static ORDERS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "deriv_orders_total",
        "Order lifecycle events",
        &["symbol", "outcome"]
    )
    .unwrap()
});

pub static RISK_BLOCK_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "deriv_risk_block_total",
        "Orders skipped by the risk ledger",
        &["reason"]
    )
    .unwrap()
});

pub static DAILY_PNL: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("deriv_daily_pnl", "Realized P&L for the current trading day").unwrap()
});

pub static OPEN_POSITIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("deriv_open_positions", "Pending or open positions").unwrap()
});

pub static ACCOUNT_BALANCE: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("deriv_account_balance", "Last known account balance").unwrap()
});

/// Metric recording facade.
pub struct Metrics;

impl Metrics {
    pub fn session_state_set(state: &str) {
        for s in &SESSION_STATES {
            SESSION_STATE.with_label_values(&[s]).set(0.0);
        }
        SESSION_STATE.with_label_values(&[state]).set(1.0);
    }

    pub fn reconnect(reason: &str) {
        RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    /// Bring the timeout counter up to the transport's running total.
    pub fn request_timeouts_observed(total: u64) {
        let current = REQUEST_TIMEOUT_TOTAL.get();
        if total > current {
            REQUEST_TIMEOUT_TOTAL.inc_by(total - current);
        }
    }

    pub fn signal_emitted(symbol: &str, direction: &str) {
        SIGNALS_TOTAL.with_label_values(&[symbol, direction]).inc();
    }

    pub fn order_event(symbol: &str, outcome: &str) {
        ORDERS_TOTAL.with_label_values(&[symbol, outcome]).inc();
    }

    pub fn risk_blocked(reason: &str) {
        RISK_BLOCK_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn daily_pnl(pnl: f64) {
        DAILY_PNL.set(pnl);
    }

    pub fn open_positions(count: i64) {
        OPEN_POSITIONS.set(count);
    }

    pub fn account_balance(balance: f64) {
        ACCOUNT_BALANCE.set(balance);
    }

    /// Text exposition of every registered metric.
    pub fn render() -> TelemetryResult<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::TelemetryError::Metrics(e.to_string()))
    }
}
