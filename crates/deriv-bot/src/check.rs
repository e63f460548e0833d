//! Connectivity check.
//!
//! Walks the session through connect, account lookup, one tick, a ping and
//! a full reconnect, recording a pass/fail line per step.

use crate::app::Application;
use deriv_telemetry::Metrics;
use deriv_ws::{TickData, TokenDiagnostic, WsRequest, WsResult};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct CheckStep {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub steps: Vec<CheckStep>,
    pub account: String,
    pub simulation: bool,
    pub token: TokenDiagnostic,
    pub metrics: String,
}

impl CheckReport {
    pub fn passed(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.passed)
    }

    pub fn step(&self, name: &str) -> Option<&CheckStep> {
        self.steps.iter().find(|s| s.name == name)
    }
}

impl fmt::Display for CheckReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = if self.simulation { "simulation" } else { "live" };
        let verdict = if self.passed() { "PASS" } else { "FAIL" };
        writeln!(f, "Connection check ({mode}): {verdict}")?;
        for step in &self.steps {
            writeln!(
                f,
                "  [{}] {:<10} {} ({} ms)",
                if step.passed { " ok " } else { "FAIL" },
                step.name,
                step.detail,
                step.elapsed.as_millis()
            )?;
        }
        writeln!(f, "Token ({}): {}", self.account, self.token)?;
        writeln!(f, "Metrics:")?;
        f.write_str(&self.metrics)
    }
}

/// Run every step in order. A failed step skips the rest.
pub async fn run_check(app: &Application) -> CheckReport {
    let config = app.config();
    let connection = app.connection();
    let symbol = config.trader.symbol.trim().to_string();
    let mut steps = Vec::new();

    let connected = timed(&mut steps, "connect", async {
        let view = connection.connect().await?;
        let endpoint = view.snapshot().endpoint.unwrap_or_default();
        Ok(format!("{} via {endpoint}", view.state()))
    })
    .await;

    if connected {
        let session = connection.session();
        let started = Instant::now();
        let step = match session.account() {
            Some(account) => CheckStep {
                name: "account",
                passed: true,
                detail: format!(
                    "{} {} {} (virtual={})",
                    account.login_id, account.balance, account.currency, account.is_virtual
                ),
                elapsed: started.elapsed(),
            },
            None => CheckStep {
                name: "account",
                passed: false,
                detail: "authorize returned no account".to_string(),
                elapsed: started.elapsed(),
            },
        };
        let account_ok = step.passed;
        record(&mut steps, step);

        let ticked = account_ok
            && timed(&mut steps, "tick", async {
                let body = connection
                    .request(WsRequest::tick_history(&symbol, 1))
                    .await?;
                Ok(describe_tick(&symbol, &body))
            })
            .await;

        let pinged = ticked
            && timed(&mut steps, "ping", async {
                let body = connection.request(WsRequest::ping()).await?;
                Ok(format!(
                    "reply {}",
                    body.get("ping").and_then(Value::as_str).unwrap_or("?")
                ))
            })
            .await;

        if pinged {
            timed(&mut steps, "reconnect", async {
                connection.disconnect().await;
                let view = connection.connect().await?;
                Ok(format!("{} after disconnect", view.state()))
            })
            .await;
        }

        connection.disconnect().await;
    }
    Metrics::session_state_set(connection.state().as_str());
    Metrics::request_timeouts_observed(connection.stats().request_timeouts_total);

    let metrics = Metrics::render().unwrap_or_else(|e| format!("unavailable: {e}\n"));
    let report = CheckReport {
        steps,
        account: config.account_type.to_string(),
        simulation: config.simulation,
        token: config.token_diagnostic(),
        metrics,
    };
    info!(passed = report.passed(), steps = report.steps.len(), "Connection check finished");
    report
}

async fn timed<F>(steps: &mut Vec<CheckStep>, name: &'static str, fut: F) -> bool
where
    F: Future<Output = WsResult<String>>,
{
    let started = Instant::now();
    let step = match fut.await {
        Ok(detail) => CheckStep {
            name,
            passed: true,
            detail,
            elapsed: started.elapsed(),
        },
        Err(e) => CheckStep {
            name,
            passed: false,
            detail: e.to_string(),
            elapsed: started.elapsed(),
        },
    };
    let passed = step.passed;
    record(steps, step);
    passed
}

fn record(steps: &mut Vec<CheckStep>, step: CheckStep) {
    if step.passed {
        info!(step = step.name, detail = %step.detail, "Check step passed");
    } else {
        warn!(step = step.name, detail = %step.detail, "Check step failed");
    }
    steps.push(step);
}

fn describe_tick(symbol: &str, body: &Value) -> String {
    match TickData::from_history(body).last() {
        Some(tick) => format!("{symbol} {} @ {}", tick.quote, tick.epoch),
        None => format!("{symbol}: history reply carried no prices"),
    }
}
