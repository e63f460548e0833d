//! Heartbeat monitoring for the session link.
//!
//! A `ping` is sent once the link has been idle for the heartbeat interval.
//! A ping left unanswered past the ack timeout counts as missed; enough
//! consecutive misses force a reconnect.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub interval_ms: u64,
    pub ack_timeout_ms: u64,
    pub max_missed: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 20_000,
            ack_timeout_ms: 10_000,
            max_missed: 2,
        }
    }
}

/// What the link loop should do after a heartbeat check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatAction {
    Idle,
    SendPing,
    /// Too many consecutive acks missed.
    Expired,
}

#[derive(Debug)]
struct HeartbeatState {
    last_activity: Instant,
    ping_sent_at: Option<Instant>,
    missed: u32,
    last_ack: Option<DateTime<Utc>>,
}

/// Heartbeat monitor. Uses the tokio clock so paused-time tests drive it.
#[derive(Debug)]
pub struct HeartbeatMonitor {
    config: HeartbeatConfig,
    state: RwLock<HeartbeatState>,
}

impl HeartbeatMonitor {
    pub fn new(config: HeartbeatConfig) -> Self {
        Self {
            config,
            state: RwLock::new(HeartbeatState {
                last_activity: Instant::now(),
                ping_sent_at: None,
                missed: 0,
                last_ack: None,
            }),
        }
    }

    /// Reset on a fresh link.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.last_activity = Instant::now();
        state.ping_sent_at = None;
        state.missed = 0;
    }

    /// Any inbound frame counts as activity.
    pub fn record_activity(&self) {
        self.state.write().last_activity = Instant::now();
    }

    pub fn record_ping(&self) {
        self.state.write().ping_sent_at = Some(Instant::now());
        debug!("Heartbeat ping sent");
    }

    /// Ping acknowledged. Returns the ack time.
    pub fn record_ack(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let mut state = self.state.write();
        if let Some(sent) = state.ping_sent_at.take() {
            debug!(rtt_ms = sent.elapsed().as_millis() as u64, "Heartbeat ack");
        }
        state.missed = 0;
        state.last_ack = Some(now);
        now
    }

    /// Evaluate the heartbeat at the current instant.
    pub fn check(&self) -> HeartbeatAction {
        let now = Instant::now();
        let mut state = self.state.write();

        if let Some(sent) = state.ping_sent_at {
            if now.duration_since(sent) < self.ack_timeout() {
                return HeartbeatAction::Idle;
            }
            state.ping_sent_at = None;
            state.missed += 1;
            warn!(
                missed = state.missed,
                max_missed = self.config.max_missed,
                "Heartbeat ack missed"
            );
            if state.missed >= self.config.max_missed {
                return HeartbeatAction::Expired;
            }
            return HeartbeatAction::SendPing;
        }

        if now.duration_since(state.last_activity) >= self.interval() {
            HeartbeatAction::SendPing
        } else {
            HeartbeatAction::Idle
        }
    }

    /// Period of the link loop's heartbeat timer.
    pub fn check_period(&self) -> Duration {
        let shortest = self.config.interval_ms.min(self.config.ack_timeout_ms);
        Duration::from_millis((shortest / 2).max(10))
    }

    pub fn missed(&self) -> u32 {
        self.state.read().missed
    }

    pub fn last_ack(&self) -> Option<DateTime<Utc>> {
        self.state.read().last_ack
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(self.config.interval_ms)
    }

    fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.config.ack_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> HeartbeatMonitor {
        HeartbeatMonitor::new(HeartbeatConfig {
            interval_ms: 1_000,
            ack_timeout_ms: 500,
            max_missed: 2,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_link_sends_ping() {
        let hb = monitor();
        assert_eq!(hb.check(), HeartbeatAction::Idle);
        tokio::time::advance(Duration::from_millis(1_000)).await;
        assert_eq!(hb.check(), HeartbeatAction::SendPing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_defers_ping() {
        let hb = monitor();
        tokio::time::advance(Duration::from_millis(900)).await;
        hb.record_activity();
        tokio::time::advance(Duration::from_millis(900)).await;
        assert_eq!(hb.check(), HeartbeatAction::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_misses_expire() {
        let hb = monitor();
        hb.record_ping();
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(hb.check(), HeartbeatAction::SendPing);
        assert_eq!(hb.missed(), 1);

        hb.record_ping();
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(hb.check(), HeartbeatAction::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_resets_missed() {
        let hb = monitor();
        hb.record_ping();
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(hb.check(), HeartbeatAction::SendPing);
        hb.record_ping();
        hb.record_ack();
        assert_eq!(hb.missed(), 0);
        assert!(hb.last_ack().is_some());
        assert_eq!(hb.check(), HeartbeatAction::Idle);
    }

    #[test]
    fn test_check_period() {
        let hb = HeartbeatMonitor::new(HeartbeatConfig::default());
        assert_eq!(hb.check_period(), Duration::from_millis(5_000));
    }
}
