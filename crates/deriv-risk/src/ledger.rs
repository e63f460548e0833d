//! Risk ledger.
//!
//! Lifecycle of one order as seen by the ledger:
//! 1. `approve(stake)` reserves an open slot and the stake as exposure
//! 2. `on_order_confirmed()` counts the trade, or `on_order_rejected(stake)`
//!    releases the reservation without counting it
//! 3. `record(stake, pnl)` on settlement releases the slot and books P&L
//!
//! The ledger is owned by the orchestrator worker; all mutations take
//! `&mut self` and are therefore serialized.

use chrono::NaiveDate;
use deriv_core::Money;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::RiskConfig;
use crate::error::{RiskError, RiskResult};
use crate::stats::DailyStats;

/// Why an order was not approved. Expected control flow, not a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RiskLimitExceeded {
    /// Confirmed plus in-flight orders reached the daily limit.
    DailyTradeLimit { count: u32, limit: u32 },
    ConcurrentLimit { open: u32, limit: u32 },
    /// Realized P&L minus worst-case exposure would fall below `-limit`.
    DailyLossLimit { projected: Money, limit: Money },
    /// Daily loss limit already breached; trading stops until the next day.
    Halted,
    InvalidStake(Money),
}

impl RiskLimitExceeded {
    /// Short label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DailyTradeLimit { .. } => "daily_trades",
            Self::ConcurrentLimit { .. } => "concurrent",
            Self::DailyLossLimit { .. } => "daily_loss",
            Self::Halted => "halted",
            Self::InvalidStake(_) => "invalid_stake",
        }
    }
}

impl fmt::Display for RiskLimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DailyTradeLimit { count, limit } => {
                write!(f, "daily trade limit reached ({count}/{limit})")
            }
            Self::ConcurrentLimit { open, limit } => {
                write!(f, "concurrent trade limit reached ({open}/{limit})")
            }
            Self::DailyLossLimit { projected, limit } => {
                write!(f, "projected daily P&L {projected} would breach loss limit -{limit}")
            }
            Self::Halted => write!(f, "trading halted for the day"),
            Self::InvalidStake(stake) => write!(f, "invalid stake {stake}"),
        }
    }
}

/// Daily accounting state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub trading_day: NaiveDate,
    /// Confirmed orders today.
    pub trade_count: u32,
    /// Approved orders awaiting confirmation or rejection.
    pub pending_orders: u32,
    pub realized_pnl: Money,
    pub open_positions: u32,
    /// Sum of stakes of approved, unsettled orders.
    pub open_exposure: Money,
    pub halted: bool,
}

impl RiskState {
    fn new(trading_day: NaiveDate) -> Self {
        Self {
            trading_day,
            trade_count: 0,
            pending_orders: 0,
            realized_pnl: Money::ZERO,
            open_positions: 0,
            open_exposure: Money::ZERO,
            halted: false,
        }
    }
}

pub struct RiskLedger {
    config: RiskConfig,
    clock: Arc<dyn Clock>,
    state: RiskState,
    stats: DailyStats,
}

impl RiskLedger {
    pub fn new(config: RiskConfig, clock: Arc<dyn Clock>) -> RiskResult<Self> {
        config.validate()?;
        let state = RiskState::new(clock.today());
        Ok(Self {
            config,
            clock,
            state,
            stats: DailyStats::default(),
        })
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    pub fn state(&self) -> &RiskState {
        &self.state
    }

    pub fn stats(&self) -> &DailyStats {
        &self.stats
    }

    /// Whether a new order with `stake` may be placed, with the reason if not.
    /// Rolls the trading day over first.
    pub fn check(&mut self, stake: Money) -> Result<(), RiskLimitExceeded> {
        self.roll_day();

        if !stake.is_positive() {
            return Err(RiskLimitExceeded::InvalidStake(stake));
        }
        if self.state.halted {
            return Err(RiskLimitExceeded::Halted);
        }

        let committed = self.state.trade_count + self.state.pending_orders;
        if committed >= self.config.max_daily_trades {
            return Err(RiskLimitExceeded::DailyTradeLimit {
                count: committed,
                limit: self.config.max_daily_trades,
            });
        }

        if self.state.open_positions >= self.config.max_concurrent_trades {
            return Err(RiskLimitExceeded::ConcurrentLimit {
                open: self.state.open_positions,
                limit: self.config.max_concurrent_trades,
            });
        }

        let projected = self.state.realized_pnl - self.state.open_exposure - stake;
        if projected < -self.config.max_daily_loss {
            return Err(RiskLimitExceeded::DailyLossLimit {
                projected,
                limit: self.config.max_daily_loss,
            });
        }

        Ok(())
    }

    /// Approve and reserve capacity for one order. Returns false when any
    /// limit would be exceeded.
    pub fn approve(&mut self, stake: Money) -> bool {
        match self.try_approve(stake) {
            Ok(()) => true,
            Err(reason) => {
                debug!(%stake, %reason, "Order not approved");
                false
            }
        }
    }

    /// Like [`approve`](Self::approve) but returns the blocking reason.
    pub fn try_approve(&mut self, stake: Money) -> Result<(), RiskLimitExceeded> {
        self.check(stake)?;
        self.state.pending_orders += 1;
        self.state.open_positions += 1;
        self.state.open_exposure += stake;
        debug!(
            %stake,
            open_positions = self.state.open_positions,
            open_exposure = %self.state.open_exposure,
            "Order approved"
        );
        Ok(())
    }

    /// The venue accepted an approved order; it now counts toward the daily
    /// trade limit.
    pub fn on_order_confirmed(&mut self) {
        self.roll_day();
        self.state.pending_orders = self.state.pending_orders.saturating_sub(1);
        self.state.trade_count += 1;
        debug!(
            trade_count = self.state.trade_count,
            limit = self.config.max_daily_trades,
            "Trade counted"
        );
    }

    /// An approved order never reached the venue. Releases its reservation
    /// without counting a trade.
    pub fn on_order_rejected(&mut self, stake: Money) -> RiskResult<()> {
        self.roll_day();
        if self.state.open_positions == 0 {
            return Err(RiskError::NothingOpen);
        }
        self.state.pending_orders = self.state.pending_orders.saturating_sub(1);
        self.release(stake);
        Ok(())
    }

    /// Book the realized P&L of a settled position and free its slot. The
    /// P&L lands on the day the settlement arrives.
    pub fn record(&mut self, stake: Money, pnl: Money) -> RiskResult<()> {
        self.roll_day();
        if self.state.open_positions == 0 {
            return Err(RiskError::NothingOpen);
        }
        self.release(stake);
        self.state.realized_pnl += pnl;
        self.stats.record(pnl);

        info!(
            %pnl,
            realized_pnl = %self.state.realized_pnl,
            stats = %self.stats,
            "Daily stats"
        );

        if !self.state.halted && self.state.realized_pnl <= -self.config.max_daily_loss {
            self.state.halted = true;
            warn!(
                realized_pnl = %self.state.realized_pnl,
                limit = %self.config.max_daily_loss,
                "Daily loss limit reached, trading halted until next day"
            );
        }
        Ok(())
    }

    pub fn is_halted(&self) -> bool {
        self.state.halted
    }

    fn release(&mut self, stake: Money) {
        self.state.open_positions = self.state.open_positions.saturating_sub(1);
        self.state.open_exposure -= stake;
        if self.state.open_exposure.is_negative() || self.state.open_positions == 0 {
            self.state.open_exposure = Money::ZERO;
        }
    }

    /// Reset daily counters if the calendar date moved forward. Open
    /// positions carry over.
    fn roll_day(&mut self) {
        let today = self.clock.today();
        if today <= self.state.trading_day {
            return;
        }
        info!(
            previous = %self.state.trading_day,
            %today,
            trades = self.state.trade_count,
            realized_pnl = %self.state.realized_pnl,
            stats = %self.stats,
            "New trading day, resetting risk counters"
        );
        let carried = RiskState {
            pending_orders: self.state.pending_orders,
            open_positions: self.state.open_positions,
            open_exposure: self.state.open_exposure,
            ..RiskState::new(today)
        };
        self.state = carried;
        self.stats = DailyStats::default();
    }
}
