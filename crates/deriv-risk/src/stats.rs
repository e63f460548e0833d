//! Per-day settlement statistics.

use deriv_core::Money;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyStats {
    /// Settled trades.
    pub total_trades: u32,
    pub wins: u32,
    pub losses: u32,
    pub total_profit: Money,
}

impl DailyStats {
    pub fn record(&mut self, profit: Money) {
        self.total_trades += 1;
        if profit.is_positive() {
            self.wins += 1;
        } else {
            self.losses += 1;
        }
        self.total_profit += profit;
    }

    /// Percentage of settled trades that won.
    pub fn win_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            f64::from(self.wins) / f64::from(self.total_trades) * 100.0
        }
    }
}

impl fmt::Display for DailyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "trades={} wins={} losses={} win_rate={:.1}% profit={}",
            self.total_trades,
            self.wins,
            self.losses,
            self.win_rate(),
            self.total_profit
        )
    }
}
