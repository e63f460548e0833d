//! Risk limits.

use deriv_core::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{RiskError, RiskResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Confirmed orders allowed per trading day.
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: u32,
    /// Realized loss (plus open exposure) at which trading halts for the day.
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: Money,
    #[serde(default = "default_max_concurrent_trades")]
    pub max_concurrent_trades: u32,
}

fn default_max_daily_trades() -> u32 {
    50
}

fn default_max_daily_loss() -> Money {
    Money::new(Decimal::from(100))
}

fn default_max_concurrent_trades() -> u32 {
    1
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_daily_trades: default_max_daily_trades(),
            max_daily_loss: default_max_daily_loss(),
            max_concurrent_trades: default_max_concurrent_trades(),
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> RiskResult<()> {
        if self.max_daily_trades == 0 {
            return Err(RiskError::ConfigError(
                "max_daily_trades must be greater than 0".to_string(),
            ));
        }
        if !self.max_daily_loss.is_positive() {
            return Err(RiskError::ConfigError(format!(
                "max_daily_loss ({}) must be positive",
                self.max_daily_loss
            )));
        }
        if self.max_concurrent_trades == 0 {
            return Err(RiskError::ConfigError(
                "max_concurrent_trades must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
