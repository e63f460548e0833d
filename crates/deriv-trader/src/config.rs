//! Orchestrator configuration and stake sizing.

use deriv_core::{Money, Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{TraderError, TraderResult};

/// Duration units the venue accepts for rise/fall contracts.
pub const DURATION_UNITS: [&str; 5] = ["t", "s", "m", "h", "d"];

// ============================================================================
// FeedKind
// ============================================================================

/// Which stream feeds the signal engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    /// Every tick quote is a sample.
    #[default]
    Ticks,
    /// Candle close prices; a forming candle replaces its own sample.
    Candles,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ticks => "ticks",
            Self::Candles => "candles",
        }
    }
}

// ============================================================================
// StakeSizing
// ============================================================================

/// How the stake of each order is derived from the configured stake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum StakeSizing {
    /// Always the configured stake.
    #[default]
    Fixed,
    /// A percentage of the account balance, capped at the configured stake.
    BalancePercent { risk_pct: Decimal },
}

impl StakeSizing {
    /// Smallest stake the venue accepts.
    pub fn min_stake() -> Money {
        Money::ONE
    }

    /// Stake for the next order.
    ///
    /// `BalancePercent` floors `balance * risk_pct / 100` to 0.1 and clamps
    /// it into `[1.0, configured]`. Without a known balance the configured
    /// stake is used.
    pub fn stake(&self, configured: Money, balance: Option<Money>) -> Money {
        match (self, balance) {
            (Self::Fixed, _) | (Self::BalancePercent { .. }, None) => configured,
            (Self::BalancePercent { risk_pct }, Some(balance)) => {
                let raw = balance * (*risk_pct / Decimal::ONE_HUNDRED);
                let floor = Self::min_stake().min(configured);
                raw.floor_to_step(Decimal::new(1, 1)).clamp(floor, configured)
            }
        }
    }

    fn validate(&self) -> TraderResult<()> {
        if let Self::BalancePercent { risk_pct } = self {
            if *risk_pct <= Decimal::ZERO || *risk_pct > Decimal::ONE_HUNDRED {
                return Err(TraderError::ConfigError(format!(
                    "risk_pct ({risk_pct}) must be within (0, 100]"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// TraderConfig
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    /// Configured stake; the upper bound for sized stakes.
    #[serde(default = "default_stake")]
    pub stake: Money,
    #[serde(default)]
    pub sizing: StakeSizing,
    /// Minimum signal strength to trade on.
    #[serde(default = "default_signal_threshold")]
    pub signal_threshold: f64,
    #[serde(default)]
    pub feed: FeedKind,
    /// Candle width in seconds, for the candle feed.
    #[serde(default = "default_granularity")]
    pub granularity: u32,
    /// Fill the price buffer from history before the live feed starts.
    #[serde(default = "default_warmup_from_history")]
    pub warmup_from_history: bool,
    #[serde(default = "default_duration")]
    pub duration: u32,
    #[serde(default = "default_duration_unit")]
    pub duration_unit: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// How long shutdown waits for open positions to settle.
    #[serde(default = "default_shutdown_drain_timeout_secs")]
    pub shutdown_drain_timeout_secs: u64,
}

fn default_symbol() -> String {
    "R_100".to_string()
}

fn default_stake() -> Money {
    Money::new(Decimal::TEN)
}

fn default_signal_threshold() -> f64 {
    0.5
}

fn default_granularity() -> u32 {
    60
}

fn default_warmup_from_history() -> bool {
    true
}

fn default_duration() -> u32 {
    1
}

fn default_duration_unit() -> String {
    "m".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_shutdown_drain_timeout_secs() -> u64 {
    90
}

impl Default for TraderConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            stake: default_stake(),
            sizing: StakeSizing::default(),
            signal_threshold: default_signal_threshold(),
            feed: FeedKind::default(),
            granularity: default_granularity(),
            warmup_from_history: default_warmup_from_history(),
            duration: default_duration(),
            duration_unit: default_duration_unit(),
            currency: default_currency(),
            shutdown_drain_timeout_secs: default_shutdown_drain_timeout_secs(),
        }
    }
}

impl TraderConfig {
    pub fn symbol(&self) -> TraderResult<Symbol> {
        Symbol::new(self.symbol.trim())
            .map_err(|e| TraderError::ConfigError(e.to_string()))
    }

    pub fn shutdown_drain_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_drain_timeout_secs)
    }

    pub fn validate(&self) -> TraderResult<()> {
        self.symbol()?;

        if !self.stake.is_positive() {
            return Err(TraderError::ConfigError(format!(
                "stake ({}) must be positive",
                self.stake
            )));
        }

        if !(0.0..=1.0).contains(&self.signal_threshold) {
            return Err(TraderError::ConfigError(format!(
                "signal_threshold ({}) must be within [0, 1]",
                self.signal_threshold
            )));
        }

        if self.feed == FeedKind::Candles && self.granularity == 0 {
            return Err(TraderError::ConfigError(
                "granularity must be greater than 0 for the candle feed".to_string(),
            ));
        }

        if self.duration == 0 {
            return Err(TraderError::ConfigError(
                "duration must be greater than 0".to_string(),
            ));
        }

        if !DURATION_UNITS.contains(&self.duration_unit.as_str()) {
            return Err(TraderError::ConfigError(format!(
                "duration_unit '{}' must be one of {:?}",
                self.duration_unit, DURATION_UNITS
            )));
        }

        self.sizing.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn money(v: Decimal) -> Money {
        Money::new(v)
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = TraderConfig::default();
        assert_eq!(config.symbol, "R_100");
        assert_eq!(config.stake, money(dec!(10)));
        assert_eq!(config.duration, 1);
        assert_eq!(config.duration_unit, "m");
        assert_eq!(config.shutdown_drain_timeout(), Duration::from_secs(90));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_sizing_and_feed() {
        let config: TraderConfig = toml::from_str(
            r#"
            feed = "candles"
            granularity = 300

            [sizing]
            mode = "balance_percent"
            risk_pct = "2"
            "#,
        )
        .unwrap();
        assert_eq!(config.feed, FeedKind::Candles);
        assert_eq!(config.granularity, 300);
        assert_eq!(config.sizing, StakeSizing::BalancePercent { risk_pct: dec!(2) });
        assert_eq!(config.signal_threshold, 0.5);
    }

    #[test]
    fn test_fixed_sizing_ignores_balance() {
        let stake = StakeSizing::Fixed.stake(money(dec!(10)), Some(money(dec!(5))));
        assert_eq!(stake, money(dec!(10)));
    }

    #[test]
    fn test_balance_percent_floors_and_clamps() {
        let sizing = StakeSizing::BalancePercent { risk_pct: dec!(2) };
        let configured = money(dec!(10));

        // 2% of 345.67 = 6.9134 -> 6.9
        assert_eq!(sizing.stake(configured, Some(money(dec!(345.67)))), money(dec!(6.9)));
        // Capped at the configured stake.
        assert_eq!(sizing.stake(configured, Some(money(dec!(10000)))), configured);
        // Never below the venue minimum.
        assert_eq!(sizing.stake(configured, Some(money(dec!(20)))), money(dec!(1)));
        // Unknown balance falls back to the configured stake.
        assert_eq!(sizing.stake(configured, None), configured);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            TraderConfig {
                stake: Money::ZERO,
                ..TraderConfig::default()
            },
            TraderConfig {
                signal_threshold: 1.5,
                ..TraderConfig::default()
            },
            TraderConfig {
                duration: 0,
                ..TraderConfig::default()
            },
            TraderConfig {
                duration_unit: "weeks".to_string(),
                ..TraderConfig::default()
            },
            TraderConfig {
                symbol: "R 100".to_string(),
                ..TraderConfig::default()
            },
            TraderConfig {
                sizing: StakeSizing::BalancePercent { risk_pct: dec!(0) },
                ..TraderConfig::default()
            },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }
}
