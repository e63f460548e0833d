//! Price samples and trading signals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::market::Symbol;

/// One observed price for an instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSample {
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

impl PriceSample {
    pub fn new(symbol: Symbol, timestamp: DateTime<Utc>, price: f64) -> Self {
        Self {
            symbol,
            timestamp,
            price,
        }
    }

    /// Build from a venue epoch (seconds). Falls back to now on an out-of-range epoch.
    pub fn from_epoch(symbol: Symbol, epoch: i64, price: f64) -> Self {
        let timestamp = DateTime::from_timestamp(epoch, 0).unwrap_or_else(Utc::now);
        Self::new(symbol, timestamp, price)
    }
}

/// Signal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Buy,
    Sell,
    None,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::None => "none",
        }
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Moving-average crossover signal.
///
/// Derived from the three averages at `timestamp`; consumed immediately by
/// the orchestrator and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub symbol: Symbol,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    /// Always within `[0.0, 1.0]`.
    pub strength: f64,
    pub short_ma: f64,
    pub medium_ma: f64,
    pub long_ma: f64,
}

impl Signal {
    /// Whether this signal should be acted on at the given threshold.
    pub fn passes(&self, threshold: f64) -> bool {
        self.direction.is_actionable() && self.strength >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signal(direction: Direction, strength: f64) -> Signal {
        Signal {
            symbol: Symbol::new("R_100").unwrap(),
            timestamp: Utc::now(),
            direction,
            strength,
            short_ma: 0.0,
            medium_ma: 0.0,
            long_ma: 0.0,
        }
    }

    #[test]
    fn test_passes_threshold() {
        assert!(signal(Direction::Buy, 0.5).passes(0.5));
        assert!(!signal(Direction::Buy, 0.444).passes(0.5));
        assert!(!signal(Direction::None, 1.0).passes(0.5));
    }

    #[test]
    fn test_from_epoch() {
        let s = PriceSample::from_epoch(Symbol::new("R_100").unwrap(), 1_700_000_000, 1.5);
        assert_eq!(s.timestamp.timestamp(), 1_700_000_000);
        assert_eq!(s.price, 1.5);
    }
}
