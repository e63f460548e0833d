//! Signal engine.
//!
//! Rule, evaluated on every accepted sample once the buffer holds
//! `long_period` prices:
//! - Buy when short > medium > long
//! - Sell when short < medium < long
//! - None otherwise (any tie included)
//!
//! Strength = min(|short - long| / long, 1.0), 0 when long is 0.
//!
//! History is not persisted; after a restart the buffers refill from the
//! feed (or from a history request) before the first signal.

use deriv_core::{Direction, PriceSample, Signal, Symbol};
use std::collections::HashMap;
use tracing::{debug, trace, warn};

use crate::buffer::{PriceBuffer, PushOutcome};
use crate::config::SignalConfig;
use crate::error::{SignalError, SignalResult};

/// Classify three averages into a direction and strength.
pub fn crossover(short: f64, medium: f64, long: f64) -> (Direction, f64) {
    let direction = if short > medium && medium > long {
        Direction::Buy
    } else if short < medium && medium < long {
        Direction::Sell
    } else {
        Direction::None
    };

    let strength = if long == 0.0 {
        0.0
    } else {
        ((short - long).abs() / long.abs()).min(1.0)
    };
    let strength = if strength.is_finite() { strength } else { 0.0 };
    (direction, strength)
}

pub struct SignalEngine {
    config: SignalConfig,
    buffers: HashMap<Symbol, PriceBuffer>,
}

impl SignalEngine {
    pub fn new(config: SignalConfig) -> SignalResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            buffers: HashMap::new(),
        })
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Feed one sample. Returns a signal once the instrument is warmed up.
    pub fn on_sample(&mut self, sample: &PriceSample) -> Option<Signal> {
        if let Err(e) = validate_price(sample.price) {
            warn!(symbol = %sample.symbol, error = %e, "Dropping price sample");
            return None;
        }

        let capacity = self.config.long_period;
        let buffer = self
            .buffers
            .entry(sample.symbol.clone())
            .or_insert_with(|| PriceBuffer::new(capacity));

        if buffer.push(sample.timestamp, sample.price) == PushOutcome::Stale {
            trace!(symbol = %sample.symbol, "Stale sample ignored");
            return None;
        }

        let short = buffer.mean_last(self.config.short_period)?;
        let medium = buffer.mean_last(self.config.medium_period)?;
        let long = buffer.mean_last(self.config.long_period)?;
        let (direction, strength) = crossover(short, medium, long);

        debug!(
            symbol = %sample.symbol,
            %direction,
            strength,
            short_ma = short,
            medium_ma = medium,
            long_ma = long,
            "Signal computed"
        );

        Some(Signal {
            symbol: sample.symbol.clone(),
            timestamp: sample.timestamp,
            direction,
            strength,
            short_ma: short,
            medium_ma: medium,
            long_ma: long,
        })
    }

    /// Feed a batch (e.g. history) through the same path. Returns the signal
    /// produced by the last sample, if any.
    pub fn warm_up<'a, I>(&mut self, samples: I) -> Option<Signal>
    where
        I: IntoIterator<Item = &'a PriceSample>,
    {
        samples
            .into_iter()
            .fold(None, |_, sample| self.on_sample(sample))
    }

    /// Number of buffered samples for `symbol`.
    pub fn buffered(&self, symbol: &Symbol) -> usize {
        self.buffers.get(symbol).map_or(0, PriceBuffer::len)
    }

    pub fn is_warm(&self, symbol: &Symbol) -> bool {
        self.buffers.get(symbol).is_some_and(PriceBuffer::is_full)
    }

    /// Drop history for one instrument.
    pub fn reset(&mut self, symbol: &Symbol) {
        if let Some(buffer) = self.buffers.get_mut(symbol) {
            buffer.clear();
        }
    }
}

fn validate_price(price: f64) -> SignalResult<()> {
    if !price.is_finite() || price < 0.0 {
        return Err(SignalError::InvalidSample(format!("price {price}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn symbol() -> Symbol {
        Symbol::new("R_100").unwrap()
    }

    fn samples(prices: &[f64]) -> Vec<PriceSample> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| PriceSample::from_epoch(symbol(), 1_700_000_000 + i as i64, *p))
            .collect()
    }

    fn series(blocks: &[(usize, f64)]) -> Vec<f64> {
        blocks
            .iter()
            .flat_map(|(n, p)| std::iter::repeat(*p).take(*n))
            .collect()
    }

    fn engine() -> SignalEngine {
        SignalEngine::new(SignalConfig::default()).unwrap()
    }

    #[test]
    fn test_no_signal_during_warm_up() {
        let mut engine = engine();
        let prices: Vec<f64> = (1..=19).map(|i| 100.0 + i as f64).collect();
        for sample in samples(&prices) {
            assert!(engine.on_sample(&sample).is_none());
        }
        assert_eq!(engine.buffered(&symbol()), 19);
        assert!(!engine.is_warm(&symbol()));
    }

    #[test]
    fn test_rising_series_is_buy() {
        let mut engine = engine();
        let prices: Vec<f64> = (1..=25).map(|i| 100.0 + i as f64).collect();
        let signal = engine.warm_up(&samples(&prices)).unwrap();
        assert_eq!(signal.direction, Direction::Buy);
        assert!(signal.short_ma > signal.medium_ma && signal.medium_ma > signal.long_ma);
        assert_eq!(engine.buffered(&symbol()), 20);
    }

    #[test]
    fn test_falling_series_is_sell() {
        let mut engine = engine();
        let prices: Vec<f64> = (1..=20).map(|i| 200.0 - i as f64).collect();
        let signal = engine.warm_up(&samples(&prices)).unwrap();
        assert_eq!(signal.direction, Direction::Sell);
    }

    #[test]
    fn test_flat_series_is_none() {
        let mut engine = engine();
        let signal = engine.warm_up(&samples(&[50.0; 20])).unwrap();
        assert_eq!(signal.direction, Direction::None);
        assert_eq!(signal.strength, 0.0);
    }

    #[test]
    fn test_short_110_medium_100_long_90() {
        let mut engine = engine();
        let prices = series(&[(10, 80.0), (5, 90.0), (5, 110.0)]);
        let signal = engine.warm_up(&samples(&prices)).unwrap();
        assert_eq!(signal.short_ma, 110.0);
        assert_eq!(signal.medium_ma, 100.0);
        assert_eq!(signal.long_ma, 90.0);
        assert_eq!(signal.direction, Direction::Buy);
        assert!((signal.strength - 20.0 / 90.0).abs() < 1e-12);
        assert!(!signal.passes(0.5));
    }

    #[test]
    fn test_short_130_medium_100_long_90() {
        let mut engine = engine();
        let prices = series(&[(10, 80.0), (5, 70.0), (5, 130.0)]);
        let signal = engine.warm_up(&samples(&prices)).unwrap();
        assert_eq!(signal.short_ma, 130.0);
        assert_eq!(signal.medium_ma, 100.0);
        assert_eq!(signal.long_ma, 90.0);
        assert!((signal.strength - 40.0 / 90.0).abs() < 1e-12);
        assert!(!signal.passes(0.5));
    }

    #[test]
    fn test_crossover_ties_and_bounds() {
        assert_eq!(crossover(100.0, 100.0, 90.0).0, Direction::None);
        assert_eq!(crossover(110.0, 100.0, 100.0).0, Direction::None);
        assert_eq!(crossover(1.0, 2.0, 0.0), (Direction::None, 0.0));
        // Divergence larger than the long average saturates.
        assert_eq!(crossover(500.0, 200.0, 100.0), (Direction::Buy, 1.0));
        for (s, m, l) in [(1.0, 2.0, 3.0), (3.0, 2.0, 1.0), (0.1, 50.0, 0.2)] {
            let (_, strength) = crossover(s, m, l);
            assert!((0.0..=1.0).contains(&strength));
        }
    }

    #[test]
    fn test_instruments_are_independent() {
        let mut engine = engine();
        let other = Symbol::new("R_50").unwrap();
        for sample in samples(&[100.0; 20]) {
            engine.on_sample(&sample);
        }
        let first_other = PriceSample::from_epoch(other.clone(), 1_700_000_000, 10.0);
        assert!(engine.on_sample(&first_other).is_none());
        assert_eq!(engine.buffered(&other), 1);
        assert!(engine.is_warm(&symbol()));
    }

    #[test]
    fn test_invalid_and_stale_samples_dropped() {
        let mut engine = engine();
        let t: DateTime<Utc> = DateTime::from_timestamp(1_700_000_100, 0).unwrap();
        engine.on_sample(&PriceSample::new(symbol(), t, 1.0));
        engine.on_sample(&PriceSample::new(symbol(), t, f64::NAN));
        engine.on_sample(&PriceSample::new(symbol(), t - chrono::Duration::seconds(5), 2.0));
        assert_eq!(engine.buffered(&symbol()), 1);

        engine.reset(&symbol());
        assert_eq!(engine.buffered(&symbol()), 0);
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(SignalEngine::new(SignalConfig::new(10, 5, 20)).is_err());
    }
}
