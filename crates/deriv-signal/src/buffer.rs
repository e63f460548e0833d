//! Bounded rolling price buffer.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// What happened to a pushed sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Appended,
    /// Same timestamp as the newest sample (a forming candle): value replaced.
    Replaced,
    /// Older than the newest sample: ignored.
    Stale,
}

/// Most recent prices for one instrument, oldest first.
///
/// Never holds more than `capacity` samples; the oldest is evicted on
/// overflow.
#[derive(Debug, Clone)]
pub struct PriceBuffer {
    prices: VecDeque<f64>,
    capacity: usize,
    last_timestamp: Option<DateTime<Utc>>,
}

impl PriceBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            prices: VecDeque::with_capacity(capacity),
            capacity,
            last_timestamp: None,
        }
    }

    pub fn push(&mut self, timestamp: DateTime<Utc>, price: f64) -> PushOutcome {
        match self.last_timestamp {
            Some(last) if timestamp < last => return PushOutcome::Stale,
            Some(last) if timestamp == last => {
                if let Some(newest) = self.prices.back_mut() {
                    *newest = price;
                    return PushOutcome::Replaced;
                }
            }
            _ => {}
        }

        if self.prices.len() == self.capacity {
            self.prices.pop_front();
        }
        self.prices.push_back(price);
        self.last_timestamp = Some(timestamp);
        PushOutcome::Appended
    }

    /// Mean of the newest `n` prices, or None if fewer are buffered.
    pub fn mean_last(&self, n: usize) -> Option<f64> {
        if n == 0 || self.prices.len() < n {
            return None;
        }
        let sum: f64 = self.prices.iter().rev().take(n).sum();
        Some(sum / n as f64)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.prices.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<f64> {
        self.prices.back().copied()
    }

    pub fn clear(&mut self) {
        self.prices.clear();
        self.last_timestamp = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_evicts_oldest_on_overflow() {
        let mut buffer = PriceBuffer::new(3);
        for i in 0..5 {
            assert_eq!(buffer.push(at(i), i as f64), PushOutcome::Appended);
            assert!(buffer.len() <= 3);
        }
        assert!(buffer.is_full());
        // 2, 3, 4 remain
        assert_eq!(buffer.mean_last(3), Some(3.0));
        assert_eq!(buffer.latest(), Some(4.0));
    }

    #[test]
    fn test_mean_last_requires_enough_samples() {
        let mut buffer = PriceBuffer::new(10);
        buffer.push(at(0), 1.0);
        buffer.push(at(1), 3.0);
        assert_eq!(buffer.mean_last(2), Some(2.0));
        assert_eq!(buffer.mean_last(1), Some(3.0));
        assert_eq!(buffer.mean_last(3), None);
        assert_eq!(buffer.mean_last(0), None);
    }

    #[test]
    fn test_same_timestamp_replaces() {
        let mut buffer = PriceBuffer::new(5);
        let t = at(60);
        buffer.push(t, 100.0);
        assert_eq!(buffer.push(t, 101.5), PushOutcome::Replaced);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.latest(), Some(101.5));
    }

    #[test]
    fn test_stale_sample_ignored() {
        let mut buffer = PriceBuffer::new(5);
        buffer.push(at(10), 1.0);
        assert_eq!(buffer.push(at(10) - Duration::seconds(1), 2.0), PushOutcome::Stale);
        assert_eq!(buffer.len(), 1);

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.push(at(0), 3.0), PushOutcome::Appended);
    }
}
