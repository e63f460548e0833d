//! Calendar source for the trading-day boundary.

use chrono::{NaiveDate, Utc};
use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    /// Current trading date.
    fn today(&self) -> NaiveDate;
}

/// UTC calendar date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Clock that only moves when told to. For tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    date: Mutex<NaiveDate>,
}

impl ManualClock {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Mutex::new(date),
        }
    }

    pub fn set(&self, date: NaiveDate) {
        *self.date.lock() = date;
    }

    /// Move forward by `days`.
    pub fn advance_days(&self, days: u64) {
        let mut date = self.date.lock();
        if let Some(next) = date.checked_add_days(chrono::Days::new(days)) {
            *date = next;
        }
    }
}

impl Clock for ManualClock {
    fn today(&self) -> NaiveDate {
        *self.date.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        clock.advance_days(1);
        assert_eq!(clock.today(), NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
    }
}
