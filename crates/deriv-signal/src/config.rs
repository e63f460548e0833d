//! Signal engine configuration.

use serde::{Deserialize, Serialize};

use crate::error::{SignalError, SignalResult};

/// Moving-average window lengths, in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalConfig {
    #[serde(default = "default_short_period")]
    pub short_period: usize,
    #[serde(default = "default_medium_period")]
    pub medium_period: usize,
    /// Also the buffer capacity and the warm-up length.
    #[serde(default = "default_long_period")]
    pub long_period: usize,
}

fn default_short_period() -> usize {
    5
}

fn default_medium_period() -> usize {
    10
}

fn default_long_period() -> usize {
    20
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            short_period: default_short_period(),
            medium_period: default_medium_period(),
            long_period: default_long_period(),
        }
    }
}

impl SignalConfig {
    pub fn new(short_period: usize, medium_period: usize, long_period: usize) -> Self {
        Self {
            short_period,
            medium_period,
            long_period,
        }
    }

    /// Periods must be positive and strictly increasing.
    pub fn validate(&self) -> SignalResult<()> {
        if self.short_period == 0 {
            return Err(SignalError::ConfigError(
                "short_period must be greater than 0".to_string(),
            ));
        }
        if self.short_period >= self.medium_period || self.medium_period >= self.long_period {
            return Err(SignalError::ConfigError(format!(
                "periods must be strictly increasing: short={} medium={} long={}",
                self.short_period, self.medium_period, self.long_period
            )));
        }
        Ok(())
    }
}
