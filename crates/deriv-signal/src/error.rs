//! Signal engine error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SignalError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid sample: {0}")]
    InvalidSample(String),
}

pub type SignalResult<T> = Result<T, SignalError>;
