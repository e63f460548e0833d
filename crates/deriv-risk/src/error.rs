//! Risk error types.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Unknown position: nothing open to release")]
    NothingOpen,
}

pub type RiskResult<T> = Result<T, RiskError>;
