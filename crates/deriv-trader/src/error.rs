//! Trader error types.

use deriv_core::CoreError;
use deriv_risk::RiskError;
use deriv_signal::SignalError;
use deriv_ws::WsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TraderError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Trade parameters that the venue would refuse. The trade is skipped.
    #[error("Invalid trade: {0}")]
    InvalidTrade(String),

    #[error("Session error: {0}")]
    Session(#[from] WsError),

    #[error("Risk ledger error: {0}")]
    Risk(#[from] RiskError),

    #[error("Signal engine error: {0}")]
    Signal(#[from] SignalError),

    #[error("Position error: {0}")]
    Position(#[from] CoreError),
}

impl TraderError {
    /// Errors that must stop the trading loop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Session(e) if e.is_fatal())
    }
}

pub type TraderResult<T> = Result<T, TraderError>;
