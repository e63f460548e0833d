//! Application error types.

use deriv_ws::FatalReport;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Session error: {0}")]
    Session(#[from] deriv_ws::WsError),

    #[error("Trader error: {0}")]
    Trader(#[from] deriv_trader::TraderError),

    #[error("Risk error: {0}")]
    Risk(#[from] deriv_risk::RiskError),

    #[error("Signal error: {0}")]
    Signal(#[from] deriv_signal::SignalError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] deriv_telemetry::TelemetryError),

    #[error("Session failed: {0}")]
    Fatal(FatalReport),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
