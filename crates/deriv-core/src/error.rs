//! Error types for deriv-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid account type: {0} (expected demo or real)")]
    InvalidAccountType(String),

    #[error("Invalid contract type: {0} (expected CALL or PUT)")]
    InvalidContractType(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),

    #[error("Illegal position transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
