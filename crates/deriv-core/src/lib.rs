//! Core domain types for the Deriv trading bot.
//!
//! This crate provides the vocabulary shared by every other crate:
//! - `Symbol`, `AccountType`, `ContractType`: instrument and account identifiers
//! - `Money`: precision-safe amounts for stakes, balances and P&L
//! - `PriceSample`, `Signal`, `Direction`: signal engine inputs and outputs
//! - `Position`, `PositionStatus`: trade lifecycle owned by the orchestrator

pub mod decimal;
pub mod error;
pub mod market;
pub mod position;
pub mod signal;

pub use decimal::Money;
pub use error::{CoreError, Result};
pub use market::{AccountType, ContractType, Symbol};
pub use position::{Position, PositionId, PositionStatus};
pub use signal::{Direction, PriceSample, Signal};
