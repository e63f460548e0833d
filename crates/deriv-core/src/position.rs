//! Position lifecycle.
//!
//! `Pending` (order sent) -> `Open` (venue confirmed the buy) -> `Settled`,
//! or `Pending` -> `Rejected` when the order never reached the venue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::decimal::Money;
use crate::error::CoreError;
use crate::market::{ContractType, Symbol};

/// Local identifier assigned before the venue knows about the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(Uuid);

impl PositionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PositionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionStatus {
    Pending,
    Open,
    Settled,
    Rejected,
}

impl PositionStatus {
    /// Pending and Open positions block a new order on the same instrument.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Open)
    }
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Open => "open",
            Self::Settled => "settled",
            Self::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    /// Venue contract id, known once the buy is confirmed.
    pub contract_id: Option<u64>,
    pub symbol: Symbol,
    pub contract_type: ContractType,
    pub stake: Money,
    pub entry_time: DateTime<Utc>,
    pub status: PositionStatus,
    pub profit: Option<Money>,
}

impl Position {
    pub fn pending(symbol: Symbol, contract_type: ContractType, stake: Money) -> Self {
        Self {
            id: PositionId::new(),
            contract_id: None,
            symbol,
            contract_type,
            stake,
            entry_time: Utc::now(),
            status: PositionStatus::Pending,
            profit: None,
        }
    }

    pub fn confirm(&mut self, contract_id: u64) -> Result<(), CoreError> {
        self.transition(PositionStatus::Pending, PositionStatus::Open)?;
        self.contract_id = Some(contract_id);
        Ok(())
    }

    pub fn settle(&mut self, profit: Money) -> Result<(), CoreError> {
        self.transition(PositionStatus::Open, PositionStatus::Settled)?;
        self.profit = Some(profit);
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), CoreError> {
        self.transition(PositionStatus::Pending, PositionStatus::Rejected)
    }

    fn transition(&mut self, from: PositionStatus, to: PositionStatus) -> Result<(), CoreError> {
        if self.status != from {
            return Err(CoreError::IllegalTransition {
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        self.status = to;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pending() -> Position {
        Position::pending(
            Symbol::new("R_100").unwrap(),
            ContractType::Call,
            Money::new(dec!(10)),
        )
    }

    #[test]
    fn test_happy_path() {
        let mut p = pending();
        assert!(p.status.is_active());
        p.confirm(42).unwrap();
        assert_eq!(p.status, PositionStatus::Open);
        assert_eq!(p.contract_id, Some(42));
        p.settle(Money::new(dec!(9.5))).unwrap();
        assert_eq!(p.status, PositionStatus::Settled);
        assert!(!p.status.is_active());
    }

    #[test]
    fn test_reject_only_from_pending() {
        let mut p = pending();
        p.reject().unwrap();
        assert_eq!(p.status, PositionStatus::Rejected);
        assert!(p.confirm(1).is_err());

        let mut open = pending();
        open.confirm(7).unwrap();
        assert!(open.reject().is_err());
    }

    #[test]
    fn test_cannot_settle_pending() {
        let mut p = pending();
        let err = p.settle(Money::ZERO).unwrap_err();
        assert!(err.to_string().contains("pending -> settled"));
    }
}
