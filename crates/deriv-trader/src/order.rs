//! Order parameters derived from a signal.

use deriv_core::{ContractType, Money, Signal, Symbol};
use deriv_ws::ProposalParams;

use crate::config::{TraderConfig, DURATION_UNITS};
use crate::error::{TraderError, TraderResult};

/// A validated rise/fall order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub contract_type: ContractType,
    pub stake: Money,
    pub currency: String,
    pub duration: u32,
    pub duration_unit: String,
}

impl OrderRequest {
    /// Build the order for an actionable signal. CALL for Buy, PUT for Sell.
    pub fn for_signal(signal: &Signal, stake: Money, config: &TraderConfig) -> TraderResult<Self> {
        let contract_type = ContractType::for_direction(signal.direction).ok_or_else(|| {
            TraderError::InvalidTrade(format!("no contract for direction {}", signal.direction))
        })?;

        let order = Self {
            symbol: signal.symbol.clone(),
            contract_type,
            stake,
            currency: config.currency.clone(),
            duration: config.duration,
            duration_unit: config.duration_unit.clone(),
        };
        order.validate()?;
        Ok(order)
    }

    pub fn validate(&self) -> TraderResult<()> {
        if !self.stake.is_positive() {
            return Err(TraderError::InvalidTrade(format!(
                "stake ({}) must be positive",
                self.stake
            )));
        }
        if self.duration == 0 {
            return Err(TraderError::InvalidTrade(
                "duration must be greater than 0".to_string(),
            ));
        }
        if !DURATION_UNITS.contains(&self.duration_unit.as_str()) {
            return Err(TraderError::InvalidTrade(format!(
                "unknown duration unit '{}'",
                self.duration_unit
            )));
        }
        Ok(())
    }

    pub fn proposal_params(&self) -> ProposalParams {
        ProposalParams {
            symbol: self.symbol.to_string(),
            contract_type: self.contract_type,
            amount: self.stake,
            currency: self.currency.clone(),
            duration: self.duration,
            duration_unit: self.duration_unit.clone(),
        }
    }
}

/// Venue confirmation of a bought contract.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderReceipt {
    pub contract_id: u64,
    pub buy_price: Money,
    pub balance_after: Option<Money>,
}
