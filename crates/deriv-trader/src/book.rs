//! Position book.
//!
//! Holds every Pending or Open position. Settled and rejected positions
//! leave the book.

use std::collections::HashMap;

use deriv_core::{Money, Position, PositionId, Symbol};
use tracing::debug;

use crate::error::TraderResult;

#[derive(Debug, Default)]
pub struct PositionBook {
    positions: HashMap<PositionId, Position>,
    by_contract: HashMap<u64, PositionId>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a new Pending position.
    pub fn insert(&mut self, position: Position) -> PositionId {
        let id = position.id;
        debug!(position_id = %id, symbol = %position.symbol, stake = %position.stake, "Position pending");
        self.positions.insert(id, position);
        id
    }

    pub fn get(&self, id: &PositionId) -> Option<&Position> {
        self.positions.get(id)
    }

    pub fn by_contract(&self, contract_id: u64) -> Option<&Position> {
        self.by_contract
            .get(&contract_id)
            .and_then(|id| self.positions.get(id))
    }

    /// Pending -> Open.
    pub fn confirm(&mut self, id: &PositionId, contract_id: u64) -> TraderResult<Option<&Position>> {
        let Some(position) = self.positions.get_mut(id) else {
            return Ok(None);
        };
        position.confirm(contract_id)?;
        self.by_contract.insert(contract_id, *id);
        debug!(position_id = %id, contract_id, "Position open");
        Ok(Some(&*position))
    }

    /// Pending -> Rejected. The position leaves the book.
    pub fn reject(&mut self, id: &PositionId) -> TraderResult<Option<Position>> {
        let Some(mut position) = self.positions.remove(id) else {
            return Ok(None);
        };
        position.reject()?;
        Ok(Some(position))
    }

    /// Open -> Settled. The position leaves the book.
    pub fn settle(&mut self, contract_id: u64, profit: Money) -> TraderResult<Option<Position>> {
        let Some(id) = self.by_contract.remove(&contract_id) else {
            return Ok(None);
        };
        let Some(mut position) = self.positions.remove(&id) else {
            return Ok(None);
        };
        position.settle(profit)?;
        Ok(Some(position))
    }

    /// Whether `symbol` has a Pending or Open position.
    pub fn has_active(&self, symbol: &Symbol) -> bool {
        self.positions
            .values()
            .any(|p| &p.symbol == symbol && p.status.is_active())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Contract ids of Open positions.
    pub fn open_contracts(&self) -> Vec<u64> {
        self.by_contract.keys().copied().collect()
    }
}
