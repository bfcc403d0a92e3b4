//! Position management.
//!
//! This module implements the per-loan bookkeeping:
//! - Allocating monotonic, never-reused position ids
//! - Tracking collateral and debt per position
//! - The `(owner, asset) -> open position` and `owner -> open ids` indexes

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::core::asset::AssetId;
use crate::error::{Error, Result};
use crate::utils::crypto::{AccountId, Hash};

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION ID
// ═══════════════════════════════════════════════════════════════════════════════

/// Position identifier, 1-based and monotonic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionId(pub u64);

impl fmt::Display for PositionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle of a position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionStatus {
    /// Open; accepts deposits, borrows, repays and withdrawals
    Active,
    /// Collateral and debt both reached zero; terminal
    Closed,
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION
// ═══════════════════════════════════════════════════════════════════════════════

/// A single collateralized loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Unique identifier
    pub id: PositionId,
    /// Owner, immutable
    pub owner: AccountId,
    /// Collateral asset
    pub asset: AssetId,
    /// Collateral in raw units of `asset`
    pub collateral: u128,
    /// Debt in raw units of the debt asset
    pub debt: u128,
    /// Current status
    pub status: PositionStatus,
    /// Block height when the position was opened
    pub created_at: u64,
    /// Block height of last modification
    pub last_updated: u64,
}

impl Position {
    /// Whether the position is open
    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    /// Check if position has any debt
    pub fn has_debt(&self) -> bool {
        self.debt > 0
    }

    /// Whether both balances are zero
    pub fn is_empty(&self) -> bool {
        self.collateral == 0 && self.debt == 0
    }

    /// Fail with `PositionNotActive` unless open
    pub fn ensure_active(&self) -> Result<()> {
        if !self.is_active() {
            return Err(Error::PositionNotActive(self.id.0));
        }
        Ok(())
    }

    /// Verify owner for privileged operations
    pub fn verify_owner(&self, caller: &AccountId) -> Result<()> {
        if self.owner != *caller {
            return Err(Error::NotAuthorized(format!(
                "only the owner of position {} can perform this operation",
                self.id
            )));
        }
        Ok(())
    }

    /// Serialize position to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize position from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Hash of the position state
    pub fn state_hash(&self) -> Result<Hash> {
        Ok(Hash::sha256(&self.to_bytes()?))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// All positions plus the secondary indexes over open ones
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionLedger {
    /// All positions indexed by ID, closed ones included
    positions: BTreeMap<PositionId, Position>,
    /// Next id to allocate
    next_id: u64,
    /// Open position per (owner, asset)
    open_by_owner_asset: BTreeMap<AccountId, BTreeMap<AssetId, PositionId>>,
    /// Open positions per owner
    open_by_owner: BTreeMap<AccountId, BTreeSet<PositionId>>,
}

impl Default for PositionLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl PositionLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            positions: BTreeMap::new(),
            next_id: 1,
            open_by_owner_asset: BTreeMap::new(),
            open_by_owner: BTreeMap::new(),
        }
    }

    /// Open a new empty position and index it
    pub fn open(&mut self, owner: AccountId, asset: AssetId, block_height: u64) -> Result<PositionId> {
        if self.find_open(&owner, &asset).is_some() {
            return Err(Error::InvariantViolation(format!(
                "owner {} already has an open {} position",
                owner.short(),
                asset
            )));
        }

        let id = PositionId(self.next_id);
        self.next_id = self.next_id.checked_add(1).ok_or(Error::Overflow {
            operation: "position id allocation".into(),
        })?;

        self.open_by_owner_asset
            .entry(owner)
            .or_default()
            .insert(asset.clone(), id);
        self.open_by_owner.entry(owner).or_default().insert(id);
        self.positions.insert(
            id,
            Position {
                id,
                owner,
                asset,
                collateral: 0,
                debt: 0,
                status: PositionStatus::Active,
                created_at: block_height,
                last_updated: block_height,
            },
        );

        Ok(id)
    }

    /// Get a position by id
    pub fn get(&self, id: PositionId) -> Result<&Position> {
        self.positions.get(&id).ok_or(Error::PositionNotFound(id.0))
    }

    /// Get a mutable position by id
    pub fn get_mut(&mut self, id: PositionId) -> Result<&mut Position> {
        self.positions.get_mut(&id).ok_or(Error::PositionNotFound(id.0))
    }

    /// Open position for (owner, asset), if any
    pub fn find_open(&self, owner: &AccountId, asset: &AssetId) -> Option<PositionId> {
        self.open_by_owner_asset
            .get(owner)
            .and_then(|by_asset| by_asset.get(asset))
            .copied()
    }

    /// Ids of the owner's open positions
    pub fn open_ids_of(&self, owner: &AccountId) -> Vec<PositionId> {
        self.open_by_owner
            .get(owner)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// The owner's open positions
    pub fn open_positions_of(&self, owner: &AccountId) -> Vec<&Position> {
        self.open_by_owner
            .get(owner)
            .map(|ids| ids.iter().filter_map(|id| self.positions.get(id)).collect())
            .unwrap_or_default()
    }

    /// Mark a position closed and drop it from the open indexes
    pub fn close(&mut self, id: PositionId, block_height: u64) -> Result<()> {
        let position = self.positions.get_mut(&id).ok_or(Error::PositionNotFound(id.0))?;
        position.ensure_active()?;
        if position.debt != 0 {
            return Err(Error::InvariantViolation(format!(
                "position {} cannot close with outstanding debt",
                id
            )));
        }

        position.status = PositionStatus::Closed;
        position.last_updated = block_height;
        let owner = position.owner;
        let asset = position.asset.clone();

        if let Some(by_asset) = self.open_by_owner_asset.get_mut(&owner) {
            by_asset.remove(&asset);
            if by_asset.is_empty() {
                self.open_by_owner_asset.remove(&owner);
            }
        }
        if let Some(ids) = self.open_by_owner.get_mut(&owner) {
            ids.remove(&id);
            if ids.is_empty() {
                self.open_by_owner.remove(&owner);
            }
        }
        Ok(())
    }

    /// All open positions
    pub fn open_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values().filter(|p| p.is_active())
    }

    /// All positions, closed ones included
    pub fn all_positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Get total number of positions ever opened
    pub fn total_count(&self) -> usize {
        self.positions.len()
    }

    /// Get number of open positions
    pub fn open_count(&self) -> usize {
        self.open_by_owner.values().map(BTreeSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> AccountId {
        AccountId::from_label("alice")
    }

    fn bob() -> AccountId {
        AccountId::from_label("bob")
    }

    fn wbtc() -> AssetId {
        AssetId::new("wBTC").unwrap()
    }

    fn weth() -> AssetId {
        AssetId::new("wETH").unwrap()
    }

    #[test]
    fn test_ids_are_one_based_and_monotonic() {
        let mut ledger = PositionLedger::new();
        let a = ledger.open(alice(), wbtc(), 1).unwrap();
        let b = ledger.open(bob(), wbtc(), 1).unwrap();
        assert_eq!(a, PositionId(1));
        assert_eq!(b, PositionId(2));
        assert_eq!(ledger.total_count(), 2);
    }

    #[test]
    fn test_owner_indexes() {
        let mut ledger = PositionLedger::new();
        let a = ledger.open(alice(), wbtc(), 1).unwrap();
        let b = ledger.open(alice(), weth(), 1).unwrap();
        ledger.open(bob(), wbtc(), 1).unwrap();

        assert_eq!(ledger.find_open(&alice(), &wbtc()), Some(a));
        assert_eq!(ledger.find_open(&alice(), &weth()), Some(b));
        assert_eq!(ledger.open_ids_of(&alice()), vec![a, b]);
        assert_eq!(ledger.open_count(), 3);
        assert!(ledger.open(alice(), wbtc(), 2).is_err());
    }

    #[test]
    fn test_close_removes_from_indexes_and_never_reuses_id() {
        let mut ledger = PositionLedger::new();
        let a = ledger.open(alice(), wbtc(), 1).unwrap();
        ledger.close(a, 5).unwrap();

        assert_eq!(ledger.find_open(&alice(), &wbtc()), None);
        assert!(ledger.open_ids_of(&alice()).is_empty());
        assert_eq!(ledger.get(a).unwrap().status, PositionStatus::Closed);
        assert_eq!(ledger.get(a).unwrap().last_updated, 5);
        assert!(matches!(ledger.close(a, 6), Err(Error::PositionNotActive(1))));

        let reopened = ledger.open(alice(), wbtc(), 7).unwrap();
        assert_eq!(reopened, PositionId(2));
    }

    #[test]
    fn test_close_with_debt_fails() {
        let mut ledger = PositionLedger::new();
        let a = ledger.open(alice(), wbtc(), 1).unwrap();
        ledger.get_mut(a).unwrap().debt = 10;
        assert!(matches!(ledger.close(a, 2), Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_verify_owner() {
        let mut ledger = PositionLedger::new();
        let a = ledger.open(alice(), wbtc(), 1).unwrap();
        let position = ledger.get(a).unwrap();
        assert!(position.verify_owner(&alice()).is_ok());
        assert!(matches!(position.verify_owner(&bob()), Err(Error::NotAuthorized(_))));
        assert!(matches!(ledger.get(PositionId(99)), Err(Error::PositionNotFound(99))));
    }

    #[test]
    fn test_position_bytes_roundtrip() {
        let mut ledger = PositionLedger::new();
        let a = ledger.open(alice(), wbtc(), 1).unwrap();
        let position = ledger.get(a).unwrap().clone();
        let bytes = position.to_bytes().unwrap();
        assert_eq!(Position::from_bytes(&bytes).unwrap(), position);
        assert_eq!(position.state_hash().unwrap(), position.state_hash().unwrap());
    }
}
