//! Settlement journal.
//!
//! Every transfer made on behalf of one operation goes through a
//! [`Settlement`]. If the operation fails after some transfers succeeded,
//! [`Settlement::rollback`] replays them in reverse so the ledger ends up
//! exactly as it started.

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::core::asset::AssetId;
use crate::error::{Error, Result};
use crate::ledger::asset_ledger::AssetLedger;
use crate::utils::crypto::AccountId;

/// One completed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    /// Asset moved
    pub asset: AssetId,
    /// Sender
    pub from: AccountId,
    /// Recipient
    pub to: AccountId,
    /// Amount moved
    pub amount: u128,
}

/// Journaled view of an asset ledger for a single operation
pub struct Settlement<'a> {
    ledger: &'a mut dyn AssetLedger,
    journal: Vec<Movement>,
}

impl<'a> Settlement<'a> {
    /// Start an empty journal over `ledger`
    pub fn new(ledger: &'a mut dyn AssetLedger) -> Self {
        Self {
            ledger,
            journal: Vec::new(),
        }
    }

    /// Pull `amount` from `from` into the custody account `custody`
    pub fn transfer_in(&mut self, asset: &AssetId, from: &AccountId, custody: &AccountId, amount: u128) -> Result<()> {
        self.transfer(asset, from, custody, amount)
    }

    /// Pay `amount` out of the custody account `custody` to `to`
    pub fn transfer_out(&mut self, asset: &AssetId, custody: &AccountId, to: &AccountId, amount: u128) -> Result<()> {
        self.transfer(asset, custody, to, amount)
    }

    fn transfer(&mut self, asset: &AssetId, from: &AccountId, to: &AccountId, amount: u128) -> Result<()> {
        if amount == 0 || from == to {
            return Ok(());
        }
        self.ledger.transfer(asset, from, to, amount)?;
        self.journal.push(Movement {
            asset: asset.clone(),
            from: *from,
            to: *to,
            amount,
        });
        Ok(())
    }

    /// Balance through the underlying ledger
    pub fn balance_of(&self, asset: &AssetId, account: &AccountId) -> u128 {
        self.ledger.balance_of(asset, account)
    }

    /// Transfers made so far
    pub fn movements(&self) -> &[Movement] {
        &self.journal
    }

    /// Keep every transfer
    pub fn commit(self) -> Vec<Movement> {
        self.journal
    }

    /// Reverse every transfer, newest first
    pub fn rollback(self) -> Result<()> {
        if !self.journal.is_empty() {
            warn!(transfers = self.journal.len(), "rolling back settlement");
        }
        let Settlement { ledger, journal } = self;
        for movement in journal.iter().rev() {
            if let Err(e) = ledger.transfer(&movement.asset, &movement.to, &movement.from, movement.amount) {
                error!(asset = %movement.asset, amount = movement.amount, "settlement rollback failed: {}", e);
                return Err(Error::Internal(format!("settlement rollback failed: {}", e)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::asset_ledger::InMemoryLedger;

    fn busd() -> AssetId {
        AssetId::new("bUSD").unwrap()
    }

    #[test]
    fn test_rollback_restores_balances() {
        let alice = AccountId::from_label("alice");
        let custody = AccountId::from_label("custody");
        let bob = AccountId::from_label("bob");

        let mut ledger = InMemoryLedger::new();
        ledger.mint(&busd(), &alice, 100).unwrap();
        let before = ledger.clone();

        let mut tx = Settlement::new(&mut ledger);
        tx.transfer_in(&busd(), &alice, &custody, 70).unwrap();
        tx.transfer_out(&busd(), &custody, &bob, 50).unwrap();
        assert_eq!(tx.movements().len(), 2);
        assert!(tx.transfer_out(&busd(), &custody, &bob, 50).is_err());
        tx.rollback().unwrap();

        assert_eq!(ledger, before);
    }

    #[test]
    fn test_commit_keeps_transfers() {
        let alice = AccountId::from_label("alice");
        let custody = AccountId::from_label("custody");

        let mut ledger = InMemoryLedger::new();
        ledger.mint(&busd(), &alice, 100).unwrap();

        let mut tx = Settlement::new(&mut ledger);
        tx.transfer_in(&busd(), &alice, &custody, 30).unwrap();
        tx.transfer_in(&busd(), &alice, &custody, 0).unwrap();
        let movements = tx.commit();

        assert_eq!(movements.len(), 1);
        assert_eq!(ledger.balance_of(&busd(), &custody), 30);
    }
}
