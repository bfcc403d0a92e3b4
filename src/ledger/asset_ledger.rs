//! Fungible balance ledger.
//!
//! The engines move funds only through [`AssetLedger`]. [`InMemoryLedger`]
//! is the reference implementation used by the CLI and tests.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::asset::AssetId;
use crate::error::{Error, Result};
use crate::utils::crypto::AccountId;

/// Custody of fungible balances
pub trait AssetLedger {
    /// Balance of `account` in `asset`
    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> u128;

    /// Move `amount` from `from` to `to`; `TransferFailed` if `from` is short
    fn transfer(&mut self, asset: &AssetId, from: &AccountId, to: &AccountId, amount: u128) -> Result<()>;

    /// Create `amount` for `to`
    fn mint(&mut self, asset: &AssetId, to: &AccountId, amount: u128) -> Result<()>;

    /// Destroy `amount` held by `from`
    fn burn(&mut self, asset: &AssetId, from: &AccountId, amount: u128) -> Result<()>;

    /// Total supply of `asset`
    fn total_supply(&self, asset: &AssetId) -> u128;

    /// Pull `amount` from `from` into `custody`
    fn transfer_in(&mut self, asset: &AssetId, from: &AccountId, custody: &AccountId, amount: u128) -> Result<()> {
        self.transfer(asset, from, custody, amount)
    }

    /// Pay `amount` out of `custody` to `to`
    fn transfer_out(&mut self, asset: &AssetId, custody: &AccountId, to: &AccountId, amount: u128) -> Result<()> {
        self.transfer(asset, custody, to, amount)
    }
}

fn transfer_failed(asset: &AssetId, amount: u128, reason: String) -> Error {
    Error::TransferFailed {
        asset: asset.to_string(),
        amount,
        reason,
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// IN-MEMORY LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Balances held in memory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InMemoryLedger {
    balances: BTreeMap<AssetId, BTreeMap<AccountId, u128>>,
    supply: BTreeMap<AssetId, u128>,
}

impl InMemoryLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-zero balances of an asset
    pub fn holders(&self, asset: &AssetId) -> Vec<(AccountId, u128)> {
        self.balances
            .get(asset)
            .map(|m| m.iter().map(|(a, b)| (*a, *b)).collect())
            .unwrap_or_default()
    }

    fn set_balance(&mut self, asset: &AssetId, account: &AccountId, balance: u128) {
        let by_account = self.balances.entry(asset.clone()).or_default();
        if balance == 0 {
            by_account.remove(account);
        } else {
            by_account.insert(*account, balance);
        }
    }
}

impl AssetLedger for InMemoryLedger {
    fn balance_of(&self, asset: &AssetId, account: &AccountId) -> u128 {
        self.balances
            .get(asset)
            .and_then(|m| m.get(account))
            .copied()
            .unwrap_or(0)
    }

    fn transfer(&mut self, asset: &AssetId, from: &AccountId, to: &AccountId, amount: u128) -> Result<()> {
        if amount == 0 || from == to {
            return Ok(());
        }

        let from_balance = self.balance_of(asset, from);
        if from_balance < amount {
            return Err(transfer_failed(
                asset,
                amount,
                format!("{} holds {}", from.short(), from_balance),
            ));
        }
        let to_balance = self
            .balance_of(asset, to)
            .checked_add(amount)
            .ok_or_else(|| transfer_failed(asset, amount, "recipient balance overflow".into()))?;

        self.set_balance(asset, from, from_balance - amount);
        self.set_balance(asset, to, to_balance);
        Ok(())
    }

    fn mint(&mut self, asset: &AssetId, to: &AccountId, amount: u128) -> Result<()> {
        let supply = self
            .total_supply(asset)
            .checked_add(amount)
            .ok_or_else(|| transfer_failed(asset, amount, "supply overflow".into()))?;
        let balance = self.balance_of(asset, to) + amount;

        self.supply.insert(asset.clone(), supply);
        self.set_balance(asset, to, balance);
        Ok(())
    }

    fn burn(&mut self, asset: &AssetId, from: &AccountId, amount: u128) -> Result<()> {
        let balance = self.balance_of(asset, from);
        if balance < amount {
            return Err(transfer_failed(
                asset,
                amount,
                format!("{} holds {}", from.short(), balance),
            ));
        }

        self.set_balance(asset, from, balance - amount);
        let supply = self.total_supply(asset).saturating_sub(amount);
        self.supply.insert(asset.clone(), supply);
        Ok(())
    }

    fn total_supply(&self, asset: &AssetId) -> u128 {
        self.supply.get(asset).copied().unwrap_or(0)
    }
}
