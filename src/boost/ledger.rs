//! Boost ledger.
//!
//! Tracks per-account stake of the boost token and derives the
//! collateral-factor bonus every position of that account receives.
//! The bonus grows linearly with stake and saturates at `max_bonus` once
//! the stake reaches `reference_stake`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::utils::crypto::AccountId;
use crate::utils::math::{mul_div_floor, safe_add, Wad};
use crate::utils::validation::validate_non_zero;

/// Per-account boost stakes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoostLedger {
    stakes: BTreeMap<AccountId, u128>,
    total_staked: u128,
    max_bonus: Wad,
    reference_stake: u128,
}

impl BoostLedger {
    /// Create a ledger with the given bonus curve
    pub fn new(max_bonus: Wad, reference_stake: u128) -> Self {
        Self {
            stakes: BTreeMap::new(),
            total_staked: 0,
            max_bonus,
            reference_stake,
        }
    }

    /// Bonus granted for a given stake
    pub fn bonus_for_stake(&self, stake: u128) -> Result<Wad> {
        if self.reference_stake == 0 || stake >= self.reference_stake {
            return Ok(self.max_bonus);
        }
        mul_div_floor(self.max_bonus.raw(), stake, self.reference_stake).map(Wad::from_raw)
    }

    /// Bonus currently granted to `account`
    pub fn bonus_of(&self, account: &AccountId) -> Result<Wad> {
        self.bonus_for_stake(self.stake_of(account))
    }

    /// Staked amount of `account`
    pub fn stake_of(&self, account: &AccountId) -> u128 {
        self.stakes.get(account).copied().unwrap_or(0)
    }

    /// Sum of all stakes
    pub fn total_staked(&self) -> u128 {
        self.total_staked
    }

    /// Number of accounts with a non-zero stake
    pub fn staker_count(&self) -> usize {
        self.stakes.len()
    }

    /// Increase stake; returns the new stake
    pub fn stake(&mut self, account: AccountId, amount: u128) -> Result<u128> {
        validate_non_zero(amount)?;
        let stake = safe_add(self.stake_of(&account), amount)?;
        let total = safe_add(self.total_staked, amount)?;

        self.stakes.insert(account, stake);
        self.total_staked = total;
        Ok(stake)
    }

    /// Stake left after removing `amount`, without applying it
    pub fn stake_after_unstake(&self, account: &AccountId, amount: u128) -> Result<u128> {
        validate_non_zero(amount)?;
        let staked = self.stake_of(account);
        staked.checked_sub(amount).ok_or(Error::InsufficientStake {
            requested: amount,
            staked,
        })
    }

    /// Decrease stake; returns the new stake
    pub fn unstake(&mut self, account: AccountId, amount: u128) -> Result<u128> {
        let remaining = self.stake_after_unstake(&account, amount)?;
        if remaining == 0 {
            self.stakes.remove(&account);
        } else {
            self.stakes.insert(account, remaining);
        }
        self.total_staked -= amount;
        Ok(remaining)
    }
}
