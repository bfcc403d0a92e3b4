//! Reward-per-share accumulator.
//!
//! ```text
//! acc_per_share += reward * WAD / total_stake          (on every fee arrival)
//! earned(a)      = accrued(a) + stake(a) * (acc_per_share - snapshot(a)) / WAD
//! ```
//!
//! Every stake change must checkpoint the account with its stake from
//! *before* the change, so the new stake only earns from then on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::utils::constants::WAD;
use crate::utils::crypto::AccountId;
use crate::utils::math::{mul_div_ceil, mul_div_floor, safe_add, safe_sub, Wad};

/// Per-account accumulator snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardCheckpoint {
    /// Accumulator value at the last checkpoint
    pub snapshot: Wad,
    /// Rewards settled at the last checkpoint and not yet claimed
    pub accrued: u128,
}

/// Staker reward pool for one asset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardPool {
    acc_per_share: Wad,
    undistributed: u128,
    total_received: u128,
    total_claimed: u128,
    checkpoints: BTreeMap<AccountId, RewardCheckpoint>,
}

impl RewardPool {
    /// Empty pool
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to everyone staked, pro rata to `total_stake`.
    ///
    /// With nothing staked the amount waits as undistributed. The credited
    /// share is rounded up when subtracted, so stakers can never earn more
    /// than was received; rounding dust stays undistributed. Returns the
    /// amount still undistributed.
    pub fn distribute(&mut self, amount: u128, total_stake: u128) -> Result<u128> {
        let total_received = safe_add(self.total_received, amount)?;
        let pending = safe_add(self.undistributed, amount)?;

        if total_stake == 0 {
            self.total_received = total_received;
            self.undistributed = pending;
            return Ok(pending);
        }

        let delta = mul_div_floor(pending, WAD, total_stake)?;
        let distributed = mul_div_ceil(delta, total_stake, WAD)?;
        let acc_per_share = self.acc_per_share.checked_add(Wad::from_raw(delta))?;

        self.total_received = total_received;
        self.acc_per_share = acc_per_share;
        self.undistributed = pending - distributed;
        Ok(self.undistributed)
    }

    /// Claimable amount for `account` holding `stake`
    pub fn earned(&self, account: &AccountId, stake: u128) -> Result<u128> {
        let checkpoint = self.checkpoints.get(account).copied().unwrap_or_default();
        let growth = self.acc_per_share.saturating_sub(checkpoint.snapshot);
        let fresh = mul_div_floor(stake, growth.raw(), WAD)?;
        safe_add(checkpoint.accrued, fresh)
    }

    /// Settle `account`'s rewards at its current `stake`
    pub fn checkpoint(&mut self, account: AccountId, stake: u128) -> Result<()> {
        let checkpoint = self.settled(&account, stake)?;
        self.set_checkpoint(account, checkpoint);
        Ok(())
    }

    /// The checkpoint `account` would get at `stake`, without storing it
    pub fn settled(&self, account: &AccountId, stake: u128) -> Result<RewardCheckpoint> {
        Ok(RewardCheckpoint {
            snapshot: self.acc_per_share,
            accrued: self.earned(account, stake)?,
        })
    }

    /// Store a checkpoint from [`settled`](Self::settled); valid until the
    /// next distribution
    pub fn set_checkpoint(&mut self, account: AccountId, checkpoint: RewardCheckpoint) {
        self.checkpoints.insert(account, checkpoint);
    }

    /// Settle and zero `account`'s rewards; returns the amount to pay
    pub fn claim(&mut self, account: AccountId, stake: u128) -> Result<u128> {
        let amount = self.earned(&account, stake)?;
        let total_claimed = safe_add(self.total_claimed, amount)?;
        self.checkpoints.insert(
            account,
            RewardCheckpoint {
                snapshot: self.acc_per_share,
                accrued: 0,
            },
        );
        self.total_claimed = total_claimed;
        Ok(amount)
    }

    /// Current accumulator value
    pub fn acc_per_share(&self) -> Wad {
        self.acc_per_share
    }

    /// Rewards waiting for stakers
    pub fn undistributed(&self) -> u128 {
        self.undistributed
    }

    /// Rewards ever credited to the pool
    pub fn total_received(&self) -> u128 {
        self.total_received
    }

    /// Rewards ever paid out
    pub fn total_claimed(&self) -> u128 {
        self.total_claimed
    }

    /// Upper bound on what all stakers can still claim
    pub fn outstanding(&self) -> Result<u128> {
        safe_sub(self.total_received, self.total_claimed)
    }
}
