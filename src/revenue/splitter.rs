//! Revenue Splitter.
//!
//! Incoming fees are split once, floor-rounded: `disbursement_bps` of every
//! collection goes to the disbursement pool, the rest to the staker reward
//! pool of that asset. The disbursement pool pays only allow-listed
//! recipients; the reward pool pays stakers through [`RewardPool`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::core::access::{AccessControl, AllowList};
use crate::core::asset::AssetId;
use crate::error::{Error, Result};
use crate::protocol::context::OperationContext;
use crate::protocol::events::*;
use crate::revenue::rewards::{RewardCheckpoint, RewardPool};
use crate::utils::constants::{BPS_DIVISOR, DISBURSEMENT_POOL_LABEL, REWARD_POOL_LABEL};
use crate::utils::crypto::AccountId;
use crate::utils::math::{apply_bps, safe_add};
use crate::utils::validation::{validate_bps, validate_non_zero};

/// Result of one fee collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    /// Routed to the disbursement pool
    pub disbursement: u128,
    /// Routed to the staker reward pool
    pub rewards: u128,
}

/// Per-pool checkpoints of one account, computed but not yet stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCheckpoint {
    account: AccountId,
    stake_before: u128,
    entries: Vec<(AssetId, RewardCheckpoint)>,
}

/// Fee revenue splitter and staker reward distributor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueSplitter {
    access: AccessControl,
    disbursement_bps: u64,
    disbursement_pool: AccountId,
    reward_pool: AccountId,
    recipients: AllowList,
    pools: BTreeMap<AssetId, RewardPool>,
    disbursed: BTreeMap<AssetId, u128>,
}

impl RevenueSplitter {
    /// Create a splitter with the given disbursement share
    pub fn new(admin: AccountId, disbursement_bps: u64) -> Result<Self> {
        validate_bps("disbursement_bps", disbursement_bps, BPS_DIVISOR as u64)?;
        Ok(Self {
            access: AccessControl::new(admin),
            disbursement_bps,
            disbursement_pool: AccountId::from_label(DISBURSEMENT_POOL_LABEL),
            reward_pool: AccountId::from_label(REWARD_POOL_LABEL),
            recipients: AllowList::new(),
            pools: BTreeMap::new(),
            disbursed: BTreeMap::new(),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ADMIN
    // ═══════════════════════════════════════════════════════════════════════════

    /// Open a reward pool for `asset`; returns false if it already exists
    pub fn add_reward_asset(&mut self, caller: &AccountId, asset: AssetId) -> Result<bool> {
        self.access.ensure_admin(caller, "add_reward_asset")?;
        if self.pools.contains_key(&asset) {
            return Ok(false);
        }
        info!(%asset, "reward asset added");
        self.pools.insert(asset, RewardPool::new());
        Ok(true)
    }

    /// Add or remove a disbursement recipient; returns whether anything changed
    pub fn set_recipient(&mut self, caller: &AccountId, recipient: AccountId, allowed: bool) -> Result<bool> {
        self.access.ensure_admin(caller, "set_recipient")?;
        let changed = self.recipients.set(recipient, allowed);
        if changed {
            info!(recipient = %recipient.short(), allowed, "disbursement recipient updated");
        }
        Ok(changed)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // FEES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Split `amount` of `asset` pulled from `payer`
    pub fn collect_fees(
        &mut self,
        ctx: &mut OperationContext<'_>,
        payer: AccountId,
        asset: AssetId,
        amount: u128,
        total_stake: u128,
    ) -> Result<FeeSplit> {
        validate_non_zero(amount)?;
        let mut pool = self
            .pools
            .get(&asset)
            .cloned()
            .ok_or_else(|| Error::UnsupportedAsset(asset.to_string()))?;

        let disbursement = apply_bps(amount, self.disbursement_bps)?;
        let rewards = amount - disbursement;
        let undistributed = pool.distribute(rewards, total_stake)?;

        ctx.settlement()
            .transfer_in(&asset, &payer, &self.disbursement_pool, disbursement)?;
        ctx.settlement().transfer_in(&asset, &payer, &self.reward_pool, rewards)?;
        self.pools.insert(asset.clone(), pool);

        info!(%asset, amount, disbursement, rewards, undistributed, "fees collected");
        ctx.emit(ProtocolEvent::FeesCollected(FeesCollectedEvent {
            asset,
            payer,
            amount,
            disbursement_share: disbursement,
            reward_share: rewards,
            undistributed,
            block_height: ctx.block_height(),
            timestamp: ctx.timestamp(),
        }));
        Ok(FeeSplit { disbursement, rewards })
    }

    /// Pay `amount` from the disbursement pool to an allow-listed recipient
    pub fn disburse(
        &mut self,
        ctx: &mut OperationContext<'_>,
        caller: &AccountId,
        asset: AssetId,
        recipient: AccountId,
        amount: u128,
    ) -> Result<()> {
        if !self.recipients.contains(&recipient) {
            return Err(Error::RecipientNotWhitelisted(recipient.to_hex()));
        }
        self.access.ensure_admin(caller, "disburse")?;
        validate_non_zero(amount)?;

        let total = safe_add(self.disbursed_of(&asset), amount)?;
        ctx.settlement()
            .transfer_out(&asset, &self.disbursement_pool, &recipient, amount)?;
        self.disbursed.insert(asset.clone(), total);

        info!(%asset, recipient = %recipient.short(), amount, "fees disbursed");
        ctx.emit(ProtocolEvent::FeesDisbursed(FeesDisbursedEvent {
            asset,
            recipient,
            amount,
            block_height: ctx.block_height(),
            timestamp: ctx.timestamp(),
        }));
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REWARDS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Settle `account` in every pool at its stake from before a change
    pub fn checkpoint(&mut self, account: AccountId, stake_before: u128) -> Result<()> {
        let pending = self.prepare_checkpoint(account, stake_before)?;
        self.apply_checkpoint(pending);
        Ok(())
    }

    /// Compute `account`'s checkpoint in every pool without storing it.
    ///
    /// Nothing is touched, so a stake change can fail after this without
    /// leaving pools half-settled.
    pub fn prepare_checkpoint(&self, account: AccountId, stake_before: u128) -> Result<PendingCheckpoint> {
        let entries = self
            .pools
            .iter()
            .map(|(asset, pool)| Ok((asset.clone(), pool.settled(&account, stake_before)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(PendingCheckpoint {
            account,
            stake_before,
            entries,
        })
    }

    /// Store a checkpoint from [`prepare_checkpoint`](Self::prepare_checkpoint)
    pub fn apply_checkpoint(&mut self, pending: PendingCheckpoint) {
        for (asset, checkpoint) in pending.entries {
            if let Some(pool) = self.pools.get_mut(&asset) {
                pool.set_checkpoint(pending.account, checkpoint);
            }
        }
        debug!(account = %pending.account.short(), stake_before = pending.stake_before, "reward checkpoint");
    }

    /// Pay `account` its accrued rewards in `asset`; returns the amount paid
    pub fn claim_reward(
        &mut self,
        ctx: &mut OperationContext<'_>,
        account: AccountId,
        asset: AssetId,
        stake: u128,
    ) -> Result<u128> {
        let pool = self
            .pools
            .get_mut(&asset)
            .ok_or_else(|| Error::UnsupportedAsset(asset.to_string()))?;

        let amount = pool.earned(&account, stake)?;
        if amount == 0 {
            pool.checkpoint(account, stake)?;
            return Ok(0);
        }

        ctx.settlement()
            .transfer_out(&asset, &self.reward_pool, &account, amount)?;
        pool.claim(account, stake)?;

        info!(account = %account.short(), %asset, amount, "reward claimed");
        ctx.emit(ProtocolEvent::RewardClaimed(RewardClaimedEvent {
            account,
            asset,
            amount,
            block_height: ctx.block_height(),
            timestamp: ctx.timestamp(),
        }));
        Ok(amount)
    }

    /// Claimable rewards of `account` in `asset`
    pub fn calculate_reward(&self, account: &AccountId, asset: &AssetId, stake: u128) -> Result<u128> {
        self.pools
            .get(asset)
            .ok_or_else(|| Error::UnsupportedAsset(asset.to_string()))?
            .earned(account, stake)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Reward pool for `asset`
    pub fn pool(&self, asset: &AssetId) -> Option<&RewardPool> {
        self.pools.get(asset)
    }

    /// Registered reward assets
    pub fn reward_assets(&self) -> impl Iterator<Item = &AssetId> {
        self.pools.keys()
    }

    /// Amount paid out of the disbursement pool in `asset`
    pub fn disbursed_of(&self, asset: &AssetId) -> u128 {
        self.disbursed.get(asset).copied().unwrap_or(0)
    }

    /// Whether `account` may receive disbursements
    pub fn is_recipient(&self, account: &AccountId) -> bool {
        self.recipients.contains(account)
    }

    /// Disbursement share in basis points
    pub fn disbursement_bps(&self) -> u64 {
        self.disbursement_bps
    }

    /// Account holding the disbursement share
    pub fn disbursement_pool(&self) -> AccountId {
        self.disbursement_pool
    }

    /// Account holding staker rewards
    pub fn reward_pool(&self) -> AccountId {
        self.reward_pool
    }
}
