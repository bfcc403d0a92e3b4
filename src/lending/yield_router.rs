//! Yield Router.
//!
//! Relays collateral yield into debt repayment. Two entry points exist for
//! an authorised relay (the admin or an allow-listed keeper):
//!
//! - [`YieldRouter::harvest_and_apply`] claims whatever the position's
//!   collateral asset has earned from a [`YieldSource`] into the router
//!   account, then applies `min(claimed, debt)`.
//! - [`YieldRouter::route_yield_to_repayment`] applies `min(amount, debt)`
//!   from a balance already held by the router.
//!
//! Either way the lending engine pulls the applied part from the router into
//! custody; any surplus stays with the router for later routing.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::core::access::{AccessControl, AllowList};
use crate::core::asset::AssetId;
use crate::core::position::PositionId;
use crate::error::{Error, Result};
use crate::ledger::settlement::Settlement;
use crate::lending::engine::LendingEngine;
use crate::protocol::context::OperationContext;
use crate::protocol::events::{ProtocolEvent, YieldHarvestedEvent};
use crate::utils::constants::YIELD_ROUTER_LABEL;
use crate::utils::crypto::AccountId;
use crate::utils::math::safe_add;

// ═══════════════════════════════════════════════════════════════════════════════
// YIELD SOURCES
// ═══════════════════════════════════════════════════════════════════════════════

/// Yield earned by yield-bearing collateral, paid out in the debt asset
pub trait YieldSource {
    /// Move everything `collateral` has earned, in `payout`, to `to` through
    /// the operation's settlement; returns the amount claimed
    fn claim_yield(
        &self,
        settlement: &mut Settlement<'_>,
        collateral: &AssetId,
        payout: &AssetId,
        to: &AccountId,
    ) -> Result<u128>;
}

/// Per-asset vault accounts that accumulate harvested yield.
///
/// A claim sweeps the vault's whole payout balance, so the claim itself is a
/// journaled transfer and rolls back with the rest of the operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldVaults {
    access: AccessControl,
    vaults: BTreeMap<AssetId, AccountId>,
}

impl YieldVaults {
    /// Empty set administered by `admin`
    pub fn new(admin: AccountId) -> Self {
        Self {
            access: AccessControl::new(admin),
            vaults: BTreeMap::new(),
        }
    }

    /// Point `asset` at a vault account, or unset it with `None`; returns
    /// whether anything changed
    pub fn set_vault(&mut self, caller: &AccountId, asset: AssetId, vault: Option<AccountId>) -> Result<bool> {
        self.access.ensure_admin(caller, "set_yield_vault")?;
        let previous = match vault {
            Some(account) => self.vaults.insert(asset.clone(), account),
            None => self.vaults.remove(&asset),
        };
        let changed = previous != vault;
        if changed {
            info!(%asset, vault = ?vault.map(|v| v.short()), "yield vault updated");
        }
        Ok(changed)
    }

    /// Vault account of `asset`
    pub fn vault_of(&self, asset: &AssetId) -> Option<AccountId> {
        self.vaults.get(asset).copied()
    }
}

impl YieldSource for YieldVaults {
    fn claim_yield(
        &self,
        settlement: &mut Settlement<'_>,
        collateral: &AssetId,
        payout: &AssetId,
        to: &AccountId,
    ) -> Result<u128> {
        let vault = self
            .vault_of(collateral)
            .ok_or_else(|| Error::NoYieldSource(collateral.to_string()))?;
        let earned = settlement.balance_of(payout, &vault);
        settlement.transfer_out(payout, &vault, to, earned)?;
        Ok(earned)
    }
}

/// Outcome of one harvest
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestRecord {
    /// Yield claimed into the router
    pub claimed: u128,
    /// Part applied to the position's debt
    pub applied: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Relay of harvested yield into debt reduction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YieldRouter {
    account: AccountId,
    access: AccessControl,
    keepers: AllowList,
    applied: BTreeMap<PositionId, u128>,
    total_applied: u128,
}

impl YieldRouter {
    /// Create a router administered by `admin`
    pub fn new(admin: AccountId) -> Self {
        Self {
            account: AccountId::from_label(YIELD_ROUTER_LABEL),
            access: AccessControl::new(admin),
            keepers: AllowList::new(),
            applied: BTreeMap::new(),
            total_applied: 0,
        }
    }

    /// Router identity; also the account holding harvested yield
    pub fn account(&self) -> AccountId {
        self.account
    }

    /// Grant or revoke relay rights; returns whether anything changed
    pub fn set_keeper(&mut self, caller: &AccountId, keeper: AccountId, allowed: bool) -> Result<bool> {
        self.access.ensure_admin(caller, "set_keeper")?;
        let changed = self.keepers.set(keeper, allowed);
        if changed {
            info!(keeper = %keeper.short(), allowed, "keeper updated");
        }
        Ok(changed)
    }

    /// Whether `account` may relay yield
    pub fn is_authorized(&self, account: &AccountId) -> bool {
        self.access.is_admin(account) || self.keepers.contains(account)
    }

    fn ensure_relay(&self, caller: &AccountId) -> Result<()> {
        if self.is_authorized(caller) {
            Ok(())
        } else {
            Err(Error::NotAuthorized(format!("{} is not a yield relay", caller.short())))
        }
    }

    /// Apply `amount` of harvested yield to a position's debt; returns the
    /// amount actually applied
    pub fn route_yield_to_repayment(
        &mut self,
        lending: &mut LendingEngine,
        ctx: &mut OperationContext<'_>,
        caller: AccountId,
        id: PositionId,
        amount: u128,
    ) -> Result<u128> {
        self.ensure_relay(&caller)?;
        let applied = lending.apply_yield(ctx, &self.account, caller, id, amount)?;
        self.record_applied(id, applied)?;
        Ok(applied)
    }

    /// Claim the yield of the position's collateral asset from `source`
    /// and apply `min(claimed, debt)` to the position
    pub fn harvest_and_apply(
        &mut self,
        source: &dyn YieldSource,
        lending: &mut LendingEngine,
        ctx: &mut OperationContext<'_>,
        caller: AccountId,
        id: PositionId,
    ) -> Result<HarvestRecord> {
        self.ensure_relay(&caller)?;
        lending.wiring().ensure_configured()?;

        let position = lending.position(id)?;
        position.ensure_active()?;
        let asset = position.asset.clone();
        let has_debt = position.has_debt();
        let payout = lending.params().debt_asset.clone();

        let claimed = source.claim_yield(ctx.settlement(), &asset, &payout, &self.account)?;
        let applied = if claimed > 0 && has_debt {
            lending.apply_yield(ctx, &self.account, caller, id, claimed)?
        } else {
            0
        };
        self.record_applied(id, applied)?;

        info!(position = %id, %asset, claimed, applied, "yield harvested");
        ctx.emit(ProtocolEvent::YieldHarvested(YieldHarvestedEvent {
            position_id: id,
            keeper: caller,
            asset,
            claimed,
            applied,
            block_height: ctx.block_height(),
            timestamp: ctx.timestamp(),
        }));
        Ok(HarvestRecord { claimed, applied })
    }

    fn record_applied(&mut self, id: PositionId, applied: u128) -> Result<()> {
        if applied == 0 {
            return Ok(());
        }
        let position_total = safe_add(self.applied_to(id), applied)?;
        let total = safe_add(self.total_applied, applied)?;
        self.applied.insert(id, position_total);
        self.total_applied = total;
        Ok(())
    }

    /// Yield applied to one position so far
    pub fn applied_to(&self, id: PositionId) -> u128 {
        self.applied.get(&id).copied().unwrap_or(0)
    }

    /// Yield applied across all positions
    pub fn total_applied(&self) -> u128 {
        self.total_applied
    }

    /// Number of allow-listed keepers
    pub fn keeper_count(&self) -> usize {
        self.keepers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeper_management() {
        let admin = AccountId::from_label("admin");
        let keeper = AccountId::from_label("keeper");
        let mut router = YieldRouter::new(admin);

        assert!(router.is_authorized(&admin));
        assert!(!router.is_authorized(&keeper));

        assert!(matches!(
            router.set_keeper(&keeper, keeper, true),
            Err(Error::NotAuthorized(_))
        ));
        assert!(router.set_keeper(&admin, keeper, true).unwrap());
        assert!(!router.set_keeper(&admin, keeper, true).unwrap());
        assert!(router.is_authorized(&keeper));
        assert_eq!(router.keeper_count(), 1);
    }

    #[test]
    fn test_vault_claim_sweeps_balance() {
        use crate::ledger::{AssetLedger, InMemoryLedger};

        let admin = AccountId::from_label("admin");
        let vault = AccountId::from_label("vault");
        let router = AccountId::from_label("router");
        let wbtc = AssetId::new("wBTC").unwrap();
        let busd = AssetId::new("bUSD").unwrap();

        let mut vaults = YieldVaults::new(admin);
        assert!(matches!(
            vaults.set_vault(&vault, wbtc.clone(), Some(vault)),
            Err(Error::NotAuthorized(_))
        ));
        assert!(vaults.set_vault(&admin, wbtc.clone(), Some(vault)).unwrap());
        assert!(!vaults.set_vault(&admin, wbtc.clone(), Some(vault)).unwrap());

        let mut ledger = InMemoryLedger::new();
        ledger.mint(&busd, &vault, 700).unwrap();
        let mut settlement = Settlement::new(&mut ledger);
        assert_eq!(vaults.claim_yield(&mut settlement, &wbtc, &busd, &router).unwrap(), 700);
        assert_eq!(vaults.claim_yield(&mut settlement, &wbtc, &busd, &router).unwrap(), 0);
        assert!(matches!(
            vaults.claim_yield(&mut settlement, &busd, &busd, &router),
            Err(Error::NoYieldSource(_))
        ));
        settlement.rollback().unwrap();
        assert_eq!(ledger.balance_of(&busd, &vault), 700);
    }
}
