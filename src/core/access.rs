//! Access control and engine wiring.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::utils::crypto::AccountId;

// ═══════════════════════════════════════════════════════════════════════════════
// ADMIN
// ═══════════════════════════════════════════════════════════════════════════════

/// Single admin capability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    admin: AccountId,
}

impl AccessControl {
    /// Grant admin rights to `admin`
    pub fn new(admin: AccountId) -> Self {
        Self { admin }
    }

    /// Current admin
    pub fn admin(&self) -> AccountId {
        self.admin
    }

    /// Whether `caller` is the admin
    pub fn is_admin(&self, caller: &AccountId) -> bool {
        self.admin == *caller
    }

    /// Fail with `NotAuthorized` unless `caller` is the admin
    pub fn ensure_admin(&self, caller: &AccountId, action: &str) -> Result<()> {
        if !self.is_admin(caller) {
            return Err(Error::NotAuthorized(format!(
                "{} requires admin, caller {}",
                action,
                caller.short()
            )));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ALLOW LIST
// ═══════════════════════════════════════════════════════════════════════════════

/// Explicit allow-list of accounts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowList {
    members: BTreeSet<AccountId>,
}

impl AllowList {
    /// Empty allow-list
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (`true`) or remove (`false`) an account; returns whether anything changed
    pub fn set(&mut self, account: AccountId, allowed: bool) -> bool {
        if allowed {
            self.members.insert(account)
        } else {
            self.members.remove(&account)
        }
    }

    /// Membership check
    pub fn contains(&self, account: &AccountId) -> bool {
        self.members.contains(account)
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WIRING
// ═══════════════════════════════════════════════════════════════════════════════

/// Identities of the engines allowed to call privileged lending hooks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineWiring {
    /// Yield router identity
    pub yield_router: AccountId,
    /// Liquidation engine identity
    pub liquidation_engine: AccountId,
}

/// Two-phase construction gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Wiring {
    /// Constructed; only admin setup is permitted
    #[default]
    Unconfigured,
    /// Wired; user operations are permitted
    Configured(EngineWiring),
}

impl Wiring {
    /// Move to `Configured`; only once
    pub fn configure(&mut self, wiring: EngineWiring) -> Result<()> {
        if let Wiring::Configured(_) = self {
            return Err(Error::AlreadyConfigured);
        }
        *self = Wiring::Configured(wiring);
        Ok(())
    }

    /// Wired identities, or `NotConfigured`
    pub fn ensure_configured(&self) -> Result<EngineWiring> {
        match self {
            Wiring::Configured(wiring) => Ok(*wiring),
            Wiring::Unconfigured => Err(Error::NotConfigured),
        }
    }

    /// Whether configure has been called
    pub fn is_configured(&self) -> bool {
        matches!(self, Wiring::Configured(_))
    }
}
