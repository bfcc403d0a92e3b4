//! Asset identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;
use crate::utils::validation::validate_symbol;

/// Short asset symbol, e.g. `wBTC`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    /// Create a validated asset id
    pub fn new(symbol: &str) -> Result<Self> {
        validate_symbol(symbol)?;
        Ok(Self(symbol.to_string()))
    }

    /// Known-good symbol used for built-in defaults
    pub(crate) fn from_static(symbol: &'static str) -> Self {
        Self(symbol.to_string())
    }

    /// Symbol as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for AssetId {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Registered asset with its fixed decimal scale
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    /// Asset symbol
    pub id: AssetId,
    /// Decimal places of the smallest unit
    pub decimals: u8,
}
