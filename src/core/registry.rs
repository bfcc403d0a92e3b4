//! Collateral registry.
//!
//! Holds every asset the protocol knows about (with its decimal scale) and
//! the base collateral factor of the subset accepted as collateral. An asset
//! without a [`CollateralConfig`] is unsupported as collateral.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::asset::{AssetId, AssetInfo};
use crate::error::{Error, Result};
use crate::utils::math::{pow10, Wad};
use crate::utils::validation::{validate_collateral_factor, validate_decimals};

/// Base collateral factor of a supported collateral asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralConfig {
    /// Collateral asset
    pub asset: AssetId,
    /// Fraction of value counted toward borrowing power, in (0, 1]
    pub base_factor: Wad,
}

/// Registry of assets and collateral configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollateralRegistry {
    assets: BTreeMap<AssetId, AssetInfo>,
    collateral: BTreeMap<AssetId, CollateralConfig>,
}

impl CollateralRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an asset's decimal scale.
    ///
    /// Re-registering with the same scale is a no-op; the scale of a
    /// registered asset can never change.
    pub fn register_asset(&mut self, asset: AssetId, decimals: u8) -> Result<()> {
        validate_decimals(decimals)?;

        if let Some(existing) = self.assets.get(&asset) {
            if existing.decimals != decimals {
                return Err(Error::InvalidParameter {
                    name: "decimals".into(),
                    reason: format!(
                        "{} already registered with {} decimals",
                        asset, existing.decimals
                    ),
                });
            }
            return Ok(());
        }

        self.assets.insert(asset.clone(), AssetInfo { id: asset, decimals });
        Ok(())
    }

    /// Set or replace the base collateral factor of a registered asset
    pub fn set_collateral_factor(&mut self, asset: &AssetId, base_factor: Wad) -> Result<()> {
        if !self.assets.contains_key(asset) {
            return Err(Error::UnsupportedAsset(asset.to_string()));
        }
        validate_collateral_factor("base_factor", base_factor)?;

        self.collateral.insert(
            asset.clone(),
            CollateralConfig {
                asset: asset.clone(),
                base_factor,
            },
        );
        Ok(())
    }

    /// Stop accepting an asset as collateral; returns the removed config
    pub fn remove_collateral(&mut self, asset: &AssetId) -> Result<CollateralConfig> {
        self.collateral
            .remove(asset)
            .ok_or_else(|| Error::UnsupportedAsset(asset.to_string()))
    }

    /// Collateral configuration, or `UnsupportedAsset`
    pub fn collateral_config(&self, asset: &AssetId) -> Result<&CollateralConfig> {
        self.collateral
            .get(asset)
            .ok_or_else(|| Error::UnsupportedAsset(asset.to_string()))
    }

    /// Whether the asset is accepted as collateral
    pub fn is_supported_collateral(&self, asset: &AssetId) -> bool {
        self.collateral.contains_key(asset)
    }

    /// Decimal scale of a registered asset
    pub fn decimals(&self, asset: &AssetId) -> Result<u8> {
        self.assets
            .get(asset)
            .map(|info| info.decimals)
            .ok_or_else(|| Error::UnsupportedAsset(asset.to_string()))
    }

    /// 10^decimals of a registered asset
    pub fn unit(&self, asset: &AssetId) -> Result<u128> {
        pow10(self.decimals(asset)?)
    }

    /// Whether the asset is registered at all
    pub fn is_registered(&self, asset: &AssetId) -> bool {
        self.assets.contains_key(asset)
    }

    /// All collateral configurations
    pub fn collateral_assets(&self) -> impl Iterator<Item = &CollateralConfig> {
        self.collateral.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wbtc() -> AssetId {
        AssetId::new("wBTC").unwrap()
    }

    #[test]
    fn test_register_and_configure() {
        let mut registry = CollateralRegistry::new();
        registry.register_asset(wbtc(), 8).unwrap();
        assert!(!registry.is_supported_collateral(&wbtc()));

        registry.set_collateral_factor(&wbtc(), Wad::from_bps(7_500)).unwrap();
        let config = registry.collateral_config(&wbtc()).unwrap();
        assert_eq!(config.base_factor, Wad::from_bps(7_500));
        assert_eq!(registry.unit(&wbtc()).unwrap(), 100_000_000);
    }

    #[test]
    fn test_decimals_are_immutable() {
        let mut registry = CollateralRegistry::new();
        registry.register_asset(wbtc(), 8).unwrap();
        assert!(registry.register_asset(wbtc(), 8).is_ok());
        assert!(registry.register_asset(wbtc(), 18).is_err());
        assert_eq!(registry.decimals(&wbtc()).unwrap(), 8);
    }

    #[test]
    fn test_unsupported_asset() {
        let mut registry = CollateralRegistry::new();
        assert!(matches!(
            registry.set_collateral_factor(&wbtc(), Wad::from_bps(7_500)),
            Err(Error::UnsupportedAsset(_))
        ));
        assert!(matches!(
            registry.collateral_config(&wbtc()),
            Err(Error::UnsupportedAsset(_))
        ));

        registry.register_asset(wbtc(), 8).unwrap();
        registry.set_collateral_factor(&wbtc(), Wad::from_bps(7_500)).unwrap();
        registry.remove_collateral(&wbtc()).unwrap();
        assert!(!registry.is_supported_collateral(&wbtc()));
        assert!(registry.is_registered(&wbtc()));
    }

    #[test]
    fn test_factor_bounds() {
        let mut registry = CollateralRegistry::new();
        registry.register_asset(wbtc(), 8).unwrap();
        assert!(registry.set_collateral_factor(&wbtc(), Wad::ZERO).is_err());
        assert!(registry
            .set_collateral_factor(&wbtc(), Wad::from_bps(12_000))
            .is_err());
    }
}
