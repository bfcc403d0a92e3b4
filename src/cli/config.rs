//! CLI Configuration.
//!
//! The CLI reads a JSON file holding the protocol parameters plus a log
//! filter; a few `BOOSTLEND_*` environment variables override the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::config::ProtocolParams;

/// Overrides `max_price_age_secs`
pub const ENV_MAX_PRICE_AGE: &str = "BOOSTLEND_MAX_PRICE_AGE";
/// Overrides `liquidation_bonus_bps`
pub const ENV_LIQUIDATION_BONUS_BPS: &str = "BOOSTLEND_LIQUIDATION_BONUS_BPS";
/// Overrides the log filter
pub const ENV_LOG: &str = "BOOSTLEND_LOG";

// ═══════════════════════════════════════════════════════════════════════════════
// CLI CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// CLI Configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Parameters every simulated protocol starts from
    #[serde(default)]
    pub params: ProtocolParams,
    /// `tracing` filter directive, e.g. `info` or `boostlend=debug`
    #[serde(default = "default_log")]
    pub log: String,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            params: ProtocolParams::default(),
            log: default_log(),
        }
    }
}

impl CliConfig {
    /// Load from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save to file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
            }
        }

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))
    }

    /// Apply `BOOSTLEND_*` environment overrides
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(age) = lookup(ENV_MAX_PRICE_AGE) {
            self.params.max_price_age_secs = parse_var(ENV_MAX_PRICE_AGE, &age)?;
        }

        if let Some(bps) = lookup(ENV_LIQUIDATION_BONUS_BPS) {
            self.params.liquidation_bonus_bps = parse_var(ENV_LIQUIDATION_BONUS_BPS, &bps)?;
        }

        if let Some(log) = lookup(ENV_LOG) {
            self.log = log;
        }

        Ok(self)
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        default_data_dir().join("config.json")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log.trim().is_empty() {
            return Err(ConfigError::Validation("log filter cannot be empty".into()));
        }
        self.params
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIG ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(String),
    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),
    /// Environment variable holds an unusable value
    #[error("Invalid value for {name}: {value}")]
    InvalidVar {
        /// Variable name
        name: String,
        /// Rejected value
        value: String,
    },
    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPER FUNCTIONS
// ═══════════════════════════════════════════════════════════════════════════════

fn default_log() -> String {
    "info".into()
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidVar {
        name: name.into(),
        value: value.into(),
    })
}

/// Get default data directory
fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library/Application Support/boostlend");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("boostlend");
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".boostlend");
    }

    PathBuf::from(".boostlend")
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = CliConfig::default();
        assert_eq!(config.log, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = CliConfig::default();
        config.params.max_price_age_secs = 120;
        config.save(&path).unwrap();

        assert_eq!(CliConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "log": "debug" }"#).unwrap();

        let config = CliConfig::load(&path).unwrap();
        assert_eq!(config.log, "debug");
        assert_eq!(config.params, ProtocolParams::default());
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = CliConfig::load_or_default(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn test_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(CliConfig::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let config = CliConfig::default()
            .with_overrides(vars(&[
                (ENV_MAX_PRICE_AGE, "60"),
                (ENV_LIQUIDATION_BONUS_BPS, "750"),
                (ENV_LOG, "boostlend=debug"),
            ]))
            .unwrap();

        assert_eq!(config.params.max_price_age_secs, 60);
        assert_eq!(config.params.liquidation_bonus_bps, 750);
        assert_eq!(config.log, "boostlend=debug");
    }

    #[test]
    fn test_bad_env_value() {
        let err = CliConfig::default()
            .with_overrides(vars(&[(ENV_MAX_PRICE_AGE, "soon")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidVar { .. }));
    }

    #[test]
    fn test_validation_rejects_bad_params() {
        let mut config = CliConfig::default();
        config.params.max_price_age_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));

        let mut config = CliConfig::default();
        config.log = "  ".into();
        assert!(config.validate().is_err());
    }
}
