use serde::Deserialize;
use thiserror::Error;

use crate::rates::RateFallback;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_ledger")]
    pub ledger: LedgerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LedgerConfig {
    /// Currency every `*_base` amount is denominated in.
    #[serde(default = "default_base_currency")]
    pub base_currency: String,

    /// What `resolve_rate` does when no rate exists on or before the date.
    #[serde(default)]
    pub rate_fallback: RateFallback,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackendKind,

    #[serde(default = "default_sqlite_path")]
    pub sqlite_path: String,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackendKind {
    #[default]
    Memory,
    Sqlite,
}

fn default_ledger() -> LedgerConfig {
    LedgerConfig {
        base_currency: default_base_currency(),
        rate_fallback: RateFallback::default(),
    }
}

fn default_storage() -> StorageConfig {
    StorageConfig {
        backend: StorageBackendKind::default(),
        sqlite_path: default_sqlite_path(),
    }
}

fn default_base_currency() -> String {
    "USD".to_string()
}

fn default_sqlite_path() -> String {
    "settlebook.db".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Config {
            ledger: default_ledger(),
            storage: default_storage(),
        }
    }
}

impl Config {
    pub fn from_path(path: &str) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }
}
