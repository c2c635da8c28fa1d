//! Service configuration
//!
//! Loaded from an optional TOML file; command-line flags and environment
//! variables override individual fields afterwards. Without an `rpc_url`
//! the service runs against the in-memory devnet.

use crate::builder::BuilderConfig;
use crate::core::{to_base_units, Address, Wei, TRANSFER_GAS_LIMIT};
use crate::ledger::{ReceiptPolicy, RetryPolicy, DEVNET_CHAIN_ID};
use crate::wallet::Account;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the multisig deployer's private key
pub const DEPLOYER_KEY_ENV: &str = "MULTISIG_DEPLOYER_KEY";

/// Configuration errors. Key material is never included.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
    #[error("MULTISIG_DEPLOYER_KEY does not hold a valid private key")]
    DeployerKey,
}

/// A pre-funded devnet account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DevnetAccount {
    pub address: Address,
    /// Display units, e.g. "100"
    pub balance: String,
}

/// Settings for the in-memory devnet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DevnetConfig {
    pub chain_id: u64,
    /// Minimum fee price in base units
    pub min_fee_price: Wei,
    pub accounts: Vec<DevnetAccount>,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            chain_id: DEVNET_CHAIN_ID,
            min_fee_price: Wei::from(1u64),
            accounts: Vec::new(),
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// JSON-RPC endpoint; `None` selects the devnet
    pub rpc_url: Option<String>,
    pub listen_port: u16,
    pub request_timeout_secs: u64,
    pub transfer_gas_limit: u64,
    pub retry: RetryPolicy,
    pub receipts: ReceiptPolicy,
    /// Hex file with the compiled wallet contract
    pub multisig_bytecode: Option<PathBuf>,
    pub devnet: DevnetConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: None,
            listen_port: 8080,
            request_timeout_secs: 30,
            transfer_gas_limit: TRANSFER_GAS_LIMIT,
            retry: RetryPolicy::default(),
            receipts: ReceiptPolicy::default(),
            multisig_bytecode: None,
            devnet: DevnetConfig::default(),
        }
    }
}

impl Config {
    /// Load from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(url) = &self.rpc_url {
            url::Url::parse(url)
                .map_err(|e| ConfigError::Invalid(format!("rpc_url '{}': {}", url, e)))?;
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.transfer_gas_limit < TRANSFER_GAS_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "transfer_gas_limit must be at least {}",
                TRANSFER_GAS_LIMIT
            )));
        }
        for account in &self.devnet.accounts {
            to_base_units(&account.balance).map_err(|e| {
                ConfigError::Invalid(format!("devnet balance for {}: {}", account.address, e))
            })?;
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn builder_config(&self) -> BuilderConfig {
        BuilderConfig {
            transfer_gas_limit: self.transfer_gas_limit,
            retry: self.retry.clone(),
        }
    }

    /// Devnet balances in base units
    pub fn devnet_balances(&self) -> Result<Vec<(Address, Wei)>, ConfigError> {
        self.devnet
            .accounts
            .iter()
            .map(|a| {
                to_base_units(&a.balance)
                    .map(|wei| (a.address, wei))
                    .map_err(|e| ConfigError::Invalid(e.to_string()))
            })
            .collect()
    }

    /// Read the compiled contract, if a path is configured
    pub fn load_bytecode(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        let Some(path) = &self.multisig_bytecode else {
            return Ok(None);
        };
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let body = text.trim();
        let body = body.strip_prefix("0x").unwrap_or(body);
        let bytes = hex::decode(body).map_err(|e| {
            ConfigError::Invalid(format!("bytecode in {}: {}", path.display(), e))
        })?;
        if bytes.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "bytecode in {} is empty",
                path.display()
            )));
        }
        Ok(Some(bytes))
    }
}

/// The deployer account from the environment, if set
pub fn deployer_from_env() -> Result<Option<Account>, ConfigError> {
    match std::env::var(DEPLOYER_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Account::from_private_key(&key)
            .map(|a| Some(a.with_label("deployer")))
            .map_err(|_| ConfigError::DeployerKey),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.listen_port, 8080);
        assert!(config.rpc_url.is_none());
        assert_eq!(config.transfer_gas_limit, 21_000);
        assert_eq!(config.devnet.chain_id, DEVNET_CHAIN_ID);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
rpc_url = "https://sepolia.example.org/v3/abc"
listen_port = 9000

[retry]
max_attempts = 5

[devnet]
chain_id = 31337

[[devnet.accounts]]
address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"
balance = "100.5"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.retry.max_attempts, 5);
        // Unset fields keep their defaults
        assert_eq!(config.retry.base_delay_ms, RetryPolicy::default().base_delay_ms);
        assert_eq!(config.devnet.chain_id, 31337);

        let balances = config.devnet_balances().unwrap();
        assert_eq!(balances[0].1, to_base_units("100.5").unwrap());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            Config::from_toml_str("rpc_url = \"not a url\"").unwrap().validate(),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml_str("request_timeout_secs = 0").unwrap().validate(),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            Config::from_toml_str("listen_port = \"eighty\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/multisig.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_bytecode_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "0x6080604052").unwrap();
        let config = Config {
            multisig_bytecode: Some(file.path().to_path_buf()),
            ..Config::default()
        };
        assert_eq!(
            config.load_bytecode().unwrap(),
            Some(vec![0x60, 0x80, 0x60, 0x40, 0x52])
        );
        assert_eq!(Config::default().load_bytecode().unwrap(), None);
    }
}
