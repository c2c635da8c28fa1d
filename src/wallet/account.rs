//! Accounts
//!
//! An account is an address, optionally paired with the key that
//! controls it. Watch-only accounts can be queried but never sign.

use crate::core::Address;
use crate::crypto::{KeyError, KeyPair};
use crate::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Account-related errors
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("Invalid private key: {0}")]
    InvalidKey(#[from] KeyError),
    #[error("Account {0} has no signing key")]
    MissingSigningKey(Address),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

/// An address with an optional signing key
#[derive(Clone)]
pub struct Account {
    address: Address,
    key_pair: Option<KeyPair>,
    /// Optional label for display
    pub label: Option<String>,
}

impl Account {
    /// Create an account with a fresh key pair
    pub fn generate() -> Self {
        Self::from_key_pair(KeyPair::generate())
    }

    pub fn from_key_pair(key_pair: KeyPair) -> Self {
        Self {
            address: key_pair.address(),
            key_pair: Some(key_pair),
            label: None,
        }
    }

    /// Import from a hex private key (with or without `0x`)
    pub fn from_private_key(private_key_hex: &str) -> Result<Self, WalletError> {
        Ok(Self::from_key_pair(KeyPair::from_private_key_hex(private_key_hex)?))
    }

    /// An account that can be observed but not used to sign
    pub fn watch_only(address: Address) -> Self {
        Self {
            address,
            key_pair: None,
            label: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn can_sign(&self) -> bool {
        self.key_pair.is_some()
    }

    /// Signing key, or an error naming the account
    pub fn signer(&self) -> Result<&KeyPair, WalletError> {
        self.key_pair
            .as_ref()
            .ok_or(WalletError::MissingSigningKey(self.address))
    }

    /// Public information, safe to share
    pub fn info(&self) -> WalletInfo {
        WalletInfo {
            address: self.address,
            public_key: self.key_pair.as_ref().map(|k| k.public_key_hex()),
            label: self.label.clone(),
        }
    }

    /// Full key material for handing a freshly generated key to its owner.
    /// Returns `None` for watch-only accounts.
    pub fn export_key(&self) -> Option<WalletKey> {
        self.key_pair.as_ref().map(|k| WalletKey {
            address: self.address,
            public_key: k.public_key_hex(),
            private_key: k.private_key_hex(),
        })
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address)
            .field("can_sign", &self.can_sign())
            .field("label", &self.label)
            .finish()
    }
}

/// Public account information
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletInfo {
    pub address: Address,
    pub public_key: Option<String>,
    pub label: Option<String>,
}

/// Newly generated key material, returned once to its owner
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletKey {
    pub address: Address,
    pub public_key: String,
    pub private_key: String,
}

impl fmt::Debug for WalletKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletKey")
            .field("address", &self.address)
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .finish()
    }
}
