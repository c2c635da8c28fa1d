//! Multi-signature wallet description
//!
//! A wallet is a deployed contract address plus the owner set and
//! threshold it enforces. The local value is only ever built through
//! validation, so an invalid owner set never reaches the network.

use super::contract::ContractError;
use crate::core::{Address, AddressError, AmountError};
use crate::error::ErrorKind;
use crate::wallet::WalletError;
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

/// Errors related to multisig operations
#[derive(Error, Debug)]
pub enum MultisigError {
    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
    #[error("A multisig wallet needs at least one owner")]
    NoOwners,
    #[error("Duplicate owner {0}")]
    DuplicateOwner(Address),
    #[error("The zero address cannot be an owner")]
    ZeroOwner,
    #[error("{0} is not an owner of this wallet")]
    NotAnOwner(Address),
    #[error("Transaction {index} already confirmed by {owner}")]
    AlreadyConfirmed { index: u64, owner: Address },
    #[error("Transaction {0} has already been executed")]
    AlreadyExecuted(u64),
    #[error("Transaction {index} has {have} of {need} required confirmations")]
    QuorumNotReached { index: u64, have: u64, need: u64 },
    #[error("Transaction {0} does not exist")]
    TransactionNotFound(u64),
    #[error("Deployment failed: {0}")]
    DeploymentFailed(String),
    #[error("Invalid amount: {0}")]
    Amount(#[from] AmountError),
    #[error("Invalid address: {0}")]
    Address(#[from] AddressError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl MultisigError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MultisigError::InvalidThreshold(_)
            | MultisigError::NoOwners
            | MultisigError::DuplicateOwner(_)
            | MultisigError::ZeroOwner => ErrorKind::Validation,
            MultisigError::NotAnOwner(_) => ErrorKind::Authorization,
            MultisigError::AlreadyConfirmed { .. }
            | MultisigError::AlreadyExecuted(_)
            | MultisigError::QuorumNotReached { .. }
            | MultisigError::TransactionNotFound(_)
            | MultisigError::DeploymentFailed(_) => ErrorKind::Chain,
            MultisigError::Amount(e) => e.kind(),
            MultisigError::Address(e) => e.kind(),
            MultisigError::Wallet(e) => e.kind(),
            MultisigError::Contract(e) => e.kind(),
        }
    }
}

/// Owner set and threshold (M-of-N)
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct MultisigConfig {
    owners: Vec<Address>,
    threshold: u64,
}

impl MultisigConfig {
    /// Validate and build a configuration
    ///
    /// # Errors
    /// `NoOwners`, `ZeroOwner`, `DuplicateOwner` or `InvalidThreshold`
    pub fn new(owners: Vec<Address>, threshold: u64) -> Result<Self, MultisigError> {
        if owners.is_empty() {
            return Err(MultisigError::NoOwners);
        }

        let mut seen = HashSet::with_capacity(owners.len());
        for owner in &owners {
            if *owner == Address::ZERO {
                return Err(MultisigError::ZeroOwner);
            }
            if !seen.insert(*owner) {
                return Err(MultisigError::DuplicateOwner(*owner));
            }
        }

        if threshold == 0 {
            return Err(MultisigError::InvalidThreshold(
                "threshold must be at least 1".to_string(),
            ));
        }
        if threshold > owners.len() as u64 {
            return Err(MultisigError::InvalidThreshold(format!(
                "threshold {} exceeds owner count {}",
                threshold,
                owners.len()
            )));
        }

        Ok(Self { owners, threshold })
    }

    pub fn owners(&self) -> &[Address] {
        &self.owners
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn is_owner(&self, address: &Address) -> bool {
        self.owners.contains(address)
    }

    /// e.g. "2-of-3"
    pub fn description(&self) -> String {
        format!("{}-of-{}", self.threshold, self.owners.len())
    }
}

/// A deployed multi-signature wallet
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct MultisigWallet {
    /// Contract address
    pub address: Address,
    #[serde(flatten)]
    config: MultisigConfig,
}

impl MultisigWallet {
    pub fn new(address: Address, config: MultisigConfig) -> Self {
        Self { address, config }
    }

    pub fn config(&self) -> &MultisigConfig {
        &self.config
    }

    pub fn owners(&self) -> &[Address] {
        self.config.owners()
    }

    pub fn threshold(&self) -> u64 {
        self.config.threshold()
    }

    pub fn is_owner(&self, address: &Address) -> bool {
        self.config.is_owner(address)
    }

    /// `NotAnOwner` unless `address` is in the owner set
    pub fn ensure_owner(&self, address: &Address) -> Result<(), MultisigError> {
        if self.is_owner(address) {
            Ok(())
        } else {
            Err(MultisigError::NotAnOwner(*address))
        }
    }

    pub fn description(&self) -> String {
        self.config.description()
    }
}
