//! Multisig contract capability
//!
//! The coordinator only sees these traits. The RPC adapter drives a
//! deployed contract through a ledger; the in-memory host keeps the same
//! rules in process for the devnet and tests.

use crate::builder::SendError;
use crate::core::{Address, TxHash, Wei};
use crate::error::ErrorKind;
use crate::ledger::{LedgerError, Retryable};
use crate::wallet::Account;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Failures talking to a multisig contract
#[derive(Error, Debug)]
pub enum ContractError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error("Malformed contract data: {0}")]
    Abi(String),
    #[error("Transaction {0} was broadcast but no receipt arrived in time")]
    ReceiptTimeout(TxHash),
    #[error("Transaction {0} was included but failed")]
    ExecutionFailed(TxHash),
}

impl ContractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContractError::Ledger(e) => e.kind(),
            ContractError::Send(e) => e.kind(),
            ContractError::Abi(_) | ContractError::ReceiptTimeout(_) => ErrorKind::Network,
            ContractError::ExecutionFailed(_) => ErrorKind::Chain,
        }
    }
}

impl Retryable for ContractError {
    fn is_retryable(&self) -> bool {
        matches!(self, ContractError::Ledger(e) if e.is_retryable())
    }
}

/// A proposal as stored by the contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRecord {
    pub to: Address,
    pub value: Wei,
    pub data: Vec<u8>,
    pub executed: bool,
    pub confirmations: u64,
}

/// Events emitted by the contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractEvent {
    Deposit {
        sender: Address,
        amount: Wei,
    },
    SubmitTransaction {
        index: u64,
        to: Address,
        value: Wei,
        data: Vec<u8>,
    },
    ConfirmTransaction {
        owner: Address,
        index: u64,
    },
    ExecuteTransaction {
        index: u64,
    },
}

/// Operations on one deployed multisig contract.
///
/// Writes are signed by `caller`; reads are side-effect free and safe to retry.
#[async_trait]
pub trait MultisigContract: Send + Sync {
    fn address(&self) -> Address;

    /// Propose a call; returns the index the contract assigned
    async fn submit_transaction(
        &self,
        caller: &Account,
        to: Address,
        value: &Wei,
        data: &[u8],
    ) -> Result<u64, ContractError>;

    async fn confirm_transaction(&self, caller: &Account, index: u64) -> Result<TxHash, ContractError>;

    async fn execute_transaction(&self, caller: &Account, index: u64) -> Result<TxHash, ContractError>;

    async fn get_transaction(&self, index: u64) -> Result<ProposalRecord, ContractError>;

    async fn transaction_count(&self) -> Result<u64, ContractError>;

    async fn is_owner(&self, who: &Address) -> Result<bool, ContractError>;

    async fn is_confirmed_by(&self, index: u64, who: &Address) -> Result<bool, ContractError>;

    /// Owner at `position`, `None` past the end of the list
    async fn owner_at(&self, position: u64) -> Result<Option<Address>, ContractError>;

    async fn required_confirmations(&self) -> Result<u64, ContractError>;
}

/// Binds a contract address to a [`MultisigContract`] handle
pub trait ContractConnector: Send + Sync {
    fn connect(&self, address: Address) -> Arc<dyn MultisigContract>;
}

/// Deploys new multisig contracts
#[async_trait]
pub trait WalletFactory: Send + Sync {
    /// Deploy with an already validated owner set; returns the contract address
    async fn deploy(
        &self,
        deployer: &Account,
        owners: &[Address],
        threshold: u64,
    ) -> Result<Address, ContractError>;
}
