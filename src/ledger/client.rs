//! Ledger client capability
//!
//! The core never talks to a ledger directly; it goes through
//! [`LedgerClient`], which a JSON-RPC node adapter and the in-memory
//! devnet both implement.

use crate::core::{Address, TxHash, Wei};
use crate::error::ErrorKind;
use async_trait::async_trait;
use thiserror::Error;

/// Rejections reported by the ledger itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("insufficient funds for value plus fee")]
    InsufficientFunds,
    #[error("sequence number is stale (nonce too low)")]
    SequenceNumberStale,
    /// These exact signed bytes are already pending on the node
    #[error("transaction already known")]
    AlreadyKnown,
    #[error("fee price too low")]
    FeeTooLow,
    #[error("transaction signed for a different network")]
    WrongNetwork,
    #[error("execution reverted: {0}")]
    Reverted(String),
    #[error("rejected by ledger: {0}")]
    Rejected(String),
}

impl ChainError {
    /// Classify an error message returned by a node
    pub fn from_message(message: &str) -> Self {
        // ASCII-only lowering keeps byte offsets valid for `message`
        let lower = message.to_ascii_lowercase();
        if lower.contains("insufficient funds") {
            ChainError::InsufficientFunds
        } else if lower.contains("already known") {
            ChainError::AlreadyKnown
        } else if lower.contains("nonce too low") {
            ChainError::SequenceNumberStale
        } else if lower.contains("underpriced") || lower.contains("fee too low") || lower.contains("max fee per gas less than") {
            ChainError::FeeTooLow
        } else if lower.contains("invalid chain id") || lower.contains("replay-protected") {
            ChainError::WrongNetwork
        } else if let Some(reason) = lower.find("execution reverted") {
            let detail = message[reason + "execution reverted".len()..]
                .trim_start_matches(':')
                .trim();
            ChainError::Reverted(detail.to_string())
        } else {
            ChainError::Rejected(message.to_string())
        }
    }
}

/// Errors surfaced by ledger adapters
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Invalid response from ledger: {0}")]
    InvalidResponse(String),
    #[error("Invalid ledger endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Network(_) | LedgerError::InvalidResponse(_) => ErrorKind::Network,
            LedgerError::InvalidEndpoint(_) => ErrorKind::Validation,
            LedgerError::Chain(ChainError::Reverted(reason))
                if reason.to_lowercase().contains("not owner") =>
            {
                ErrorKind::Authorization
            }
            LedgerError::Chain(_) => ErrorKind::Chain,
        }
    }

    /// Only transport failures are worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Network(_))
    }
}

/// Read-only call or fee estimate request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Option<Address>,
    /// `None` for contract creation estimates
    pub to: Option<Address>,
    pub value: Wei,
    pub data: Vec<u8>,
}

/// A log entry emitted during execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
}

/// Outcome of an included transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub hash: TxHash,
    pub success: bool,
    pub contract_address: Option<Address>,
    pub logs: Vec<LogEntry>,
}

/// Capability interface to an account-based ledger
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Balance in base units
    async fn balance_of(&self, address: &Address) -> Result<Wei, LedgerError>;

    /// Next unused sequence number, counting transactions not yet final
    async fn next_sequence_number(&self, address: &Address) -> Result<u64, LedgerError>;

    async fn suggested_fee_price(&self) -> Result<Wei, LedgerError>;

    /// Identifier the signature must be bound to
    async fn network_id(&self) -> Result<u64, LedgerError>;

    /// Submit signed bytes; returns the content hash once accepted for inclusion
    async fn broadcast(&self, raw: &[u8]) -> Result<TxHash, LedgerError>;

    async fn estimate_fee_limit(&self, call: &CallRequest) -> Result<u64, LedgerError>;

    /// Execute a read-only contract call
    async fn call(&self, call: &CallRequest) -> Result<Vec<u8>, LedgerError>;

    async fn receipt(&self, hash: &TxHash) -> Result<Option<TransactionReceipt>, LedgerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_node_messages() {
        assert_eq!(
            ChainError::from_message("insufficient funds for gas * price + value"),
            ChainError::InsufficientFunds
        );
        assert_eq!(
            ChainError::from_message("nonce too low: next nonce 4, tx nonce 3"),
            ChainError::SequenceNumberStale
        );
        assert_eq!(
            ChainError::from_message("replacement transaction underpriced"),
            ChainError::FeeTooLow
        );
        assert_eq!(
            ChainError::from_message("invalid chain id for signer"),
            ChainError::WrongNetwork
        );
        assert_eq!(
            ChainError::from_message("execution reverted: not owner"),
            ChainError::Reverted("not owner".to_string())
        );
        assert!(matches!(
            ChainError::from_message("something odd"),
            ChainError::Rejected(_)
        ));
    }

    #[test]
    fn test_already_known_is_not_stale() {
        assert_eq!(ChainError::from_message("already known"), ChainError::AlreadyKnown);
        assert_eq!(
            ChainError::from_message("ALREADY KNOWN transaction"),
            ChainError::AlreadyKnown
        );
    }

    #[test]
    fn test_non_ascii_node_message() {
        assert_eq!(
            ChainError::from_message("İ execution reverted€"),
            ChainError::Reverted("€".to_string())
        );
        assert_eq!(
            ChainError::from_message("Ünknown: execution reverted: Zugriff verweigert ß"),
            ChainError::Reverted("Zugriff verweigert ß".to_string())
        );
        assert!(matches!(
            ChainError::from_message("ẞ größe"),
            ChainError::Rejected(_)
        ));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(LedgerError::Network("timeout".into()).kind(), ErrorKind::Network);
        assert!(LedgerError::Network("timeout".into()).is_retryable());
        assert!(!LedgerError::Chain(ChainError::FeeTooLow).is_retryable());
        assert_eq!(
            LedgerError::Chain(ChainError::Reverted("not owner".into())).kind(),
            ErrorKind::Authorization
        );
        assert_eq!(
            LedgerError::Chain(ChainError::InsufficientFunds).kind(),
            ErrorKind::Chain
        );
    }
}
