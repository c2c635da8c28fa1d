//! Multisig Wallet: transaction signing and multisig coordination for
//! account-based ledgers
//!
//! This crate provides:
//! - Exact decimal to base-unit amount conversion (no floating point)
//! - secp256k1 key generation and EIP-55 checksummed addresses
//! - EIP-155 replay-protected transaction signing over RLP
//! - Per-sender sequence number allocation that never collides
//! - Bounded retry with backoff for idempotent ledger reads
//! - M-of-N multisig wallets driven through the on-ledger contract
//! - A JSON-RPC ledger adapter and an in-memory devnet
//! - An HTTP API and CLI over the same operations
//!
//! # Example
//!
//! ```rust
//! use multisig_wallet::core::{to_base_units, to_display_units};
//! use multisig_wallet::wallet::Account;
//!
//! let account = Account::generate();
//! println!("Address: {}", account.address());
//!
//! let wei = to_base_units("1.5").unwrap();
//! assert_eq!(wei.to_string(), "1500000000000000000");
//! assert_eq!(to_display_units(&wei), "1.5");
//! ```

pub mod api;
pub mod builder;
pub mod cli;
pub mod config;
pub mod core;
pub mod crypto;
pub mod error;
pub mod ledger;
pub mod multisig;
pub mod wallet;

// Re-export commonly used types
pub use api::{create_router, ApiState};
pub use builder::{BroadcastReceipt, BuilderConfig, SendError, TransactionBuilder};
pub use config::{Config, ConfigError};
pub use core::{
    to_base_units, to_display_units, Address, AmountError, SignedTransaction, TransactionIntent,
    TxHash, Wei,
};
pub use crypto::KeyPair;
pub use error::ErrorKind;
pub use ledger::{ChainError, InMemoryLedger, LedgerClient, LedgerError, RetryPolicy, RpcLedger};
pub use multisig::{
    MultisigConfig, MultisigContract, MultisigCoordinator, MultisigError, MultisigTransaction,
    MultisigWallet, ProposalState,
};
pub use wallet::Account;
