//! Core ledger primitives
//!
//! This module contains the fundamental building blocks:
//! - Amounts (exact ether/wei conversion)
//! - Addresses (20-byte, EIP-55 checksummed)
//! - RLP encoding
//! - Transaction intents and EIP-155 signed transactions

pub mod address;
pub mod amount;
pub mod rlp;
pub mod transaction;

pub use address::{Address, AddressError, ADDRESS_LENGTH};
pub use amount::{to_base_units, to_display_units, AmountError, Wei, ETHER_DECIMALS};
pub use transaction::{
    SignedTransaction, TransactionError, TransactionIntent, TxHash, TRANSFER_GAS_LIMIT,
};
