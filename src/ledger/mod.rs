//! Ledger access
//!
//! - [`LedgerClient`]: the capability every adapter implements
//! - [`RpcLedger`]: JSON-RPC node over HTTP
//! - [`InMemoryLedger`]: single-process devnet
//! - bounded retry for idempotent reads

pub mod client;
pub mod memory;
pub mod retry;
pub mod rpc;

pub use client::{
    CallRequest, ChainError, LedgerClient, LedgerError, LogEntry, TransactionReceipt,
};
pub use memory::{InMemoryLedger, DEVNET_CHAIN_ID};
pub use retry::{retry_read, wait_for_receipt, ReceiptPolicy, RetryPolicy, Retryable};
pub use rpc::RpcLedger;
