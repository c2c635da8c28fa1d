//! Bounded retry for idempotent reads
//!
//! Broadcasts are never routed through here: re-sending a signed
//! transaction after an ambiguous failure is the caller's decision.

use super::client::{LedgerClient, LedgerError, TransactionReceipt};
use crate::core::TxHash;
use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Errors that can tell whether another attempt might succeed
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for LedgerError {
    fn is_retryable(&self) -> bool {
        LedgerError::is_retryable(self)
    }
}

/// Exponential backoff with jitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2_000,
            jitter_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// No retries at all
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay_ms: 0,
            max_delay_ms: 0,
            jitter_ms: 0,
        }
    }

    fn backoff_with_jitter(&self, attempt: u32) -> Duration {
        let exp = self
            .base_delay_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(self.max_delay_ms);
        let extra = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(exp + extra)
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out
pub async fn retry_read<T, E, F, Fut>(policy: &RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && e.is_retryable() => {
                let delay = policy.backoff_with_jitter(attempt - 1);
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    what, attempt, max_attempts, e, delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// How long to wait for a broadcast transaction to be included
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptPolicy {
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
}

impl Default for ReceiptPolicy {
    fn default() -> Self {
        Self {
            poll_attempts: 60,
            poll_interval_ms: 2_000,
        }
    }
}

/// Poll for a receipt; `Ok(None)` means it did not show up in time
pub async fn wait_for_receipt(
    ledger: &dyn LedgerClient,
    hash: &TxHash,
    receipts: &ReceiptPolicy,
    retry: &RetryPolicy,
) -> Result<Option<TransactionReceipt>, LedgerError> {
    for poll in 0..receipts.poll_attempts.max(1) {
        let found = retry_read(retry, "eth_getTransactionReceipt", || ledger.receipt(hash)).await?;
        if let Some(receipt) = found {
            debug!("Receipt for {} after {} polls", hash, poll + 1);
            return Ok(Some(receipt));
        }
        tokio::time::sleep(Duration::from_millis(receipts.poll_interval_ms)).await;
    }
    Ok(None)
}
