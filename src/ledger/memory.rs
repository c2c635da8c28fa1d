//! In-memory devnet
//!
//! A single-process ledger that validates signed transactions the way a
//! node would (network binding, sequence numbers, fee floor, balance) and
//! applies them immediately. Used when no RPC endpoint is configured and
//! throughout the test suite.

use super::client::{
    CallRequest, ChainError, LedgerClient, LedgerError, TransactionReceipt,
};
use crate::core::{Address, SignedTransaction, TxHash, Wei};
use async_trait::async_trait;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::Mutex;

/// Default network id for the devnet
pub const DEVNET_CHAIN_ID: u64 = 1337;

/// Base fee estimate for a plain transfer
const BASE_FEE_LIMIT: u64 = 21_000;
/// Extra fee units charged per payload byte by the estimator
const FEE_PER_PAYLOAD_BYTE: u64 = 16;
/// Extra fee units for contract creation
const CREATION_FEE: u64 = 32_000;

#[derive(Debug, Default)]
struct DevnetState {
    balances: HashMap<Address, Wei>,
    nonces: HashMap<Address, u64>,
    receipts: HashMap<TxHash, TransactionReceipt>,
    history: Vec<SignedTransaction>,
    failing_reads: u32,
}

impl DevnetState {
    fn balance(&self, address: &Address) -> Wei {
        self.balances.get(address).cloned().unwrap_or_default()
    }
}

/// In-memory ledger
#[derive(Debug)]
pub struct InMemoryLedger {
    chain_id: u64,
    min_fee_price: Wei,
    state: Mutex<DevnetState>,
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new(DEVNET_CHAIN_ID)
    }
}

impl InMemoryLedger {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            min_fee_price: Wei::from(1u64),
            state: Mutex::new(DevnetState::default()),
        }
    }

    /// Reject broadcasts whose fee price is below `price`
    pub fn with_min_fee_price(mut self, price: Wei) -> Self {
        self.min_fee_price = price;
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DevnetState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Credit `amount` to `address`
    pub fn fund(&self, address: &Address, amount: Wei) {
        let mut state = self.lock();
        let balance = state.balance(address);
        state.balances.insert(*address, &balance + &amount);
        debug!("Devnet funded {} with {} wei", address, amount);
    }

    /// Current balance without going through the async interface
    pub fn balance(&self, address: &Address) -> Wei {
        self.lock().balance(address)
    }

    /// Every transaction accepted so far, in order
    pub fn accepted_transactions(&self) -> Vec<SignedTransaction> {
        self.lock().history.clone()
    }

    /// Make the next `count` reads fail with a transport error
    pub fn fail_next_reads(&self, count: u32) {
        self.lock().failing_reads = count;
    }

    /// Move value between accounts outside of a signed transaction.
    /// Contract execution on the devnet uses this to pay out.
    pub(crate) fn move_value(&self, from: &Address, to: &Address, value: &Wei) -> Result<(), ChainError> {
        let mut state = self.lock();
        let remaining = state
            .balance(from)
            .checked_sub(value)
            .ok_or(ChainError::InsufficientFunds)?;
        state.balances.insert(*from, remaining);
        let credited = &state.balance(to) + value;
        state.balances.insert(*to, credited);
        Ok(())
    }

    /// Consume a sequence number for `address` without a signed
    /// transaction, returning the one used
    pub(crate) fn consume_sequence_number(&self, address: &Address) -> u64 {
        let mut state = self.lock();
        let nonce = state.nonces.entry(*address).or_insert(0);
        let used = *nonce;
        *nonce += 1;
        used
    }

    fn check_read(&self) -> Result<(), LedgerError> {
        let mut state = self.lock();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(LedgerError::Network("devnet: injected read failure".into()));
        }
        Ok(())
    }

    fn apply(&self, tx: SignedTransaction) -> Result<TxHash, ChainError> {
        let intent = tx.intent().clone();

        if intent.network_id != self.chain_id {
            return Err(ChainError::WrongNetwork);
        }
        if intent.fee_price < self.min_fee_price {
            return Err(ChainError::FeeTooLow);
        }

        let mut state = self.lock();
        let expected = state.nonces.get(&intent.sender).copied().unwrap_or(0);
        if intent.sequence_number < expected {
            return Err(ChainError::SequenceNumberStale);
        }
        if intent.sequence_number > expected {
            return Err(ChainError::Rejected(format!(
                "nonce too high: expected {}, got {}",
                expected, intent.sequence_number
            )));
        }

        let max_fee = &intent.fee_price * intent.fee_limit;
        let cost = &intent.value + &max_fee;
        let remaining = state
            .balance(&intent.sender)
            .checked_sub(&cost)
            .ok_or(ChainError::InsufficientFunds)?;

        // Unused fee allowance is not refunded on the devnet
        state.balances.insert(intent.sender, remaining);

        let contract_address = match intent.recipient {
            Some(to) => {
                let credited = &state.balance(&to) + &intent.value;
                state.balances.insert(to, credited);
                None
            }
            None => {
                let created = Address::contract_address(&intent.sender, intent.sequence_number);
                let credited = &state.balance(&created) + &intent.value;
                state.balances.insert(created, credited);
                Some(created)
            }
        };

        state.nonces.insert(intent.sender, expected + 1);

        let hash = tx.hash();
        state.receipts.insert(
            hash,
            TransactionReceipt {
                hash,
                success: true,
                contract_address,
                logs: Vec::new(),
            },
        );
        state.history.push(tx);

        info!(
            "Devnet accepted {} from {} (nonce {})",
            hash, intent.sender, intent.sequence_number
        );
        Ok(hash)
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn balance_of(&self, address: &Address) -> Result<Wei, LedgerError> {
        self.check_read()?;
        Ok(self.balance(address))
    }

    async fn next_sequence_number(&self, address: &Address) -> Result<u64, LedgerError> {
        self.check_read()?;
        let next = self.lock().nonces.get(address).copied().unwrap_or(0);
        // Give other tasks a chance to interleave, as a remote node would
        tokio::task::yield_now().await;
        Ok(next)
    }

    async fn suggested_fee_price(&self) -> Result<Wei, LedgerError> {
        self.check_read()?;
        Ok(self.min_fee_price.clone())
    }

    async fn network_id(&self) -> Result<u64, LedgerError> {
        self.check_read()?;
        Ok(self.chain_id)
    }

    async fn broadcast(&self, raw: &[u8]) -> Result<TxHash, LedgerError> {
        let tx = SignedTransaction::decode(raw)
            .map_err(|e| ChainError::Rejected(e.to_string()))?;
        tokio::task::yield_now().await;
        Ok(self.apply(tx)?)
    }

    async fn estimate_fee_limit(&self, call: &CallRequest) -> Result<u64, LedgerError> {
        self.check_read()?;
        let payload = FEE_PER_PAYLOAD_BYTE * call.data.len() as u64;
        let creation = if call.to.is_none() { CREATION_FEE } else { 0 };
        Ok(BASE_FEE_LIMIT + payload + creation)
    }

    async fn call(&self, call: &CallRequest) -> Result<Vec<u8>, LedgerError> {
        self.check_read()?;
        let target = call
            .to
            .map(|a| a.to_string())
            .unwrap_or_else(|| "<creation>".to_string());
        Err(ChainError::Reverted(format!("no contract code at {}", target)).into())
    }

    async fn receipt(&self, hash: &TxHash) -> Result<Option<TransactionReceipt>, LedgerError> {
        self.check_read()?;
        Ok(self.lock().receipts.get(hash).cloned())
    }
}
