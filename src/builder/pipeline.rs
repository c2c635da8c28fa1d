//! Transaction pipeline
//!
//! Turns an account plus a [`TransferDraft`] into a broadcast transaction:
//! populate (sequence number, fee price, fee limit, network id), sign,
//! broadcast. The fetch-sign-broadcast part runs under the sender's
//! sequencer lock so concurrent sends from one key get distinct numbers.

use super::sequencer::Sequencer;
use crate::core::{
    to_base_units, Address, AmountError, TransactionError, TransactionIntent, TxHash, Wei,
    TRANSFER_GAS_LIMIT,
};
use crate::error::ErrorKind;
use crate::ledger::{
    retry_read, CallRequest, ChainError, LedgerClient, LedgerError, RetryPolicy, Retryable,
};
use crate::wallet::{Account, WalletError};
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;

// =============================================================================
// Errors
// =============================================================================

/// Failures while building or sending a transaction
#[derive(Error, Debug)]
pub enum SendError {
    #[error("Invalid amount: {0}")]
    Amount(#[from] AmountError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
    #[error("Signing failed: {0}")]
    Signing(#[from] TransactionError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl SendError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SendError::Amount(e) => e.kind(),
            SendError::Wallet(e) => e.kind(),
            SendError::Signing(_) => ErrorKind::Validation,
            SendError::Ledger(e) => e.kind(),
        }
    }

    /// The ledger-level rejection, if that is what this is
    pub fn chain_error(&self) -> Option<&ChainError> {
        match self {
            SendError::Ledger(LedgerError::Chain(e)) => Some(e),
            _ => None,
        }
    }
}

impl Retryable for SendError {
    fn is_retryable(&self) -> bool {
        matches!(self, SendError::Ledger(e) if e.is_retryable())
    }
}

// =============================================================================
// Drafts
// =============================================================================

/// What the caller wants to send, before ledger-derived fields are filled in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferDraft {
    /// `None` deploys `payload` as contract code
    pub recipient: Option<Address>,
    pub value: Wei,
    pub payload: Vec<u8>,
}

impl TransferDraft {
    /// Plain value transfer
    pub fn transfer(recipient: Address, value: Wei) -> Self {
        Self {
            recipient: Some(recipient),
            value,
            payload: Vec::new(),
        }
    }

    /// Contract call carrying ABI-encoded `payload`
    pub fn call(contract: Address, value: Wei, payload: Vec<u8>) -> Self {
        Self {
            recipient: Some(contract),
            value,
            payload,
        }
    }

    /// Contract creation from init code
    pub fn deploy(init_code: Vec<u8>) -> Self {
        Self {
            recipient: None,
            value: Wei::zero(),
            payload: init_code,
        }
    }

    fn is_plain_transfer(&self) -> bool {
        self.recipient.is_some() && self.payload.is_empty()
    }
}

/// Result of a successful broadcast
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastReceipt {
    pub hash: TxHash,
    pub sender: Address,
    pub sequence_number: u64,
    /// Set for contract creation
    pub contract_address: Option<Address>,
}

// =============================================================================
// Builder
// =============================================================================

/// Tunables for the pipeline
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Fee limit for plain transfers; calls and deployments are estimated
    pub transfer_gas_limit: u64,
    pub retry: RetryPolicy,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            transfer_gas_limit: TRANSFER_GAS_LIMIT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Builds, signs and broadcasts transactions against a ledger
pub struct TransactionBuilder {
    ledger: Arc<dyn LedgerClient>,
    sequencer: Sequencer,
    network_id: OnceCell<u64>,
    config: BuilderConfig,
}

impl TransactionBuilder {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: BuilderConfig) -> Self {
        Self {
            ledger,
            sequencer: Sequencer::new(),
            network_id: OnceCell::new(),
            config,
        }
    }

    pub fn ledger(&self) -> &Arc<dyn LedgerClient> {
        &self.ledger
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.config.retry
    }

    /// Network id, fetched once per builder
    pub async fn network_id(&self) -> Result<u64, SendError> {
        let id = self
            .network_id
            .get_or_try_init(|| async {
                let id = retry_read(&self.config.retry, "network_id", || {
                    self.ledger.network_id()
                })
                .await?;
                info!("Connected to network {}", id);
                Ok::<u64, LedgerError>(id)
            })
            .await?;
        Ok(*id)
    }

    /// Balance of `address`, retried on transport failure
    pub async fn balance_of(&self, address: &Address) -> Result<Wei, SendError> {
        Ok(retry_read(&self.config.retry, "balance_of", || self.ledger.balance_of(address)).await?)
    }

    /// Send `amount` (display units, e.g. `"1.5"`) from `from` to `to`
    pub async fn transfer(
        &self,
        from: &Account,
        to: Address,
        amount: &str,
    ) -> Result<BroadcastReceipt, SendError> {
        let value = to_base_units(amount)?;
        self.send(from, TransferDraft::transfer(to, value)).await
    }

    /// Call a contract with ABI-encoded `payload`
    pub async fn send_call(
        &self,
        from: &Account,
        contract: Address,
        value: Wei,
        payload: Vec<u8>,
    ) -> Result<BroadcastReceipt, SendError> {
        self.send(from, TransferDraft::call(contract, value, payload)).await
    }

    /// Deploy `init_code` (bytecode plus encoded constructor arguments)
    pub async fn deploy_contract(
        &self,
        from: &Account,
        init_code: Vec<u8>,
    ) -> Result<BroadcastReceipt, SendError> {
        self.send(from, TransferDraft::deploy(init_code)).await
    }

    /// Populate, sign and broadcast `draft`.
    ///
    /// A stale sequence number is retried once with a fresh one; any other
    /// broadcast failure is returned as is.
    pub async fn send(
        &self,
        from: &Account,
        draft: TransferDraft,
    ) -> Result<BroadcastReceipt, SendError> {
        let signer = from.signer()?;
        let sender = from.address();

        let network_id = self.network_id().await?;
        let fee_price = retry_read(&self.config.retry, "suggested_fee_price", || {
            self.ledger.suggested_fee_price()
        })
        .await?;
        let fee_limit = self.fee_limit(sender, &draft).await?;

        let mut slot = self.sequencer.lock(&sender).await;
        let mut stale_retried = false;
        loop {
            let remote_next = retry_read(&self.config.retry, "next_sequence_number", || {
                self.ledger.next_sequence_number(&sender)
            })
            .await?;
            let sequence_number = slot.assign(remote_next);

            let intent = TransactionIntent {
                sender,
                recipient: draft.recipient,
                value: draft.value.clone(),
                payload: draft.payload.clone(),
                sequence_number,
                fee_price: fee_price.clone(),
                fee_limit,
                network_id,
            };
            let signed = intent.sign(signer)?;
            debug!(
                "Signed {} from {} nonce={} fee_price={} fee_limit={}",
                signed.hash(),
                sender,
                sequence_number,
                fee_price,
                fee_limit
            );

            match self.ledger.broadcast(signed.raw()).await {
                Ok(hash) => {
                    slot.commit(sequence_number);
                    if hash != signed.hash() {
                        warn!("Ledger reported hash {} for {}", hash, signed.hash());
                    }
                    info!(
                        "Broadcast {} from {} (nonce {})",
                        signed.hash(),
                        sender,
                        sequence_number
                    );
                    return Ok(BroadcastReceipt {
                        hash: signed.hash(),
                        sender,
                        sequence_number,
                        contract_address: draft
                            .recipient
                            .is_none()
                            .then(|| Address::contract_address(&sender, sequence_number)),
                    });
                }
                Err(LedgerError::Chain(ChainError::AlreadyKnown)) => {
                    // These bytes are already pending; signing again would send twice
                    info!(
                        "{} from {} (nonce {}) already known to the ledger",
                        signed.hash(),
                        sender,
                        sequence_number
                    );
                    slot.commit(sequence_number);
                    return Ok(BroadcastReceipt {
                        hash: signed.hash(),
                        sender,
                        sequence_number,
                        contract_address: draft
                            .recipient
                            .is_none()
                            .then(|| Address::contract_address(&sender, sequence_number)),
                    });
                }
                Err(LedgerError::Chain(ChainError::SequenceNumberStale)) if !stale_retried => {
                    warn!(
                        "Sequence number {} for {} is stale, refetching",
                        sequence_number, sender
                    );
                    slot.reset();
                    stale_retried = true;
                }
                Err(e) => {
                    warn!("Broadcast from {} failed: {}", sender, e);
                    return Err(e.into());
                }
            }
        }
    }

    async fn fee_limit(&self, sender: Address, draft: &TransferDraft) -> Result<u64, SendError> {
        if draft.is_plain_transfer() {
            return Ok(self.config.transfer_gas_limit);
        }
        let request = CallRequest {
            from: Some(sender),
            to: draft.recipient,
            value: draft.value.clone(),
            data: draft.payload.clone(),
        };
        Ok(retry_read(&self.config.retry, "estimate_fee_limit", || {
            self.ledger.estimate_fee_limit(&request)
        })
        .await?)
    }
}
