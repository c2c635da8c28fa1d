//! Multisig coordinator
//!
//! Validates requests locally, then drives the contract. Decisions that
//! change state (confirm, execute) are always made on a fresh read of
//! the contract. The only local state is a per-wallet cache used to spot
//! duplicate proposals, and every hit in it is re-read before use.

use super::contract::{ContractConnector, ContractError, MultisigContract, ProposalRecord, WalletFactory};
use super::transaction::MultisigTransaction;
use super::wallet::{MultisigConfig, MultisigError, MultisigWallet};
use crate::builder::KeyedMutex;
use crate::core::{to_base_units, Address, TxHash, Wei};
use crate::ledger::{retry_read, RetryPolicy};
use crate::wallet::Account;
use futures::future::try_join_all;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;

/// Upper bound on owners read back by `load_wallet`
const MAX_OWNERS: u64 = 256;

/// Result of a submit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SubmitOutcome {
    pub index: u64,
    /// The proposal already existed and is still pending
    pub deduplicated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ProposalKey {
    to: Address,
    value: Wei,
    data: Vec<u8>,
}

impl ProposalKey {
    fn matches(&self, record: &ProposalRecord) -> bool {
        self.to == record.to && self.value == record.value && self.data == record.data
    }
}

#[derive(Debug, Clone)]
struct CachedProposal {
    key: ProposalKey,
    index: u64,
}

/// Coordinates proposals across wallet owners
pub struct MultisigCoordinator {
    connector: Arc<dyn ContractConnector>,
    factory: Arc<dyn WalletFactory>,
    retry: RetryPolicy,
    proposals: KeyedMutex<Address, Vec<CachedProposal>>,
}

impl MultisigCoordinator {
    pub fn new(
        connector: Arc<dyn ContractConnector>,
        factory: Arc<dyn WalletFactory>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            connector,
            factory,
            retry,
            proposals: KeyedMutex::new(),
        }
    }

    // =========================================================================
    // Wallets
    // =========================================================================

    /// Validate the owner set, then deploy a new wallet contract
    pub async fn deploy(
        &self,
        deployer: &Account,
        owners: Vec<Address>,
        threshold: u64,
    ) -> Result<MultisigWallet, MultisigError> {
        let config = MultisigConfig::new(owners, threshold)?;
        deployer.signer()?;

        let address = self
            .factory
            .deploy(deployer, config.owners(), config.threshold())
            .await
            .map_err(|e| {
                warn!("Multisig deployment failed: {}", e);
                MultisigError::DeploymentFailed(e.to_string())
            })?;

        info!("Deployed {} multisig wallet {}", config.description(), address);
        Ok(MultisigWallet::new(address, config))
    }

    /// Rebuild a wallet description from the contract's own views
    pub async fn load_wallet(&self, address: Address) -> Result<MultisigWallet, MultisigError> {
        let contract = self.connector.connect(address);

        let mut owners = Vec::new();
        for position in 0..MAX_OWNERS {
            let owner = retry_read(&self.retry, "owners", || contract.owner_at(position)).await?;
            match owner {
                Some(owner) => owners.push(owner),
                None => break,
            }
        }
        let threshold =
            retry_read(&self.retry, "requiredConfirmations", || contract.required_confirmations())
                .await?;

        let config = MultisigConfig::new(owners, threshold)?;
        debug!("Loaded {} wallet {}", config.description(), address);
        Ok(MultisigWallet::new(address, config))
    }

    // =========================================================================
    // Proposals
    // =========================================================================

    /// Propose sending `value` and `payload` to `recipient`.
    ///
    /// If this coordinator already submitted an identical proposal that the
    /// contract still reports as pending, its index is returned instead.
    pub async fn submit(
        &self,
        wallet: &MultisigWallet,
        caller: &Account,
        recipient: Address,
        value: Wei,
        payload: Vec<u8>,
    ) -> Result<SubmitOutcome, MultisigError> {
        wallet.ensure_owner(&caller.address())?;
        caller.signer()?;

        let key = ProposalKey {
            to: recipient,
            value,
            data: payload,
        };
        let contract = self.connector.connect(wallet.address);

        let mut cache = self.proposals.lock(&wallet.address).await;

        let candidates: Vec<u64> = cache
            .iter()
            .filter(|c| c.key == key)
            .map(|c| c.index)
            .collect();
        for index in candidates {
            let record = self.read_proposal(contract.as_ref(), index).await?;
            if !record.executed && key.matches(&record) {
                info!(
                    "Proposal to {} already pending as {} on {}",
                    key.to, index, wallet.address
                );
                return Ok(SubmitOutcome {
                    index,
                    deduplicated: true,
                });
            }
            debug!("Evicting stale cached proposal {} on {}", index, wallet.address);
            cache.retain(|c| c.index != index);
        }

        let index = contract
            .submit_transaction(caller, key.to, &key.value, &key.data)
            .await?;
        info!(
            "Submitted proposal {} on {} by {}",
            index,
            wallet.address,
            caller.address()
        );

        cache.push(CachedProposal { key, index });
        Ok(SubmitOutcome {
            index,
            deduplicated: false,
        })
    }

    /// Like [`submit`](Self::submit) but parses display-unit input first
    pub async fn submit_display(
        &self,
        wallet: &MultisigWallet,
        caller: &Account,
        recipient: &str,
        amount: &str,
        payload: Vec<u8>,
    ) -> Result<SubmitOutcome, MultisigError> {
        let recipient: Address = recipient.parse()?;
        let value = to_base_units(amount)?;
        self.submit(wallet, caller, recipient, value, payload).await
    }

    /// Add `caller`'s confirmation to proposal `index`
    pub async fn confirm(
        &self,
        wallet: &MultisigWallet,
        index: u64,
        caller: &Account,
    ) -> Result<TxHash, MultisigError> {
        let owner = caller.address();
        wallet.ensure_owner(&owner)?;
        caller.signer()?;

        let contract = self.connector.connect(wallet.address);
        let record = self.read_proposal(contract.as_ref(), index).await?;
        if record.executed {
            return Err(MultisigError::AlreadyExecuted(index));
        }
        let confirmed = retry_read(&self.retry, "isConfirmed", || {
            contract.is_confirmed_by(index, &owner)
        })
        .await?;
        if confirmed {
            return Err(MultisigError::AlreadyConfirmed { index, owner });
        }

        let hash = contract.confirm_transaction(caller, index).await?;
        info!("{} confirmed proposal {} on {} in {}", owner, index, wallet.address, hash);
        Ok(hash)
    }

    /// Execute proposal `index` once the contract reports a quorum
    pub async fn execute(
        &self,
        wallet: &MultisigWallet,
        index: u64,
        caller: &Account,
    ) -> Result<TxHash, MultisigError> {
        wallet.ensure_owner(&caller.address())?;
        caller.signer()?;

        let contract = self.connector.connect(wallet.address);
        // Always the contract's view, never the cache
        let record = self.read_proposal(contract.as_ref(), index).await?;
        if record.executed {
            return Err(MultisigError::AlreadyExecuted(index));
        }
        if record.confirmations < wallet.threshold() {
            return Err(MultisigError::QuorumNotReached {
                index,
                have: record.confirmations,
                need: wallet.threshold(),
            });
        }

        let hash = contract.execute_transaction(caller, index).await?;
        info!("Executed proposal {} on {} in {}", index, wallet.address, hash);

        let mut cache = self.proposals.lock(&wallet.address).await;
        cache.retain(|c| c.index != index);
        Ok(hash)
    }

    /// Current state of proposal `index`
    pub async fn status(
        &self,
        wallet: &MultisigWallet,
        index: u64,
    ) -> Result<MultisigTransaction, MultisigError> {
        let contract = self.connector.connect(wallet.address);
        let record = self.read_proposal(contract.as_ref(), index).await?;
        self.observe(wallet, contract.as_ref(), index, record).await
    }

    /// All proposals the contract reports as not yet executed
    pub async fn list_pending(
        &self,
        wallet: &MultisigWallet,
    ) -> Result<Vec<MultisigTransaction>, MultisigError> {
        let contract = self.connector.connect(wallet.address);
        let count =
            retry_read(&self.retry, "getTransactionCount", || contract.transaction_count()).await?;

        let mut pending = Vec::new();
        for index in 0..count {
            let record =
                retry_read(&self.retry, "getTransaction", || contract.get_transaction(index))
                    .await?;
            if !record.executed {
                pending.push(self.observe(wallet, contract.as_ref(), index, record).await?);
            }
        }
        Ok(pending)
    }

    async fn read_proposal(
        &self,
        contract: &dyn MultisigContract,
        index: u64,
    ) -> Result<ProposalRecord, MultisigError> {
        let count =
            retry_read(&self.retry, "getTransactionCount", || contract.transaction_count()).await?;
        if index >= count {
            return Err(MultisigError::TransactionNotFound(index));
        }
        Ok(retry_read(&self.retry, "getTransaction", || contract.get_transaction(index)).await?)
    }

    async fn observe(
        &self,
        wallet: &MultisigWallet,
        contract: &dyn MultisigContract,
        index: u64,
        record: ProposalRecord,
    ) -> Result<MultisigTransaction, MultisigError> {
        let checks = wallet.owners().iter().map(|owner| async move {
            let confirmed = retry_read(&self.retry, "isConfirmed", || {
                contract.is_confirmed_by(index, owner)
            })
            .await?;
            Ok::<_, ContractError>(confirmed.then_some(*owner))
        });
        let confirmed_by = try_join_all(checks).await?.into_iter().flatten().collect();
        Ok(MultisigTransaction::observe(
            index,
            record,
            wallet.threshold(),
            confirmed_by,
        ))
    }
}
