//! In-process multisig contracts
//!
//! Implements the wallet contract's rules on top of the devnet ledger so
//! that the coordinator can be exercised end to end without a node.
//! Contract balances live in the devnet ledger; execution moves value
//! through it.

use super::abi;
use super::contract::{
    ContractConnector, ContractError, ContractEvent, MultisigContract, ProposalRecord,
    WalletFactory,
};
use crate::core::{Address, TxHash, Wei};
use crate::crypto::keccak256;
use crate::ledger::{ChainError, InMemoryLedger, LedgerError, LogEntry};
use crate::wallet::Account;
use async_trait::async_trait;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
struct StoredProposal {
    to: Address,
    value: Wei,
    data: Vec<u8>,
    executed: bool,
    confirmed_by: HashSet<Address>,
}

#[derive(Debug)]
struct ContractState {
    owners: Vec<Address>,
    required: u64,
    proposals: Vec<StoredProposal>,
    logs: Vec<LogEntry>,
    writes: usize,
}

#[derive(Debug)]
struct HostInner {
    ledger: Arc<InMemoryLedger>,
    contracts: Mutex<HashMap<Address, ContractState>>,
    nonce: Mutex<u64>,
}

fn revert(reason: &str) -> ContractError {
    ContractError::Ledger(LedgerError::Chain(ChainError::Reverted(reason.to_string())))
}

impl HostInner {
    fn contracts(&self) -> MutexGuard<'_, HashMap<Address, ContractState>> {
        self.contracts.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn synthetic_hash(&self, contract: &Address, op: &str, index: u64) -> TxHash {
        let mut nonce = self.nonce.lock().unwrap_or_else(|e| e.into_inner());
        *nonce += 1;
        let mut preimage = Vec::new();
        preimage.extend_from_slice(contract.as_bytes());
        preimage.extend_from_slice(op.as_bytes());
        preimage.extend_from_slice(&index.to_be_bytes());
        preimage.extend_from_slice(&nonce.to_be_bytes());
        TxHash(keccak256(&preimage))
    }

    /// Run a state-changing call against `contract` as `caller`
    fn write<T>(
        &self,
        contract: &Address,
        caller: &Account,
        op: impl FnOnce(&mut ContractState, Address) -> Result<T, ContractError>,
    ) -> Result<T, ContractError> {
        let from = caller.signer().map_err(|e| ContractError::Send(e.into()))?.address();
        let mut contracts = self.contracts();
        let state = contracts
            .get_mut(contract)
            .ok_or_else(|| revert("no contract at address"))?;
        state.writes += 1;
        if !state.owners.contains(&from) {
            return Err(revert("not owner"));
        }
        op(state, from)
    }

    fn read<T>(
        &self,
        contract: &Address,
        op: impl FnOnce(&ContractState) -> Result<T, ContractError>,
    ) -> Result<T, ContractError> {
        let contracts = self.contracts();
        let state = contracts
            .get(contract)
            .ok_or_else(|| revert("no contract at address"))?;
        op(state)
    }
}

/// Factory and connector for in-memory multisig contracts
#[derive(Debug, Clone)]
pub struct InMemoryMultisigHost {
    inner: Arc<HostInner>,
}

impl InMemoryMultisigHost {
    pub fn new(ledger: Arc<InMemoryLedger>) -> Self {
        Self {
            inner: Arc::new(HostInner {
                ledger,
                contracts: Mutex::new(HashMap::new()),
                nonce: Mutex::new(0),
            }),
        }
    }

    /// Send value into a wallet, as its `receive` function would
    pub fn deposit(&self, from: &Address, contract: &Address, amount: Wei) -> Result<(), ContractError> {
        let mut contracts = self.inner.contracts();
        let state = contracts
            .get_mut(contract)
            .ok_or_else(|| revert("no contract at address"))?;
        self.inner
            .ledger
            .move_value(from, contract, &amount)
            .map_err(LedgerError::from)?;
        state.logs.push(abi::encode_event(
            *contract,
            &ContractEvent::Deposit {
                sender: *from,
                amount,
            },
        ));
        Ok(())
    }

    /// Events emitted by `contract` so far, decoded
    pub fn events(&self, contract: &Address) -> Vec<ContractEvent> {
        self.inner
            .read(contract, |state| {
                Ok(state
                    .logs
                    .iter()
                    .filter_map(|log| abi::decode_event(log).ok().flatten())
                    .collect())
            })
            .unwrap_or_default()
    }

    /// Number of state-changing calls attempted against `contract`,
    /// including reverted ones
    pub fn write_count(&self, contract: &Address) -> usize {
        self.inner
            .read(contract, |state| Ok(state.writes))
            .unwrap_or_default()
    }
}

#[async_trait]
impl WalletFactory for InMemoryMultisigHost {
    async fn deploy(
        &self,
        deployer: &Account,
        owners: &[Address],
        threshold: u64,
    ) -> Result<Address, ContractError> {
        let deployer = deployer
            .signer()
            .map_err(|e| ContractError::Send(e.into()))?
            .address();

        // Constructor checks
        if owners.is_empty() {
            return Err(revert("owners required"));
        }
        if threshold == 0 || threshold > owners.len() as u64 {
            return Err(revert("invalid number of required confirmations"));
        }
        let mut unique = HashSet::new();
        for owner in owners {
            if *owner == Address::ZERO {
                return Err(revert("invalid owner"));
            }
            if !unique.insert(*owner) {
                return Err(revert("owner not unique"));
            }
        }

        let nonce = self.inner.ledger.consume_sequence_number(&deployer);
        let address = Address::contract_address(&deployer, nonce);
        self.inner.contracts().insert(
            address,
            ContractState {
                owners: owners.to_vec(),
                required: threshold,
                proposals: Vec::new(),
                logs: Vec::new(),
                writes: 0,
            },
        );
        info!(
            "Devnet deployed multisig {} ({}-of-{}) for {}",
            address,
            threshold,
            owners.len(),
            deployer
        );
        Ok(address)
    }
}

impl ContractConnector for InMemoryMultisigHost {
    fn connect(&self, address: Address) -> Arc<dyn MultisigContract> {
        Arc::new(InMemoryMultisig {
            inner: self.inner.clone(),
            address,
        })
    }
}

/// Handle to one in-memory contract
#[derive(Debug)]
pub struct InMemoryMultisig {
    inner: Arc<HostInner>,
    address: Address,
}

#[async_trait]
impl MultisigContract for InMemoryMultisig {
    fn address(&self) -> Address {
        self.address
    }

    async fn submit_transaction(
        &self,
        caller: &Account,
        to: Address,
        value: &Wei,
        data: &[u8],
    ) -> Result<u64, ContractError> {
        let contract = self.address;
        let index = self.inner.write(&contract, caller, |state, from| {
            let index = state.proposals.len() as u64;
            let mut confirmed_by = HashSet::new();
            // The submitter's confirmation counts
            confirmed_by.insert(from);
            state.proposals.push(StoredProposal {
                to,
                value: value.clone(),
                data: data.to_vec(),
                executed: false,
                confirmed_by,
            });
            state.logs.push(abi::encode_event(
                contract,
                &ContractEvent::SubmitTransaction {
                    index,
                    to,
                    value: value.clone(),
                    data: data.to_vec(),
                },
            ));
            state.logs.push(abi::encode_event(
                contract,
                &ContractEvent::ConfirmTransaction { owner: from, index },
            ));
            Ok(index)
        })?;
        debug!("Devnet multisig {} proposal {} submitted", contract, index);
        Ok(index)
    }

    async fn confirm_transaction(&self, caller: &Account, index: u64) -> Result<TxHash, ContractError> {
        let contract = self.address;
        self.inner.write(&contract, caller, |state, from| {
            let proposal = state
                .proposals
                .get_mut(index as usize)
                .ok_or_else(|| revert("tx does not exist"))?;
            if proposal.executed {
                return Err(revert("tx already executed"));
            }
            if !proposal.confirmed_by.insert(from) {
                return Err(revert("tx already confirmed"));
            }
            state.logs.push(abi::encode_event(
                contract,
                &ContractEvent::ConfirmTransaction { owner: from, index },
            ));
            Ok(())
        })?;
        Ok(self.inner.synthetic_hash(&contract, "confirm", index))
    }

    async fn execute_transaction(&self, caller: &Account, index: u64) -> Result<TxHash, ContractError> {
        let contract = self.address;
        let ledger = self.inner.ledger.clone();
        self.inner.write(&contract, caller, |state, _from| {
            let required = state.required;
            let proposal = state
                .proposals
                .get_mut(index as usize)
                .ok_or_else(|| revert("tx does not exist"))?;
            if proposal.executed {
                return Err(revert("tx already executed"));
            }
            if (proposal.confirmed_by.len() as u64) < required {
                return Err(revert("cannot execute tx"));
            }
            ledger
                .move_value(&contract, &proposal.to, &proposal.value)
                .map_err(|_| revert("tx failed"))?;
            proposal.executed = true;
            state.logs.push(abi::encode_event(
                contract,
                &ContractEvent::ExecuteTransaction { index },
            ));
            Ok(())
        })?;
        info!("Devnet multisig {} executed proposal {}", contract, index);
        Ok(self.inner.synthetic_hash(&contract, "execute", index))
    }

    async fn get_transaction(&self, index: u64) -> Result<ProposalRecord, ContractError> {
        self.inner.read(&self.address, |state| {
            let proposal = state
                .proposals
                .get(index as usize)
                .ok_or_else(|| revert("tx does not exist"))?;
            Ok(ProposalRecord {
                to: proposal.to,
                value: proposal.value.clone(),
                data: proposal.data.clone(),
                executed: proposal.executed,
                confirmations: proposal.confirmed_by.len() as u64,
            })
        })
    }

    async fn transaction_count(&self) -> Result<u64, ContractError> {
        self.inner
            .read(&self.address, |state| Ok(state.proposals.len() as u64))
    }

    async fn is_owner(&self, who: &Address) -> Result<bool, ContractError> {
        self.inner
            .read(&self.address, |state| Ok(state.owners.contains(who)))
    }

    async fn is_confirmed_by(&self, index: u64, who: &Address) -> Result<bool, ContractError> {
        self.inner.read(&self.address, |state| {
            Ok(state
                .proposals
                .get(index as usize)
                .map(|p| p.confirmed_by.contains(who))
                .unwrap_or(false))
        })
    }

    async fn owner_at(&self, position: u64) -> Result<Option<Address>, ContractError> {
        self.inner
            .read(&self.address, |state| Ok(state.owners.get(position as usize).copied()))
    }

    async fn required_confirmations(&self) -> Result<u64, ContractError> {
        self.inner.read(&self.address, |state| Ok(state.required))
    }
}
