//! Multisig contract over a ledger node
//!
//! Reads go through `eth_call` with retry. Writes are signed contract
//! calls sent through the shared [`TransactionBuilder`], so they take
//! part in per-sender sequencing like any other transaction.

use super::abi;
use super::contract::{
    ContractConnector, ContractError, ContractEvent, MultisigContract, ProposalRecord,
    WalletFactory,
};
use crate::builder::TransactionBuilder;
use crate::core::{Address, TxHash, Wei};
use crate::ledger::{
    retry_read, wait_for_receipt, CallRequest, ReceiptPolicy, TransactionReceipt,
};
use crate::wallet::Account;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;

/// Handle to a deployed contract
pub struct RpcMultisigContract {
    address: Address,
    builder: Arc<TransactionBuilder>,
    receipts: ReceiptPolicy,
}

impl RpcMultisigContract {
    pub fn new(address: Address, builder: Arc<TransactionBuilder>, receipts: ReceiptPolicy) -> Self {
        Self {
            address,
            builder,
            receipts,
        }
    }

    async fn view(&self, what: &str, data: Vec<u8>) -> Result<Vec<u8>, ContractError> {
        let request = CallRequest {
            from: None,
            to: Some(self.address),
            value: Wei::zero(),
            data,
        };
        let ledger = self.builder.ledger();
        Ok(retry_read(self.builder.retry_policy(), what, || ledger.call(&request)).await?)
    }

    async fn write(&self, caller: &Account, data: Vec<u8>) -> Result<TxHash, ContractError> {
        let sent = self
            .builder
            .send_call(caller, self.address, Wei::zero(), data)
            .await?;
        Ok(sent.hash)
    }

    async fn included(&self, hash: TxHash) -> Result<TransactionReceipt, ContractError> {
        let receipt = wait_for_receipt(
            self.builder.ledger().as_ref(),
            &hash,
            &self.receipts,
            self.builder.retry_policy(),
        )
        .await?
        .ok_or(ContractError::ReceiptTimeout(hash))?;
        if !receipt.success {
            return Err(ContractError::ExecutionFailed(hash));
        }
        Ok(receipt)
    }
}

/// Index assigned by the contract, taken from its `SubmitTransaction` event
fn submitted_index(contract: &Address, receipt: &TransactionReceipt) -> Result<u64, ContractError> {
    for log in receipt.logs.iter().filter(|l| l.address == *contract) {
        if let Some(ContractEvent::SubmitTransaction { index, .. }) = abi::decode_event(log)? {
            return Ok(index);
        }
    }
    Err(ContractError::Abi(format!(
        "no SubmitTransaction event in receipt {}",
        receipt.hash
    )))
}

#[async_trait]
impl MultisigContract for RpcMultisigContract {
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
        let hash = self.write(caller, abi::encode_submit(&to, value, data)).await?;
        debug!("submitTransaction {} sent, waiting for inclusion", hash);
        let receipt = self.included(hash).await?;
        let index = submitted_index(&self.address, &receipt)?;
        info!("Multisig {} proposal {} submitted in {}", self.address, index, hash);
        Ok(index)
    }

    async fn confirm_transaction(&self, caller: &Account, index: u64) -> Result<TxHash, ContractError> {
        self.write(caller, abi::encode_confirm(index)).await
    }

    async fn execute_transaction(&self, caller: &Account, index: u64) -> Result<TxHash, ContractError> {
        self.write(caller, abi::encode_execute(index)).await
    }

    async fn get_transaction(&self, index: u64) -> Result<ProposalRecord, ContractError> {
        let output = self
            .view("getTransaction", abi::encode_get_transaction(index))
            .await?;
        abi::decode_transaction(&output)
    }

    async fn transaction_count(&self) -> Result<u64, ContractError> {
        let output = self
            .view("getTransactionCount", abi::encode_get_transaction_count())
            .await?;
        abi::decode_u64(&output)
    }

    async fn is_owner(&self, who: &Address) -> Result<bool, ContractError> {
        let output = self.view("isOwner", abi::encode_is_owner(who)).await?;
        abi::decode_bool(&output)
    }

    async fn is_confirmed_by(&self, index: u64, who: &Address) -> Result<bool, ContractError> {
        let output = self
            .view("isConfirmed", abi::encode_is_confirmed(index, who))
            .await?;
        abi::decode_bool(&output)
    }

    async fn owner_at(&self, position: u64) -> Result<Option<Address>, ContractError> {
        // Reading past the end of a public array reverts
        match self.view("owners", abi::encode_owners(position)).await {
            Ok(output) => abi::decode_address(&output).map(Some),
            Err(ContractError::Ledger(crate::ledger::LedgerError::Chain(
                crate::ledger::ChainError::Reverted(_),
            ))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn required_confirmations(&self) -> Result<u64, ContractError> {
        let output = self
            .view("requiredConfirmations", abi::encode_required_confirmations())
            .await?;
        abi::decode_u64(&output)
    }
}

/// Connects to contracts through one shared builder
pub struct RpcConnector {
    builder: Arc<TransactionBuilder>,
    receipts: ReceiptPolicy,
}

impl RpcConnector {
    pub fn new(builder: Arc<TransactionBuilder>, receipts: ReceiptPolicy) -> Self {
        Self { builder, receipts }
    }
}

impl ContractConnector for RpcConnector {
    fn connect(&self, address: Address) -> Arc<dyn MultisigContract> {
        Arc::new(RpcMultisigContract::new(
            address,
            self.builder.clone(),
            self.receipts.clone(),
        ))
    }
}

/// Deploys the wallet contract from compiled bytecode
pub struct RpcWalletFactory {
    builder: Arc<TransactionBuilder>,
    bytecode: Option<Vec<u8>>,
    receipts: ReceiptPolicy,
}

impl RpcWalletFactory {
    /// `bytecode` is the compiled wallet contract; without it every
    /// deployment fails
    pub fn new(
        builder: Arc<TransactionBuilder>,
        bytecode: Option<Vec<u8>>,
        receipts: ReceiptPolicy,
    ) -> Self {
        Self {
            builder,
            bytecode,
            receipts,
        }
    }
}

#[async_trait]
impl WalletFactory for RpcWalletFactory {
    async fn deploy(
        &self,
        deployer: &Account,
        owners: &[Address],
        threshold: u64,
    ) -> Result<Address, ContractError> {
        let bytecode = self
            .bytecode
            .as_ref()
            .ok_or_else(|| ContractError::Abi("no multisig bytecode configured".to_string()))?;

        let mut init_code = bytecode.clone();
        init_code.extend_from_slice(&abi::encode_constructor(owners, threshold));

        let sent = self.builder.deploy_contract(deployer, init_code).await?;
        let receipt = wait_for_receipt(
            self.builder.ledger().as_ref(),
            &sent.hash,
            &self.receipts,
            self.builder.retry_policy(),
        )
        .await?
        .ok_or(ContractError::ReceiptTimeout(sent.hash))?;
        if !receipt.success {
            return Err(ContractError::ExecutionFailed(sent.hash));
        }

        let address = match (receipt.contract_address, sent.contract_address) {
            (Some(reported), Some(predicted)) if reported != predicted => {
                warn!(
                    "Deployed contract at {} but expected {}",
                    reported, predicted
                );
                reported
            }
            (Some(reported), _) => reported,
            (None, Some(predicted)) => predicted,
            (None, None) => {
                return Err(ContractError::Abi(format!(
                    "receipt {} has no contract address",
                    sent.hash
                )))
            }
        };
        info!("Deployed multisig {} in {}", address, sent.hash);
        Ok(address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::BuilderConfig;
    use crate::core::SignedTransaction;
    use crate::ledger::{InMemoryLedger, LogEntry, RetryPolicy, RpcLedger};
    use axum::extract::State;
    use axum::{routing::post, Json, Router};
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;

    fn receipt_with(logs: Vec<LogEntry>) -> TransactionReceipt {
        TransactionReceipt {
            hash: TxHash([7u8; 32]),
            success: true,
            contract_address: None,
            logs,
        }
    }

    #[test]
    fn test_index_from_submit_event() {
        let contract = Address::from([0x42; 20]);
        let other = Address::from([0x43; 20]);
        let event = ContractEvent::SubmitTransaction {
            index: 3,
            to: Address::ZERO,
            value: Wei::zero(),
            data: Vec::new(),
        };
        let spoofed = ContractEvent::SubmitTransaction {
            index: 99,
            to: Address::ZERO,
            value: Wei::zero(),
            data: Vec::new(),
        };
        let receipt = receipt_with(vec![
            abi::encode_event(other, &spoofed),
            abi::encode_event(contract, &event),
        ]);
        assert_eq!(submitted_index(&contract, &receipt).unwrap(), 3);
        assert!(submitted_index(&contract, &receipt_with(vec![])).is_err());
    }

    fn devnet_builder() -> (Arc<InMemoryLedger>, Arc<TransactionBuilder>) {
        let ledger = Arc::new(InMemoryLedger::default());
        let builder = Arc::new(TransactionBuilder::new(
            ledger.clone(),
            BuilderConfig {
                retry: RetryPolicy::none(),
                ..BuilderConfig::default()
            },
        ));
        (ledger, builder)
    }

    #[tokio::test]
    async fn test_deploy_without_bytecode_fails() {
        let (_ledger, builder) = devnet_builder();
        let factory = RpcWalletFactory::new(builder, None, ReceiptPolicy::default());
        let err = factory
            .deploy(&Account::generate(), &[Address::from([1; 20])], 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ContractError::Abi(_)));
    }

    #[tokio::test]
    async fn test_deploy_sends_creation_transaction() {
        let (ledger, builder) = devnet_builder();
        let deployer = Account::generate();
        ledger.fund(&deployer.address(), Wei::from(10_000_000_000u64));
        let factory = RpcWalletFactory::new(
            builder,
            Some(vec![0x60, 0x80]),
            ReceiptPolicy {
                poll_attempts: 1,
                poll_interval_ms: 0,
            },
        );

        let owners = [Address::from([1; 20]), Address::from([2; 20])];
        let address = factory.deploy(&deployer, &owners, 2).await.unwrap();

        assert_eq!(address, Address::contract_address(&deployer.address(), 0));
        let sent = &ledger.accepted_transactions()[0];
        assert_eq!(sent.intent().recipient, None);
        assert_eq!(&sent.intent().payload[..2], &[0x60, 0x80]);
        assert_eq!(sent.intent().payload.len(), 2 + 5 * 32);
    }

    #[tokio::test]
    async fn test_reads_surface_missing_code() {
        let (_ledger, builder) = devnet_builder();
        let contract = RpcMultisigContract::new(
            Address::from([9; 20]),
            builder,
            ReceiptPolicy::default(),
        );
        // The devnet has no EVM, so every view reverts
        assert!(contract.transaction_count().await.is_err());
        assert_eq!(contract.owner_at(0).await.unwrap(), None);
    }

    /// Node that records raw transactions and reports a fixed proposal
    /// index in every receipt
    struct FakeNode {
        contract: Address,
        sent: Mutex<Vec<SignedTransaction>>,
    }

    async fn answer(State(node): State<Arc<FakeNode>>, Json(request): Json<Value>) -> Json<Value> {
        let id = request["id"].clone();
        let params = &request["params"];
        let result = match request["method"].as_str().unwrap_or_default() {
            "eth_chainId" => json!("0x539"),
            "eth_gasPrice" => json!("0x1"),
            "eth_estimateGas" => json!("0x186a0"),
            "eth_getTransactionCount" => {
                json!(format!("0x{:x}", node.sent.lock().unwrap().len()))
            }
            "eth_sendRawTransaction" => {
                let body = params[0].as_str().unwrap().trim_start_matches("0x");
                let signed = SignedTransaction::decode(&hex::decode(body).unwrap()).unwrap();
                let hash = signed.hash();
                node.sent.lock().unwrap().push(signed);
                json!(hash.to_string())
            }
            "eth_getTransactionReceipt" => {
                let event = abi::encode_event(
                    node.contract,
                    &ContractEvent::SubmitTransaction {
                        index: 7,
                        to: Address::ZERO,
                        value: Wei::zero(),
                        data: Vec::new(),
                    },
                );
                let topics: Vec<String> = event
                    .topics
                    .iter()
                    .map(|t| format!("0x{}", hex::encode(t)))
                    .collect();
                json!({
                    "transactionHash": params[0],
                    "status": "0x1",
                    "contractAddress": null,
                    "logs": [{
                        "address": event.address.to_lower_hex(),
                        "topics": topics,
                        "data": format!("0x{}", hex::encode(&event.data)),
                    }]
                })
            }
            _ => {
                return Json(json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {"code": -32601, "message": "method not found"}
                }))
            }
        };
        Json(json!({"jsonrpc": "2.0", "id": id, "result": result}))
    }

    #[tokio::test]
    async fn test_writes_against_fake_node() {
        let contract = Address::from([0x42; 20]);
        let node = Arc::new(FakeNode {
            contract,
            sent: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/", post(answer))
            .with_state(node.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let ledger =
            RpcLedger::connect(&format!("http://{}/", addr), Duration::from_secs(5)).unwrap();
        let builder = Arc::new(TransactionBuilder::new(
            Arc::new(ledger),
            BuilderConfig {
                retry: RetryPolicy::none(),
                ..BuilderConfig::default()
            },
        ));
        let wallet = RpcMultisigContract::new(
            contract,
            builder,
            ReceiptPolicy {
                poll_attempts: 1,
                poll_interval_ms: 0,
            },
        );
        let owner = Account::generate();
        let to = Address::from([0x11; 20]);
        let value = Wei::from(5u64);

        let index = wallet
            .submit_transaction(&owner, to, &value, &[0xab])
            .await
            .unwrap();
        assert_eq!(index, 7);
        let confirmed = wallet.confirm_transaction(&owner, index).await.unwrap();
        let executed = wallet.execute_transaction(&owner, index).await.unwrap();

        let sent = node.sent.lock().unwrap();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[1].hash(), confirmed);
        assert_eq!(sent[2].hash(), executed);

        let payloads = [
            abi::encode_submit(&to, &value, &[0xab]),
            abi::encode_confirm(7),
            abi::encode_execute(7),
        ];
        for (nonce, (tx, payload)) in sent.iter().zip(payloads).enumerate() {
            let intent = tx.intent();
            assert_eq!(intent.sender, owner.address());
            assert_eq!(intent.recipient, Some(contract));
            assert_eq!(intent.sequence_number, nonce as u64);
            assert_eq!(intent.payload, payload);
            assert_eq!(intent.network_id, 1337);
            assert_eq!(intent.fee_limit, 100_000);
        }
    }
}
