//! JSON-RPC ledger adapter
//!
//! Talks to an Ethereum-compatible node over HTTP. Node-side rejections
//! are classified into [`ChainError`]; transport failures become
//! [`LedgerError::Network`] so the read path can retry them.

use super::client::{
    CallRequest, ChainError, LedgerClient, LedgerError, LogEntry, TransactionReceipt,
};
use crate::core::{Address, TxHash, Wei};
use async_trait::async_trait;
use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    transaction_hash: String,
    status: Option<String>,
    contract_address: Option<String>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Debug, Deserialize)]
struct RpcLog {
    address: String,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    data: String,
}

/// Ledger client backed by a JSON-RPC endpoint
#[derive(Debug)]
pub struct RpcLedger {
    http: reqwest::Client,
    endpoint: Url,
    next_id: AtomicU64,
}

impl RpcLedger {
    /// Build a client for `endpoint`. No request is made until first use.
    pub fn connect(endpoint: &str, timeout: Duration) -> Result<Self, LedgerError> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| LedgerError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(LedgerError::InvalidEndpoint(format!(
                "unsupported scheme '{}'",
                endpoint.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LedgerError::Network(e.to_string()))?;

        Ok(Self {
            http,
            endpoint,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn rpc_request(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        trace!("-> {} {}", method, request.params);

        let response = self
            .http
            .post(self.endpoint.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| LedgerError::Network(format!("{}: {}", method, e)))?;

        if !response.status().is_success() {
            return Err(LedgerError::Network(format!(
                "{}: HTTP {}",
                method,
                response.status()
            )));
        }

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| LedgerError::InvalidResponse(format!("{}: {}", method, e)))?;

        if let Some(error) = body.error {
            debug!("{} rejected ({}): {}", method, error.code, error.message);
            return Err(ChainError::from_message(&error.message).into());
        }

        Ok(body.result.unwrap_or(Value::Null))
    }

    async fn quantity_u64(&self, method: &str, params: Value) -> Result<u64, LedgerError> {
        let value = self.rpc_request(method, params).await?;
        parse_u64_quantity(&value)
            .ok_or_else(|| LedgerError::InvalidResponse(format!("{}: bad quantity {}", method, value)))
    }
}

fn call_object(call: &CallRequest) -> Value {
    let mut object = serde_json::Map::new();
    if let Some(from) = &call.from {
        object.insert("from".into(), json!(from.to_lower_hex()));
    }
    if let Some(to) = &call.to {
        object.insert("to".into(), json!(to.to_lower_hex()));
    }
    if !call.value.is_zero() {
        object.insert("value".into(), json!(call.value.to_hex_quantity()));
    }
    object.insert("data".into(), json!(format!("0x{}", hex::encode(&call.data))));
    Value::Object(object)
}

fn parse_u64_quantity(value: &Value) -> Option<u64> {
    let body = value.as_str()?.strip_prefix("0x")?;
    if body.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(body, 16).ok()
}

fn parse_hex_bytes(value: &str) -> Option<Vec<u8>> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value)).ok()
}

fn parse_receipt(raw: RpcReceipt) -> Result<TransactionReceipt, LedgerError> {
    let bad = |what: &str| LedgerError::InvalidResponse(format!("receipt: bad {}", what));

    let hash = TxHash::from_hex(&raw.transaction_hash).ok_or_else(|| bad("hash"))?;
    // Pre-Byzantium receipts carry no status; treat them as successful
    let success = raw.status.as_deref().map(|s| s == "0x1").unwrap_or(true);
    let contract_address = match raw.contract_address {
        Some(a) => Some(a.parse::<Address>().map_err(|_| bad("contractAddress"))?),
        None => None,
    };

    let mut logs = Vec::with_capacity(raw.logs.len());
    for log in raw.logs {
        let address = log.address.parse::<Address>().map_err(|_| bad("log address"))?;
        let mut topics = Vec::with_capacity(log.topics.len());
        for topic in &log.topics {
            let bytes = parse_hex_bytes(topic).ok_or_else(|| bad("topic"))?;
            let topic: [u8; 32] = bytes.as_slice().try_into().map_err(|_| bad("topic"))?;
            topics.push(topic);
        }
        let data = parse_hex_bytes(&log.data).ok_or_else(|| bad("log data"))?;
        logs.push(LogEntry {
            address,
            topics,
            data,
        });
    }

    Ok(TransactionReceipt {
        hash,
        success,
        contract_address,
        logs,
    })
}

#[async_trait]
impl LedgerClient for RpcLedger {
    async fn balance_of(&self, address: &Address) -> Result<Wei, LedgerError> {
        let value = self
            .rpc_request("eth_getBalance", json!([address.to_lower_hex(), "latest"]))
            .await?;
        value
            .as_str()
            .and_then(Wei::from_hex_quantity)
            .ok_or_else(|| LedgerError::InvalidResponse(format!("eth_getBalance: {}", value)))
    }

    async fn next_sequence_number(&self, address: &Address) -> Result<u64, LedgerError> {
        self.quantity_u64(
            "eth_getTransactionCount",
            json!([address.to_lower_hex(), "pending"]),
        )
        .await
    }

    async fn suggested_fee_price(&self) -> Result<Wei, LedgerError> {
        let value = self.rpc_request("eth_gasPrice", json!([])).await?;
        value
            .as_str()
            .and_then(Wei::from_hex_quantity)
            .ok_or_else(|| LedgerError::InvalidResponse(format!("eth_gasPrice: {}", value)))
    }

    async fn network_id(&self) -> Result<u64, LedgerError> {
        self.quantity_u64("eth_chainId", json!([])).await
    }

    async fn broadcast(&self, raw: &[u8]) -> Result<TxHash, LedgerError> {
        let value = self
            .rpc_request(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw))]),
            )
            .await?;
        value
            .as_str()
            .and_then(TxHash::from_hex)
            .ok_or_else(|| LedgerError::InvalidResponse(format!("eth_sendRawTransaction: {}", value)))
    }

    async fn estimate_fee_limit(&self, call: &CallRequest) -> Result<u64, LedgerError> {
        self.quantity_u64("eth_estimateGas", json!([call_object(call)]))
            .await
    }

    async fn call(&self, call: &CallRequest) -> Result<Vec<u8>, LedgerError> {
        let value = self
            .rpc_request("eth_call", json!([call_object(call), "latest"]))
            .await?;
        value
            .as_str()
            .and_then(parse_hex_bytes)
            .ok_or_else(|| LedgerError::InvalidResponse(format!("eth_call: {}", value)))
    }

    async fn receipt(&self, hash: &TxHash) -> Result<Option<TransactionReceipt>, LedgerError> {
        let value = self
            .rpc_request("eth_getTransactionReceipt", json!([hash.to_string()]))
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        let raw: RpcReceipt = serde_json::from_value(value)
            .map_err(|e| LedgerError::InvalidResponse(format!("receipt: {}", e)))?;
        parse_receipt(raw).map(Some)
    }
}
