//! REST API handlers for wallet and multisig operations

use crate::builder::TransactionBuilder;
use crate::core::{to_display_units, Address};
use crate::error::ErrorKind;
use crate::multisig::{MultisigCoordinator, MultisigTransaction, MultisigWallet, SubmitOutcome};
use crate::wallet::{Account, WalletKey};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Shared application state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub builder: Arc<TransactionBuilder>,
    pub coordinator: Arc<MultisigCoordinator>,
    /// Signs wallet deployments; loaded from the environment at startup
    pub deployer: Option<Arc<Account>>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TxHashResponse {
    pub tx_hash: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployResponse {
    pub contract_address: String,
    pub owners: Vec<String>,
    pub required_confirmations: u64,
}

#[derive(Serialize)]
pub struct ApiError {
    pub error: String,
    pub kind: Option<ErrorKind>,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Authorization => StatusCode::FORBIDDEN,
        ErrorKind::Chain => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Network => StatusCode::BAD_GATEWAY,
    }
}

fn reject(kind: ErrorKind, error: impl fmt::Display) -> (StatusCode, Json<ApiError>) {
    let status = status_for(kind);
    if status.is_server_error() {
        warn!("{}: {}", kind, error);
    }
    (
        status,
        Json(ApiError {
            error: error.to_string(),
            kind: Some(kind),
        }),
    )
}

fn parse_address(field: &str, value: &str) -> Result<Address, (StatusCode, Json<ApiError>)> {
    value
        .parse()
        .map_err(|e| reject(ErrorKind::Validation, format!("{}: {}", field, e)))
}

fn signing_account(private_key: &str) -> Result<Account, (StatusCode, Json<ApiError>)> {
    Account::from_private_key(private_key).map_err(|e| reject(e.kind(), e))
}

async fn load_wallet(
    state: &ApiState,
    address: &str,
) -> Result<MultisigWallet, (StatusCode, Json<ApiError>)> {
    let address = parse_address("contractAddress", address)?;
    state
        .coordinator
        .load_wallet(address)
        .await
        .map_err(|e| reject(e.kind(), e))
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub private_key: String,
    pub to_address: String,
    pub amount: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployMultisigRequest {
    pub owners: Vec<String>,
    pub required_confirmations: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitRequest {
    pub contract_address: String,
    pub to: String,
    /// Display units
    pub value: String,
    pub sender_private_key: String,
    /// Hex call data, optional
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalActionRequest {
    pub contract_address: String,
    pub index: u64,
    pub sender_private_key: String,
}

// ============================================================================
// General Handlers
// ============================================================================

/// GET / - Welcome text
pub async fn root() -> &'static str {
    "Multisig wallet service. See /health, /wallet/* and /wallet/multisig/*."
}

/// GET /health - Health check
pub async fn health_check() -> &'static str {
    "OK"
}

// ============================================================================
// Wallet Handlers
// ============================================================================

/// POST /wallet/create - Generate a new key pair
pub async fn create_wallet() -> ApiResult<WalletKey> {
    let account = Account::generate();
    let key = account.export_key().ok_or_else(|| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError {
                error: "Generated account has no key".to_string(),
                kind: None,
            }),
        )
    })?;
    Ok(Json(key))
}

/// GET /wallet/balance/{address} - Balance in display units
pub async fn get_balance(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<BalanceResponse> {
    let address = parse_address("address", &address)?;
    let balance = state
        .builder
        .balance_of(&address)
        .await
        .map_err(|e| reject(e.kind(), e))?;

    Ok(Json(BalanceResponse {
        address: address.to_checksum(),
        balance: to_display_units(&balance),
    }))
}

/// POST /wallet/transfer - Sign and broadcast a value transfer
pub async fn transfer(
    State(state): State<ApiState>,
    Json(req): Json<TransferRequest>,
) -> ApiResult<TxHashResponse> {
    let from = signing_account(&req.private_key)?;
    let to = parse_address("toAddress", &req.to_address)?;

    let sent = state
        .builder
        .transfer(&from, to, &req.amount)
        .await
        .map_err(|e| reject(e.kind(), e))?;

    Ok(Json(TxHashResponse {
        tx_hash: sent.hash.to_string(),
    }))
}

// ============================================================================
// Multisig Handlers
// ============================================================================

/// POST /wallet/multisig/deploy - Deploy a new M-of-N wallet
pub async fn deploy_multisig(
    State(state): State<ApiState>,
    Json(req): Json<DeployMultisigRequest>,
) -> ApiResult<DeployResponse> {
    let owners = req
        .owners
        .iter()
        .map(|o| parse_address("owners", o))
        .collect::<Result<Vec<_>, _>>()?;

    let deployer = state.deployer.as_ref().ok_or_else(|| {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiError {
                error: "No deployer key configured".to_string(),
                kind: None,
            }),
        )
    })?;

    let wallet = state
        .coordinator
        .deploy(deployer, owners, req.required_confirmations)
        .await
        .map_err(|e| reject(e.kind(), e))?;

    Ok(Json(DeployResponse {
        contract_address: wallet.address.to_checksum(),
        owners: wallet.owners().iter().map(|o| o.to_checksum()).collect(),
        required_confirmations: wallet.threshold(),
    }))
}

/// GET /wallet/multisig/{address} - Owners and threshold read from the contract
pub async fn get_multisig(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<MultisigWallet> {
    Ok(Json(load_wallet(&state, &address).await?))
}

/// POST /wallet/multisig/submit - Propose a transaction
pub async fn submit_multisig(
    State(state): State<ApiState>,
    Json(req): Json<SubmitRequest>,
) -> ApiResult<SubmitOutcome> {
    let caller = signing_account(&req.sender_private_key)?;
    let payload = match req.data.as_deref().map(str::trim) {
        None | Some("") | Some("0x") => Vec::new(),
        Some(data) => hex::decode(data.strip_prefix("0x").unwrap_or(data))
            .map_err(|e| reject(ErrorKind::Validation, format!("data: {}", e)))?,
    };
    let wallet = load_wallet(&state, &req.contract_address).await?;

    let outcome = state
        .coordinator
        .submit_display(&wallet, &caller, &req.to, &req.value, payload)
        .await
        .map_err(|e| reject(e.kind(), e))?;
    Ok(Json(outcome))
}

/// POST /wallet/multisig/confirm - Confirm a pending proposal
pub async fn confirm_multisig(
    State(state): State<ApiState>,
    Json(req): Json<ProposalActionRequest>,
) -> ApiResult<TxHashResponse> {
    let caller = signing_account(&req.sender_private_key)?;
    let wallet = load_wallet(&state, &req.contract_address).await?;

    let hash = state
        .coordinator
        .confirm(&wallet, req.index, &caller)
        .await
        .map_err(|e| reject(e.kind(), e))?;
    Ok(Json(TxHashResponse {
        tx_hash: hash.to_string(),
    }))
}

/// POST /wallet/multisig/execute - Execute a proposal that reached quorum
pub async fn execute_multisig(
    State(state): State<ApiState>,
    Json(req): Json<ProposalActionRequest>,
) -> ApiResult<TxHashResponse> {
    let caller = signing_account(&req.sender_private_key)?;
    let wallet = load_wallet(&state, &req.contract_address).await?;

    let hash = state
        .coordinator
        .execute(&wallet, req.index, &caller)
        .await
        .map_err(|e| reject(e.kind(), e))?;
    Ok(Json(TxHashResponse {
        tx_hash: hash.to_string(),
    }))
}

/// GET /wallet/multisig/{address}/transactions - Pending proposals
pub async fn list_pending(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<Vec<MultisigTransaction>> {
    let wallet = load_wallet(&state, &address).await?;
    let pending = state
        .coordinator
        .list_pending(&wallet)
        .await
        .map_err(|e| reject(e.kind(), e))?;
    Ok(Json(pending))
}

/// GET /wallet/multisig/{address}/transactions/{index} - Proposal status
pub async fn get_multisig_transaction(
    State(state): State<ApiState>,
    Path((address, index)): Path<(String, u64)>,
) -> ApiResult<MultisigTransaction> {
    let wallet = load_wallet(&state, &address).await?;
    let status = state
        .coordinator
        .status(&wallet, index)
        .await
        .map_err(|e| reject(e.kind(), e))?;
    Ok(Json(status))
}
