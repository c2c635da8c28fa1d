//! CLI commands for the wallet service
//!
//! Implements all command handlers for the CLI interface. Signing keys
//! come from the environment, never from arguments, so they stay out of
//! shell history and process listings.

use crate::api::{create_router, ApiState};
use crate::builder::TransactionBuilder;
use crate::config::{self, Config};
use crate::core::{to_display_units, Address};
use crate::ledger::{InMemoryLedger, LedgerClient, RpcLedger};
use crate::multisig::{
    ContractConnector, InMemoryMultisigHost, MultisigCoordinator, MultisigTransaction,
    RpcConnector, RpcWalletFactory, WalletFactory,
};
use crate::wallet::Account;
use log::{info, warn};
use std::sync::Arc;

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Environment variable holding the signing key for transfers and
/// multisig actions
pub const SENDER_KEY_ENV: &str = "MULTISIG_SENDER_KEY";

/// Everything a command needs, wired from configuration
pub struct AppContext {
    pub config: Config,
    pub builder: Arc<TransactionBuilder>,
    pub coordinator: Arc<MultisigCoordinator>,
    pub deployer: Option<Arc<Account>>,
    /// Set when running against the in-memory devnet
    pub devnet: Option<Arc<InMemoryLedger>>,
}

impl AppContext {
    /// Connect to the configured ledger, or start a devnet when no
    /// endpoint is configured
    pub fn from_config(config: Config) -> CliResult<Self> {
        let deployer = config::deployer_from_env()?;

        match &config.rpc_url {
            Some(url) => {
                let rpc = RpcLedger::connect(url, config.request_timeout())?;
                // The path may carry an API key
                info!(
                    "Using ledger at {}://{}",
                    rpc.endpoint().scheme(),
                    rpc.endpoint().host_str().unwrap_or("")
                );
                let ledger: Arc<dyn LedgerClient> = Arc::new(rpc);
                let builder = Arc::new(TransactionBuilder::new(ledger, config.builder_config()));
                let connector: Arc<dyn ContractConnector> =
                    Arc::new(RpcConnector::new(builder.clone(), config.receipts.clone()));
                let factory: Arc<dyn WalletFactory> = Arc::new(RpcWalletFactory::new(
                    builder.clone(),
                    config.load_bytecode()?,
                    config.receipts.clone(),
                ));
                let coordinator = Arc::new(MultisigCoordinator::new(
                    connector,
                    factory,
                    config.retry.clone(),
                ));

                Ok(Self {
                    builder,
                    coordinator,
                    deployer: deployer.map(Arc::new),
                    devnet: None,
                    config,
                })
            }
            None => {
                let ledger = Arc::new(
                    InMemoryLedger::new(config.devnet.chain_id)
                        .with_min_fee_price(config.devnet.min_fee_price.clone()),
                );
                for (address, balance) in config.devnet_balances()? {
                    ledger.fund(&address, balance);
                }
                let host = InMemoryMultisigHost::new(ledger.clone());
                let builder = Arc::new(TransactionBuilder::new(
                    ledger.clone(),
                    config.builder_config(),
                ));
                let coordinator = Arc::new(MultisigCoordinator::new(
                    Arc::new(host.clone()),
                    Arc::new(host),
                    config.retry.clone(),
                ));
                // Devnet deployments cost nothing, so a throwaway deployer is enough
                let deployer =
                    deployer.unwrap_or_else(|| Account::generate().with_label("devnet-deployer"));
                info!(
                    "Using in-memory devnet (chain id {}), deployer {}",
                    ledger.chain_id(),
                    deployer.address()
                );

                Ok(Self {
                    builder,
                    coordinator,
                    deployer: Some(Arc::new(deployer)),
                    devnet: Some(ledger),
                    config,
                })
            }
        }
    }

    pub fn api_state(&self) -> ApiState {
        ApiState {
            builder: self.builder.clone(),
            coordinator: self.coordinator.clone(),
            deployer: self.deployer.clone(),
        }
    }

    fn deployer(&self) -> CliResult<&Account> {
        self.deployer
            .as_deref()
            .ok_or_else(|| format!("set {} to deploy wallets", config::DEPLOYER_KEY_ENV).into())
    }
}

/// Signing account from [`SENDER_KEY_ENV`]
pub fn sender_from_env() -> CliResult<Account> {
    let key = std::env::var(SENDER_KEY_ENV)
        .map_err(|_| format!("set {} to the sender's private key", SENDER_KEY_ENV))?;
    Account::from_private_key(&key)
        .map_err(|_| format!("{} does not hold a valid private key", SENDER_KEY_ENV).into())
}

/// Split a comma-separated owner list
pub fn parse_owners(list: &str) -> CliResult<Vec<Address>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Address>().map_err(Into::into))
        .collect()
}

/// Decode optional hex call data
pub fn parse_payload(data: Option<&str>) -> CliResult<Vec<u8>> {
    match data.map(str::trim) {
        None | Some("") | Some("0x") => Ok(Vec::new()),
        Some(hex_data) => Ok(hex::decode(hex_data.strip_prefix("0x").unwrap_or(hex_data))?),
    }
}

// ============================================================================
// Accounts and transfers
// ============================================================================

/// Generate a key pair and print it once
pub fn cmd_wallet_new(label: Option<&str>) -> CliResult<()> {
    let mut account = Account::generate();
    if let Some(label) = label {
        account = account.with_label(label);
    }
    let key = account
        .export_key()
        .ok_or("generated account has no signing key")?;

    println!("🔐 New wallet created!");
    println!("   📍 Address: {}", key.address);
    println!("   🔑 Public Key: {}...", &key.public_key[..32]);
    if let Some(l) = &account.label {
        println!("   🏷️  Label: {}", l);
    }
    println!("   🗝️  Private Key: {}", key.private_key);
    println!("\n   ⚠️  IMPORTANT: The private key is shown only once and is not stored.");
    println!("   Keep it somewhere safe to avoid losing access to your funds!");

    Ok(())
}

/// Show the balance of an address
pub async fn cmd_balance(ctx: &AppContext, address: &str) -> CliResult<()> {
    let address: Address = address.parse()?;
    let balance = ctx.builder.balance_of(&address).await?;

    println!("💰 Balance of {}", address);
    println!("   {} ETH ({} wei)", to_display_units(&balance), balance);

    Ok(())
}

/// Sign and broadcast a transfer from the sender in the environment
pub async fn cmd_transfer(ctx: &AppContext, to: &str, amount: &str) -> CliResult<()> {
    let from = sender_from_env()?;
    let to: Address = to.parse()?;

    let sent = ctx.builder.transfer(&from, to, amount).await?;

    println!("📤 Transaction broadcast:");
    println!("   Hash: {}", sent.hash);
    println!("   From: {}", sent.sender);
    println!("   To: {}", to);
    println!("   Amount: {}", amount);
    println!("   Sequence number: {}", sent.sequence_number);

    Ok(())
}

/// Run the HTTP API until Ctrl+C
pub async fn cmd_serve(ctx: &AppContext, port: u16) -> CliResult<()> {
    let app = create_router(ctx.api_state());
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("🚀 Multisig wallet API listening on http://{}", addr);
    if ctx.devnet.is_some() {
        println!("   ⚙️  Backed by the in-memory devnet; state is lost on exit");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Cannot listen for Ctrl+C: {}", e);
            }
            println!("\n📴 Shutting down...");
        })
        .await?;

    Ok(())
}

// ============================================================================
// Multisig
// ============================================================================

/// Deploy a wallet owned by `owners` (comma separated)
pub async fn cmd_multisig_deploy(ctx: &AppContext, owners: &str, threshold: u64) -> CliResult<()> {
    let owners = parse_owners(owners)?;
    let wallet = ctx
        .coordinator
        .deploy(ctx.deployer()?, owners, threshold)
        .await?;

    println!("🏦 Multisig wallet deployed!");
    println!("   📍 Address: {}", wallet.address);
    println!("   🔒 Policy: {}", wallet.description());
    for owner in wallet.owners() {
        println!("   👤 {}", owner);
    }

    Ok(())
}

/// Propose a transaction from the wallet at `wallet`
pub async fn cmd_multisig_submit(
    ctx: &AppContext,
    wallet: &str,
    to: &str,
    amount: &str,
    data: Option<&str>,
) -> CliResult<()> {
    let caller = sender_from_env()?;
    let payload = parse_payload(data)?;
    let wallet = ctx.coordinator.load_wallet(wallet.parse()?).await?;

    let outcome = ctx
        .coordinator
        .submit_display(&wallet, &caller, to, amount, payload)
        .await?;

    if outcome.deduplicated {
        println!("♻️  Identical proposal already pending as #{}", outcome.index);
    } else {
        println!("📝 Proposal #{} submitted to {}", outcome.index, wallet.address);
    }

    Ok(())
}

/// Confirm proposal `index`
pub async fn cmd_multisig_confirm(ctx: &AppContext, wallet: &str, index: u64) -> CliResult<()> {
    let caller = sender_from_env()?;
    let wallet = ctx.coordinator.load_wallet(wallet.parse()?).await?;

    let hash = ctx.coordinator.confirm(&wallet, index, &caller).await?;
    println!("✍️  Confirmed proposal #{} in {}", index, hash);

    Ok(())
}

/// Execute proposal `index`
pub async fn cmd_multisig_execute(ctx: &AppContext, wallet: &str, index: u64) -> CliResult<()> {
    let caller = sender_from_env()?;
    let wallet = ctx.coordinator.load_wallet(wallet.parse()?).await?;

    let hash = ctx.coordinator.execute(&wallet, index, &caller).await?;
    println!("✅ Executed proposal #{} in {}", index, hash);

    Ok(())
}

/// Show one proposal
pub async fn cmd_multisig_status(ctx: &AppContext, wallet: &str, index: u64) -> CliResult<()> {
    let wallet = ctx.coordinator.load_wallet(wallet.parse()?).await?;
    let tx = ctx.coordinator.status(&wallet, index).await?;
    print_proposal(&tx);
    Ok(())
}

/// List proposals that are not yet executed
pub async fn cmd_multisig_pending(ctx: &AppContext, wallet: &str) -> CliResult<()> {
    let wallet = ctx.coordinator.load_wallet(wallet.parse()?).await?;
    let pending = ctx.coordinator.list_pending(&wallet).await?;

    if pending.is_empty() {
        println!("📭 No pending proposals on {}", wallet.address);
        return Ok(());
    }

    println!("📋 Pending proposals on {} ({}):", wallet.address, wallet.description());
    for tx in &pending {
        print_proposal(tx);
    }

    Ok(())
}

fn print_proposal(tx: &MultisigTransaction) {
    println!("📄 Proposal #{}", tx.index);
    println!("   ├─ To: {}", tx.to);
    println!("   ├─ Value: {}", tx.value_display);
    if !tx.data.is_empty() {
        println!("   ├─ Data: 0x{}", hex::encode(&tx.data));
    }
    println!(
        "   ├─ Confirmations: {}/{}",
        tx.confirmations, tx.threshold
    );
    println!("   └─ State: {:?} ({})", tx.state, proposal_hint(tx));
}

/// What an owner can do next with `tx`
fn proposal_hint(tx: &MultisigTransaction) -> String {
    if !tx.is_pending() {
        "nothing left to do".to_string()
    } else if tx.can_execute() {
        "ready to execute".to_string()
    } else {
        match tx.missing_confirmations() {
            1 => "needs 1 more confirmation".to_string(),
            n => format!("needs {} more confirmations", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DevnetAccount;
    use crate::core::to_base_units;

    #[test]
    fn test_parse_owners() {
        let a = Account::generate().address();
        let b = Account::generate().address();
        let owners = parse_owners(&format!("{}, {},", a, b.to_lower_hex())).unwrap();
        assert_eq!(owners, vec![a, b]);
        assert!(parse_owners("0xnope").is_err());
    }

    #[test]
    fn test_proposal_hint() {
        use crate::multisig::ProposalRecord;

        let record = |confirmations, executed| ProposalRecord {
            to: Address::ZERO,
            value: to_base_units("1").unwrap(),
            data: vec![],
            executed,
            confirmations,
        };
        let hint = |confirmations, executed| {
            proposal_hint(&MultisigTransaction::observe(
                0,
                record(confirmations, executed),
                3,
                vec![],
            ))
        };
        assert_eq!(hint(0, false), "needs 3 more confirmations");
        assert_eq!(hint(2, false), "needs 1 more confirmation");
        assert_eq!(hint(3, false), "ready to execute");
        assert_eq!(hint(3, true), "nothing left to do");
    }

    #[test]
    fn test_parse_payload() {
        assert!(parse_payload(None).unwrap().is_empty());
        assert!(parse_payload(Some("0x")).unwrap().is_empty());
        assert_eq!(parse_payload(Some("0xdeadbeef")).unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert!(parse_payload(Some("0xabc")).is_err());
    }

    #[tokio::test]
    async fn test_devnet_context_funds_accounts() {
        let funded = Account::generate().address();
        let config = Config {
            devnet: crate::config::DevnetConfig {
                accounts: vec![DevnetAccount {
                    address: funded,
                    balance: "42".to_string(),
                }],
                ..Default::default()
            },
            ..Config::default()
        };

        let ctx = AppContext::from_config(config).unwrap();
        assert!(ctx.devnet.is_some());
        assert!(ctx.deployer.is_some());
        assert_eq!(
            ctx.builder.balance_of(&funded).await.unwrap(),
            to_base_units("42").unwrap()
        );
    }

    #[tokio::test]
    async fn test_devnet_deploy_command() {
        let ctx = AppContext::from_config(Config::default()).unwrap();
        let owners = format!(
            "{},{}",
            Account::generate().address(),
            Account::generate().address()
        );
        cmd_multisig_deploy(&ctx, &owners, 2).await.unwrap();
        assert!(cmd_multisig_deploy(&ctx, &owners, 3).await.is_err());
    }

    #[test]
    fn test_rpc_context_does_not_touch_network() {
        let config = Config {
            rpc_url: Some("http://127.0.0.1:1".to_string()),
            ..Config::default()
        };
        let ctx = AppContext::from_config(config).unwrap();
        assert!(ctx.devnet.is_none());
    }
}
