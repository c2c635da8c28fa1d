//! Multisig Wallet CLI Application
//!
//! Sends transfers and drives multisig wallets from the command line, or
//! serves the same operations over HTTP.

use clap::{Parser, Subcommand};
use multisig_wallet::cli::{self, AppContext};
use multisig_wallet::config::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "multisig-wallet")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "Transaction signing and multisig coordination for account-based ledgers", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "MULTISIG_CONFIG")]
    config: Option<PathBuf>,

    /// JSON-RPC endpoint; without one an in-memory devnet is used
    #[arg(long, env = "MULTISIG_RPC_URL")]
    rpc_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Port to listen on (defaults to the configured port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Key management
    Wallet {
        #[command(subcommand)]
        action: WalletCommands,
    },

    /// Show the balance of an address
    Balance {
        /// Address to query
        address: String,
    },

    /// Send value from the account in MULTISIG_SENDER_KEY
    Transfer {
        /// Recipient address
        #[arg(short, long)]
        to: String,

        /// Amount in display units, e.g. 1.5
        #[arg(short, long)]
        amount: String,
    },

    /// Multisig wallet operations
    Multisig {
        #[command(subcommand)]
        action: MultisigCommands,
    },
}

#[derive(Subcommand)]
enum WalletCommands {
    /// Generate a new key pair
    New {
        /// Optional label for the wallet
        #[arg(short, long)]
        label: Option<String>,
    },
}

#[derive(Subcommand)]
enum MultisigCommands {
    /// Deploy a wallet (signed with MULTISIG_DEPLOYER_KEY)
    Deploy {
        /// Comma-separated owner addresses
        #[arg(short, long)]
        owners: String,

        /// Confirmations required to execute
        #[arg(short, long)]
        threshold: u64,
    },

    /// Propose a transaction
    Submit {
        /// Wallet contract address
        #[arg(short, long)]
        wallet: String,

        /// Recipient address
        #[arg(short, long)]
        to: String,

        /// Amount in display units
        #[arg(short, long)]
        amount: String,

        /// Hex call data
        #[arg(short, long)]
        data: Option<String>,
    },

    /// Confirm a proposal
    Confirm {
        #[arg(short, long)]
        wallet: String,

        #[arg(short, long)]
        index: u64,
    },

    /// Execute a proposal that reached quorum
    Execute {
        #[arg(short, long)]
        wallet: String,

        #[arg(short, long)]
        index: u64,
    },

    /// Show one proposal
    Status {
        #[arg(short, long)]
        wallet: String,

        #[arg(short, long)]
        index: u64,
    },

    /// List proposals that are not yet executed
    Pending {
        #[arg(short, long)]
        wallet: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Key generation needs neither configuration nor a ledger
    if let Commands::Wallet {
        action: WalletCommands::New { label },
    } = &cli.command
    {
        return cli::cmd_wallet_new(label.as_deref());
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if cli.rpc_url.is_some() {
        config.rpc_url = cli.rpc_url.clone();
        config.validate()?;
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let ctx = AppContext::from_config(config)?;

        match cli.command {
            Commands::Wallet { .. } => unreachable!(),

            Commands::Serve { port } => {
                let port = port.unwrap_or(ctx.config.listen_port);
                cli::cmd_serve(&ctx, port).await?;
            }

            Commands::Balance { address } => {
                cli::cmd_balance(&ctx, &address).await?;
            }

            Commands::Transfer { to, amount } => {
                cli::cmd_transfer(&ctx, &to, &amount).await?;
            }

            Commands::Multisig { action } => match action {
                MultisigCommands::Deploy { owners, threshold } => {
                    cli::cmd_multisig_deploy(&ctx, &owners, threshold).await?;
                }
                MultisigCommands::Submit {
                    wallet,
                    to,
                    amount,
                    data,
                } => {
                    cli::cmd_multisig_submit(&ctx, &wallet, &to, &amount, data.as_deref()).await?;
                }
                MultisigCommands::Confirm { wallet, index } => {
                    cli::cmd_multisig_confirm(&ctx, &wallet, index).await?;
                }
                MultisigCommands::Execute { wallet, index } => {
                    cli::cmd_multisig_execute(&ctx, &wallet, index).await?;
                }
                MultisigCommands::Status { wallet, index } => {
                    cli::cmd_multisig_status(&ctx, &wallet, index).await?;
                }
                MultisigCommands::Pending { wallet } => {
                    cli::cmd_multisig_pending(&ctx, &wallet).await?;
                }
            },
        }

        Ok::<(), Box<dyn std::error::Error>>(())
    })
}
