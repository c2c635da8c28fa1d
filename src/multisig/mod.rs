//! Multi-signature wallets
//!
//! M-of-N wallets backed by an on-ledger contract: owners submit
//! proposals, confirm them, and any owner executes once the contract
//! reports enough confirmations.
//!
//! # Example
//!
//! ```ignore
//! use multisig_wallet::multisig::MultisigCoordinator;
//!
//! // Deploy a 2-of-3 wallet
//! let wallet = coordinator.deploy(&deployer, vec![a, b, c], 2).await?;
//!
//! // Propose, collect a second confirmation, execute
//! let outcome = coordinator.submit_display(&wallet, &alice, &to, "1.5", vec![]).await?;
//! coordinator.confirm(&wallet, outcome.index, &bob).await?;
//! coordinator.execute(&wallet, outcome.index, &bob).await?;
//! ```

pub mod abi;
pub mod contract;
pub mod coordinator;
pub mod memory;
pub mod rpc;
pub mod transaction;
pub mod wallet;

pub use contract::{
    ContractConnector, ContractError, ContractEvent, MultisigContract, ProposalRecord,
    WalletFactory,
};
pub use coordinator::{MultisigCoordinator, SubmitOutcome};
pub use memory::{InMemoryMultisig, InMemoryMultisigHost};
pub use rpc::{RpcConnector, RpcMultisigContract, RpcWalletFactory};
pub use transaction::{MultisigTransaction, ProposalState};
pub use wallet::{MultisigConfig, MultisigError, MultisigWallet};
