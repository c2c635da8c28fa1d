//! REST API module
//!
//! JSON over HTTP for account and multisig operations. Every failure is
//! returned as `{"error": ..., "kind": ...}` with a status derived from
//! the error's kind.
//!
//! # Endpoints
//!
//! ## Accounts
//! - `POST /wallet/create` - Generate a key pair
//! - `GET /wallet/balance/{address}` - Balance in display units
//! - `POST /wallet/transfer` - Sign and broadcast a transfer
//!
//! ## Multisig
//! - `POST /wallet/multisig/deploy` - Deploy an M-of-N wallet
//! - `POST /wallet/multisig/submit` - Propose a transaction
//! - `POST /wallet/multisig/confirm` - Confirm a proposal
//! - `POST /wallet/multisig/execute` - Execute a proposal with quorum
//! - `GET /wallet/multisig/{address}` - Owners and threshold
//! - `GET /wallet/multisig/{address}/transactions` - Pending proposals
//! - `GET /wallet/multisig/{address}/transactions/{index}` - Proposal status

pub mod handlers;
pub mod routes;

pub use handlers::ApiState;
pub use routes::create_router;
