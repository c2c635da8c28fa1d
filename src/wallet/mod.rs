//! Accounts and key material

pub mod account;

pub use account::{Account, WalletError, WalletInfo, WalletKey};
