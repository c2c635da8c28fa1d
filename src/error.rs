//! Error classification shared by every module
//!
//! Each public error enum exposes `kind()` so callers (the HTTP layer,
//! the retry helper) can decide how to react without matching on every
//! variant.

use serde::Serialize;
use std::fmt;

/// Broad category of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected locally before any network call; never retried
    Validation,
    /// Endpoint unreachable, timed out or returned garbage
    Network,
    /// The ledger or contract rejected the operation
    Chain,
    /// Caller is not permitted to act on the wallet
    Authorization,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Chain => "ChainError",
            ErrorKind::Authorization => "AuthorizationError",
        };
        f.write_str(name)
    }
}

impl crate::core::AmountError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

impl crate::core::AddressError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}

impl crate::core::TransactionError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Validation
    }
}
