//! Cryptographic utilities
//!
//! This module provides:
//! - Keccak-256 hashing and ABI selectors
//! - ECDSA key management (secp256k1, recoverable signatures)

pub mod hash;
pub mod keys;

pub use hash::{keccak256, keccak256_hex, selector};
pub use keys::{public_key_to_address, recover_public_key, KeyError, KeyPair, RecoverableParts};
