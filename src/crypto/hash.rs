//! Hashing utilities
//!
//! Keccak-256 is used for addresses, transaction hashes, ABI selectors
//! and event topics.

use sha3::{Digest, Keccak256};

/// Computes the Keccak-256 hash of the input data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Computes Keccak-256 and returns it as a 0x-prefixed hex string
pub fn keccak256_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(keccak256(data)))
}

/// First four bytes of the Keccak-256 hash of a function signature
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}
