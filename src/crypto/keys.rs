//! ECDSA key management
//!
//! Key pairs on the secp256k1 curve with recoverable signatures, the
//! scheme account-based ledgers use so that the sender can be derived
//! from the signature itself.

use rand::rngs::OsRng;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use std::fmt;
use thiserror::Error;

use super::hash::keccak256;
use crate::core::Address;

/// Errors that can occur during key operations
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Invalid recovery id: {0}")]
    InvalidRecoveryId(u64),
    #[error("Secp256k1 error: {0}")]
    Secp256k1Error(#[from] secp256k1::Error),
}

/// A recoverable signature split into the parts a transaction carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoverableParts {
    /// Recovery id, 0 or 1
    pub recovery_id: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

/// A key pair consisting of a private key and its corresponding public key
#[derive(Clone)]
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let (secret_key, public_key) = secp.generate_keypair(&mut OsRng);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from an existing secret key
    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, &secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    /// Create a key pair from a hex-encoded private key (0x prefix optional)
    pub fn from_private_key_hex(hex_key: &str) -> Result<Self, KeyError> {
        let trimmed = hex_key.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(trimmed).map_err(|_| KeyError::InvalidPrivateKey)?;
        let secret_key = SecretKey::from_slice(&bytes).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// Get the private key as a hex string
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Get the public key as a hex string (uncompressed, 0x04-prefixed)
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize_uncompressed())
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Ledger address of this key pair
    pub fn address(&self) -> Address {
        public_key_to_address(&self.public_key)
    }

    /// Sign a 32-byte digest, returning the recoverable signature parts
    pub fn sign_digest(&self, digest: &[u8; 32]) -> RecoverableParts {
        let secp = Secp256k1::new();
        let message = Message::from_digest(*digest);
        let signature = secp.sign_ecdsa_recoverable(&message, &self.secret_key);
        let (recovery_id, compact) = signature.serialize_compact();

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&compact[..32]);
        s.copy_from_slice(&compact[32..]);

        RecoverableParts {
            recovery_id: recovery_id.to_i32() as u8,
            r,
            s,
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Derive a ledger address: last 20 bytes of Keccak-256 over the
/// uncompressed public key without its 0x04 prefix
pub fn public_key_to_address(public_key: &PublicKey) -> Address {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = keccak256(&uncompressed[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    Address::from(bytes)
}

/// Recover the signer's public key from a digest and signature parts
pub fn recover_public_key(
    digest: &[u8; 32],
    parts: &RecoverableParts,
) -> Result<PublicKey, KeyError> {
    let secp = Secp256k1::new();
    let recovery_id = RecoveryId::from_i32(parts.recovery_id as i32)
        .map_err(|_| KeyError::InvalidRecoveryId(parts.recovery_id as u64))?;

    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(&parts.r);
    compact[32..].copy_from_slice(&parts.s);

    let signature = RecoverableSignature::from_compact(&compact, recovery_id)
        .map_err(|_| KeyError::InvalidSignature)?;
    let message = Message::from_digest(*digest);
    Ok(secp.recover_ecdsa(&message, &signature)?)
}
