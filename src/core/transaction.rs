//! Transaction intents and signed transactions
//!
//! Account-model transfers with EIP-155 replay protection: the network
//! identifier is part of the signed payload and of `v`, so a signature
//! made for one network recovers to a different sender anywhere else.

use crate::core::address::Address;
use crate::core::amount::Wei;
use crate::core::rlp::{self, RlpError, RlpStream};
use crate::crypto::{keccak256, public_key_to_address, recover_public_key, KeyError, KeyPair, RecoverableParts};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Constants
// =============================================================================

/// Fee limit for a plain value transfer
pub const TRANSFER_GAS_LIMIT: u64 = 21_000;

/// Offset added to `v` under EIP-155 (`v = recid + 35 + 2 * chain_id`)
pub const EIP155_V_OFFSET: u64 = 35;

// =============================================================================
// Error Types
// =============================================================================

/// Errors while building, signing or decoding transactions
#[derive(Error, Debug)]
pub enum TransactionError {
    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] KeyError),
    #[error("Malformed transaction encoding: {0}")]
    Encoding(#[from] RlpError),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Signature is not bound to a network (pre-EIP-155 v={0})")]
    UnprotectedSignature(u64),
}

// =============================================================================
// Transaction Hash
// =============================================================================

/// Content hash of a signed transaction
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let body = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(body).ok()?;
        if bytes.len() != 32 {
            return None;
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        Some(Self(out))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({})", self)
    }
}

impl Serialize for TxHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TxHash::from_hex(&s).ok_or_else(|| serde::de::Error::custom("invalid transaction hash"))
    }
}

// =============================================================================
// Transaction Intent
// =============================================================================

/// A fully populated, unsigned transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub sender: Address,
    /// `None` creates a contract
    pub recipient: Option<Address>,
    pub value: Wei,
    #[serde(with = "hex_bytes")]
    pub payload: Vec<u8>,
    pub sequence_number: u64,
    pub fee_price: Wei,
    pub fee_limit: u64,
    pub network_id: u64,
}

impl TransactionIntent {
    fn append_body(&self, stream: &mut RlpStream) {
        stream
            .append_u64(self.sequence_number)
            .append_uint_bytes(&self.fee_price.to_be_bytes())
            .append_u64(self.fee_limit);
        match &self.recipient {
            Some(to) => stream.append_bytes(to.as_bytes()),
            None => stream.append_bytes(&[]),
        };
        stream
            .append_uint_bytes(&self.value.to_be_bytes())
            .append_bytes(&self.payload);
    }

    /// Digest that gets signed: keccak(rlp([nonce, price, limit, to, value, data, chainId, 0, 0]))
    pub fn signing_hash(&self) -> [u8; 32] {
        let mut stream = RlpStream::new_list();
        self.append_body(&mut stream);
        stream
            .append_u64(self.network_id)
            .append_u64(0)
            .append_u64(0);
        keccak256(&stream.finish())
    }

    /// Sign with `key_pair`, which must own the sender address
    pub fn sign(self, key_pair: &KeyPair) -> Result<SignedTransaction, TransactionError> {
        if key_pair.address() != self.sender {
            return Err(TransactionError::InvalidTransaction(format!(
                "signing key does not belong to sender {}",
                self.sender
            )));
        }

        let parts = key_pair.sign_digest(&self.signing_hash());
        let v = parts.recovery_id as u64 + EIP155_V_OFFSET + 2 * self.network_id;

        let mut stream = RlpStream::new_list();
        self.append_body(&mut stream);
        stream
            .append_u64(v)
            .append_uint_bytes(&parts.r)
            .append_uint_bytes(&parts.s);
        let raw = stream.finish();
        let hash = TxHash(keccak256(&raw));

        Ok(SignedTransaction {
            intent: self,
            v,
            r: parts.r,
            s: parts.s,
            raw,
            hash,
        })
    }
}

// =============================================================================
// Signed Transaction
// =============================================================================

/// A signed transaction. Immutable once produced: fields are private and
/// the hash is a pure function of the raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    intent: TransactionIntent,
    v: u64,
    r: [u8; 32],
    s: [u8; 32],
    raw: Vec<u8>,
    hash: TxHash,
}

impl SignedTransaction {
    pub fn intent(&self) -> &TransactionIntent {
        &self.intent
    }

    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// Raw RLP bytes for broadcast
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn raw_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }

    pub fn v(&self) -> u64 {
        self.v
    }

    /// Recover the signing address, checking it matches the recorded sender
    pub fn recover_sender(&self) -> Result<Address, TransactionError> {
        let recovery_id = self
            .v
            .checked_sub(EIP155_V_OFFSET + 2 * self.intent.network_id)
            .filter(|id| *id <= 1)
            .ok_or(TransactionError::UnprotectedSignature(self.v))?;

        let parts = RecoverableParts {
            recovery_id: recovery_id as u8,
            r: self.r,
            s: self.s,
        };
        let public_key = recover_public_key(&self.intent.signing_hash(), &parts)?;
        Ok(public_key_to_address(&public_key))
    }

    /// Decode raw bytes as received by a ledger. The network id is taken
    /// from `v` and the sender is recovered from the signature.
    pub fn decode(raw: &[u8]) -> Result<Self, TransactionError> {
        let item = rlp::decode(raw)?;
        let fields = item.as_list()?;
        if fields.len() != 9 {
            return Err(TransactionError::InvalidTransaction(format!(
                "expected 9 fields, found {}",
                fields.len()
            )));
        }

        let to_bytes = fields[3].as_bytes()?;
        let recipient = match to_bytes.len() {
            0 => None,
            _ => Some(Address::from_slice(to_bytes).ok_or_else(|| {
                TransactionError::InvalidTransaction("recipient must be 20 bytes".to_string())
            })?),
        };

        let v = fields[6].as_u64()?;
        if v < EIP155_V_OFFSET {
            return Err(TransactionError::UnprotectedSignature(v));
        }
        let network_id = (v - EIP155_V_OFFSET) / 2;

        let word = |bytes: &[u8]| -> Result<[u8; 32], TransactionError> {
            if bytes.len() > 32 {
                return Err(TransactionError::InvalidTransaction(
                    "signature component longer than 32 bytes".to_string(),
                ));
            }
            let mut out = [0u8; 32];
            out[32 - bytes.len()..].copy_from_slice(bytes);
            Ok(out)
        };

        let mut tx = SignedTransaction {
            intent: TransactionIntent {
                sender: Address::ZERO,
                recipient,
                value: Wei::from_be_bytes(fields[4].as_bytes()?),
                payload: fields[5].as_bytes()?.to_vec(),
                sequence_number: fields[0].as_u64()?,
                fee_price: Wei::from_be_bytes(fields[1].as_bytes()?),
                fee_limit: fields[2].as_u64()?,
                network_id,
            },
            v,
            r: word(fields[7].as_bytes()?)?,
            s: word(fields[8].as_bytes()?)?,
            raw: raw.to_vec(),
            hash: TxHash(keccak256(raw)),
        };
        tx.intent.sender = tx.recover_sender()?;
        Ok(tx)
    }
}

/// Serde helper for hex-encoded byte vectors
pub(crate) mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        let body = s.strip_prefix("0x").unwrap_or(&s);
        hex::decode(body).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_intent(key: &KeyPair, network_id: u64) -> TransactionIntent {
        TransactionIntent {
            sender: key.address(),
            recipient: Some("0x3535353535353535353535353535353535353535".parse().unwrap()),
            value: Wei::from(1_000_000_000_000_000_000u64),
            payload: vec![],
            sequence_number: 9,
            fee_price: Wei::from(20_000_000_000u64),
            fee_limit: TRANSFER_GAS_LIMIT,
            network_id,
        }
    }

    #[test]
    fn test_eip155_reference_vector() {
        // Example from the EIP-155 specification
        let key = KeyPair::from_private_key_hex(
            "4646464646464646464646464646464646464646464646464646464646464646",
        )
        .unwrap();
        let intent = sample_intent(&key, 1);

        assert_eq!(
            hex::encode(intent.signing_hash()),
            "daf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
        );

        let signed = intent.sign(&key).unwrap();
        assert_eq!(signed.v(), 37);
        assert_eq!(
            hex::encode(signed.raw()),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    #[test]
    fn test_signing_is_deterministic() {
        let key = KeyPair::generate();
        let a = sample_intent(&key, 5).sign(&key).unwrap();
        let b = sample_intent(&key, 5).sign(&key).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.raw(), b.raw());
    }

    #[test]
    fn test_decode_recovers_sender() {
        let key = KeyPair::generate();
        let signed = sample_intent(&key, 11155111).sign(&key).unwrap();

        let decoded = SignedTransaction::decode(signed.raw()).unwrap();
        assert_eq!(decoded.intent().sender, key.address());
        assert_eq!(decoded.intent().network_id, 11155111);
        assert_eq!(decoded.hash(), signed.hash());
        assert_eq!(decoded, signed);
    }

    #[test]
    fn test_signature_bound_to_network() {
        let key = KeyPair::generate();
        let signed = sample_intent(&key, 1).sign(&key).unwrap();

        // Re-label the same signature for another network: recovery must not
        // yield the original sender.
        let mut replayed = signed.clone();
        replayed.intent.network_id = 5;
        replayed.v = signed.v() - 2 + 2 * 5;
        if let Ok(address) = replayed.recover_sender() {
            assert_ne!(address, key.address());
        }
    }

    #[test]
    fn test_wrong_key_rejected() {
        let key = KeyPair::generate();
        let other = KeyPair::generate();
        let result = sample_intent(&key, 1).sign(&other);
        assert!(matches!(result, Err(TransactionError::InvalidTransaction(_))));
    }

    #[test]
    fn test_contract_creation_has_empty_recipient() {
        let key = KeyPair::generate();
        let mut intent = sample_intent(&key, 1);
        intent.recipient = None;
        intent.payload = vec![0x60, 0x80];
        let signed = intent.sign(&key).unwrap();

        let decoded = SignedTransaction::decode(signed.raw()).unwrap();
        assert_eq!(decoded.intent().recipient, None);
        assert_eq!(decoded.intent().payload, vec![0x60, 0x80]);
    }

    #[test]
    fn test_tx_hash_hex() {
        let hash = TxHash([0xab; 32]);
        let text = hash.to_string();
        assert!(text.starts_with("0xabab"));
        assert_eq!(TxHash::from_hex(&text), Some(hash));
        assert_eq!(TxHash::from_hex("0x1234"), None);
    }
}
