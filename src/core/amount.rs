//! Amount conversion
//!
//! Exact conversion between the decimal display unit (ether) and the
//! ledger's integer base unit (wei). All arithmetic is done on decimal
//! digit strings and arbitrary-precision integers; floating point is
//! never involved.

use num_bigint::BigUint;
use num_traits::{Num, Zero};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Mul};
use thiserror::Error;

/// Number of fractional digits in the display unit
pub const ETHER_DECIMALS: usize = 18;

/// Largest value representable by a 256-bit ledger integer, in bits
pub const MAX_VALUE_BITS: u64 = 256;

/// Errors produced while parsing amounts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("Malformed amount '{0}'")]
    Malformed(String),
    #[error("Negative amount '{0}' is not allowed")]
    Negative(String),
    #[error("Amount '{0}' has more than 18 fractional digits")]
    TooManyDecimals(String),
    #[error("Amount '{0}' exceeds the 256-bit ledger range")]
    Overflow(String),
}

/// A non-negative amount in base units
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wei(BigUint);

impl Wei {
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Minimal big-endian bytes; zero encodes as an empty slice
    pub fn to_be_bytes(&self) -> Vec<u8> {
        if self.0.is_zero() {
            Vec::new()
        } else {
            self.0.to_bytes_be()
        }
    }

    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        Self(BigUint::from_bytes_be(bytes))
    }

    /// Left-padded 32-byte big-endian word, as used by contract ABIs
    pub fn to_word(&self) -> [u8; 32] {
        let bytes = self.to_be_bytes();
        let mut word = [0u8; 32];
        let start = 32usize.saturating_sub(bytes.len());
        word[start..].copy_from_slice(&bytes[bytes.len().saturating_sub(32)..]);
        word
    }

    /// JSON-RPC quantity encoding, e.g. `0x1bc16d674ec80000`
    pub fn to_hex_quantity(&self) -> String {
        format!("0x{}", self.0.to_str_radix(16))
    }

    /// Parse a JSON-RPC quantity (`0x`-prefixed hex)
    pub fn from_hex_quantity(s: &str) -> Option<Self> {
        let body = s.strip_prefix("0x")?;
        if body.is_empty() {
            return Some(Self::zero());
        }
        BigUint::from_str_radix(body, 16).ok().map(Self)
    }

    pub fn checked_sub(&self, other: &Wei) -> Option<Wei> {
        if self.0 >= other.0 {
            Some(Wei(&self.0 - &other.0))
        } else {
            None
        }
    }

    fn fits_ledger_range(&self) -> bool {
        self.0.bits() <= MAX_VALUE_BITS
    }
}

impl From<u64> for Wei {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<u128> for Wei {
    fn from(value: u128) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<BigUint> for Wei {
    fn from(value: BigUint) -> Self {
        Self(value)
    }
}

impl Add for &Wei {
    type Output = Wei;

    fn add(self, other: &Wei) -> Wei {
        Wei(&self.0 + &other.0)
    }
}

impl Mul<u64> for &Wei {
    type Output = Wei;

    fn mul(self, factor: u64) -> Wei {
        Wei(&self.0 * BigUint::from(factor))
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Wei {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for Wei {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        BigUint::from_str_radix(&s, 10)
            .map(Wei)
            .map_err(serde::de::Error::custom)
    }
}

/// Convert a decimal display amount (e.g. `"1.5"`) to base units.
///
/// Accepts `digits` or `digits.digits`. Rejects signs, exponents,
/// whitespace inside the number and more than 18 fractional digits
/// instead of truncating.
pub fn to_base_units(amount: &str) -> Result<Wei, AmountError> {
    let trimmed = amount.trim();

    if trimmed.starts_with('-') {
        return Err(AmountError::Negative(amount.to_string()));
    }

    let (int_part, frac_part) = match trimmed.split_once('.') {
        Some((i, f)) => (i, f),
        None => (trimmed, ""),
    };

    let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if int_part.is_empty()
        || !all_digits(int_part)
        || !all_digits(frac_part)
        || (trimmed.contains('.') && frac_part.is_empty())
    {
        return Err(AmountError::Malformed(amount.to_string()));
    }

    if frac_part.len() > ETHER_DECIMALS {
        return Err(AmountError::TooManyDecimals(amount.to_string()));
    }

    let mut digits = String::with_capacity(int_part.len() + ETHER_DECIMALS);
    digits.push_str(int_part);
    digits.push_str(frac_part);
    digits.extend(std::iter::repeat('0').take(ETHER_DECIMALS - frac_part.len()));

    let value = BigUint::from_str_radix(&digits, 10)
        .map(Wei)
        .map_err(|_| AmountError::Malformed(amount.to_string()))?;

    if !value.fits_ledger_range() {
        return Err(AmountError::Overflow(amount.to_string()));
    }
    Ok(value)
}

/// Convert base units to the canonical decimal display string.
///
/// Trailing fractional zeros are dropped, and so is the point when the
/// amount is whole: `1500000000000000000` renders as `"1.5"`.
pub fn to_display_units(value: &Wei) -> String {
    let digits = value.0.to_str_radix(10);
    let padded = if digits.len() <= ETHER_DECIMALS {
        format!("{:0>width$}", digits, width = ETHER_DECIMALS + 1)
    } else {
        digits
    };

    let (int_part, frac_part) = padded.split_at(padded.len() - ETHER_DECIMALS);
    let frac_part = frac_part.trim_end_matches('0');

    if frac_part.is_empty() {
        int_part.to_string()
    } else {
        format!("{}.{}", int_part, frac_part)
    }
}
