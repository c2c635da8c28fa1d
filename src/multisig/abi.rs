//! Contract ABI encoding for the multisig wallet
//!
//! Covers exactly the functions, constructor and events the wallet
//! contract exposes. Every argument is a 32-byte word; `bytes` and
//! `address[]` use the standard head offset plus tail layout.

use super::contract::{ContractError, ContractEvent, ProposalRecord};
use crate::core::{Address, Wei};
use crate::crypto::{keccak256, selector};
use crate::ledger::LogEntry;

const WORD: usize = 32;

pub const SUBMIT_TRANSACTION: &str = "submitTransaction(address,uint256,bytes)";
pub const CONFIRM_TRANSACTION: &str = "confirmTransaction(uint256)";
pub const EXECUTE_TRANSACTION: &str = "executeTransaction(uint256)";
pub const GET_TRANSACTION: &str = "getTransaction(uint256)";
pub const GET_TRANSACTION_COUNT: &str = "getTransactionCount()";
pub const IS_CONFIRMED: &str = "isConfirmed(uint256,address)";
pub const IS_OWNER: &str = "isOwner(address)";
pub const OWNERS: &str = "owners(uint256)";
pub const REQUIRED_CONFIRMATIONS: &str = "requiredConfirmations()";

pub const SUBMIT_EVENT: &str = "SubmitTransaction(uint256,address,uint256,bytes)";
pub const CONFIRM_EVENT: &str = "ConfirmTransaction(address,uint256)";
pub const EXECUTE_EVENT: &str = "ExecuteTransaction(uint256)";
pub const DEPOSIT_EVENT: &str = "Deposit(address,uint256)";

// =============================================================================
// Words
// =============================================================================

fn word_u64(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn word_address(address: &Address) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[12..].copy_from_slice(address.as_bytes());
    word
}

fn padded(data: &[u8]) -> Vec<u8> {
    let mut out = data.to_vec();
    let rem = data.len() % WORD;
    if rem != 0 {
        out.resize(data.len() + WORD - rem, 0);
    }
    out
}

fn abi_error(message: impl Into<String>) -> ContractError {
    ContractError::Abi(message.into())
}

fn read_word(data: &[u8], position: usize) -> Result<&[u8], ContractError> {
    let start = position * WORD;
    data.get(start..start + WORD)
        .ok_or_else(|| abi_error(format!("output too short for word {}", position)))
}

fn as_u64(word: &[u8]) -> Result<u64, ContractError> {
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(abi_error("integer does not fit in u64"));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(bytes))
}

fn as_address(word: &[u8]) -> Result<Address, ContractError> {
    if word[..12].iter().any(|b| *b != 0) {
        return Err(abi_error("dirty address word"));
    }
    Address::from_slice(&word[12..]).ok_or_else(|| abi_error("bad address word"))
}

fn as_bool(word: &[u8]) -> Result<bool, ContractError> {
    match as_u64(word)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(abi_error(format!("bool word holds {}", other))),
    }
}

/// Dynamic `bytes` whose head word at `position` holds the tail offset
fn read_bytes(data: &[u8], position: usize) -> Result<Vec<u8>, ContractError> {
    // Offsets and lengths come from the node, so every step is checked
    let offset = usize::try_from(as_u64(read_word(data, position)?)?)
        .map_err(|_| abi_error("bytes offset out of range"))?;
    let start = offset
        .checked_add(WORD)
        .ok_or_else(|| abi_error("bytes offset out of range"))?;
    let len_word = data
        .get(offset..start)
        .ok_or_else(|| abi_error("bytes offset out of range"))?;
    let len = usize::try_from(as_u64(len_word)?)
        .map_err(|_| abi_error("bytes length out of range"))?;
    let end = start
        .checked_add(len)
        .ok_or_else(|| abi_error("bytes length out of range"))?;
    data.get(start..end)
        .map(<[u8]>::to_vec)
        .ok_or_else(|| abi_error("bytes length out of range"))
}

fn call(signature: &str, args: &[[u8; WORD]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + args.len() * WORD);
    out.extend_from_slice(&selector(signature));
    for arg in args {
        out.extend_from_slice(arg);
    }
    out
}

// =============================================================================
// Calls
// =============================================================================

pub fn encode_submit(to: &Address, value: &Wei, data: &[u8]) -> Vec<u8> {
    let mut out = call(
        SUBMIT_TRANSACTION,
        &[
            word_address(to),
            value.to_word(),
            word_u64(3 * WORD as u64),
            word_u64(data.len() as u64),
        ],
    );
    out.extend_from_slice(&padded(data));
    out
}

pub fn encode_confirm(index: u64) -> Vec<u8> {
    call(CONFIRM_TRANSACTION, &[word_u64(index)])
}

pub fn encode_execute(index: u64) -> Vec<u8> {
    call(EXECUTE_TRANSACTION, &[word_u64(index)])
}

pub fn encode_get_transaction(index: u64) -> Vec<u8> {
    call(GET_TRANSACTION, &[word_u64(index)])
}

pub fn encode_get_transaction_count() -> Vec<u8> {
    call(GET_TRANSACTION_COUNT, &[])
}

pub fn encode_is_confirmed(index: u64, owner: &Address) -> Vec<u8> {
    call(IS_CONFIRMED, &[word_u64(index), word_address(owner)])
}

pub fn encode_is_owner(who: &Address) -> Vec<u8> {
    call(IS_OWNER, &[word_address(who)])
}

pub fn encode_owners(position: u64) -> Vec<u8> {
    call(OWNERS, &[word_u64(position)])
}

pub fn encode_required_confirmations() -> Vec<u8> {
    call(REQUIRED_CONFIRMATIONS, &[])
}

/// Constructor arguments `(address[] _owners, uint256 _requiredConfirmations)`,
/// appended to the contract bytecode
pub fn encode_constructor(owners: &[Address], threshold: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity((3 + owners.len()) * WORD);
    out.extend_from_slice(&word_u64(2 * WORD as u64));
    out.extend_from_slice(&word_u64(threshold));
    out.extend_from_slice(&word_u64(owners.len() as u64));
    for owner in owners {
        out.extend_from_slice(&word_address(owner));
    }
    out
}

// =============================================================================
// Return values
// =============================================================================

pub fn decode_u64(output: &[u8]) -> Result<u64, ContractError> {
    as_u64(read_word(output, 0)?)
}

pub fn decode_bool(output: &[u8]) -> Result<bool, ContractError> {
    as_bool(read_word(output, 0)?)
}

pub fn decode_address(output: &[u8]) -> Result<Address, ContractError> {
    as_address(read_word(output, 0)?)
}

/// `(address to, uint256 value, bytes data, bool executed, uint256 confirmations)`
pub fn decode_transaction(output: &[u8]) -> Result<ProposalRecord, ContractError> {
    Ok(ProposalRecord {
        to: as_address(read_word(output, 0)?)?,
        value: Wei::from_be_bytes(read_word(output, 1)?),
        data: read_bytes(output, 2)?,
        executed: as_bool(read_word(output, 3)?)?,
        confirmations: as_u64(read_word(output, 4)?)?,
    })
}

// =============================================================================
// Events
// =============================================================================

pub fn event_topic(signature: &str) -> [u8; 32] {
    keccak256(signature.as_bytes())
}

/// Decode a log emitted by the wallet contract; `None` for foreign events
pub fn decode_event(log: &LogEntry) -> Result<Option<ContractEvent>, ContractError> {
    let Some(topic0) = log.topics.first() else {
        return Ok(None);
    };
    let topic = |i: usize| -> Result<&[u8], ContractError> {
        log.topics
            .get(i)
            .map(|t| t.as_slice())
            .ok_or_else(|| abi_error(format!("missing topic {}", i)))
    };

    let event = if *topic0 == event_topic(SUBMIT_EVENT) {
        ContractEvent::SubmitTransaction {
            index: as_u64(topic(1)?)?,
            to: as_address(topic(2)?)?,
            value: Wei::from_be_bytes(read_word(&log.data, 0)?),
            data: read_bytes(&log.data, 1)?,
        }
    } else if *topic0 == event_topic(CONFIRM_EVENT) {
        ContractEvent::ConfirmTransaction {
            owner: as_address(topic(1)?)?,
            index: as_u64(topic(2)?)?,
        }
    } else if *topic0 == event_topic(EXECUTE_EVENT) {
        ContractEvent::ExecuteTransaction {
            index: as_u64(topic(1)?)?,
        }
    } else if *topic0 == event_topic(DEPOSIT_EVENT) {
        ContractEvent::Deposit {
            sender: as_address(topic(1)?)?,
            amount: Wei::from_be_bytes(read_word(&log.data, 0)?),
        }
    } else {
        return Ok(None);
    };
    Ok(Some(event))
}

/// Encode an event as the contract would emit it
pub fn encode_event(contract: Address, event: &ContractEvent) -> LogEntry {
    let (topics, data) = match event {
        ContractEvent::SubmitTransaction {
            index,
            to,
            value,
            data,
        } => {
            let mut body = Vec::new();
            body.extend_from_slice(&value.to_word());
            body.extend_from_slice(&word_u64(2 * WORD as u64));
            body.extend_from_slice(&word_u64(data.len() as u64));
            body.extend_from_slice(&padded(data));
            (
                vec![event_topic(SUBMIT_EVENT), word_u64(*index), word_address(to)],
                body,
            )
        }
        ContractEvent::ConfirmTransaction { owner, index } => (
            vec![event_topic(CONFIRM_EVENT), word_address(owner), word_u64(*index)],
            Vec::new(),
        ),
        ContractEvent::ExecuteTransaction { index } => {
            (vec![event_topic(EXECUTE_EVENT), word_u64(*index)], Vec::new())
        }
        ContractEvent::Deposit { sender, amount } => (
            vec![event_topic(DEPOSIT_EVENT), word_address(sender)],
            amount.to_word().to_vec(),
        ),
    };
    LogEntry {
        address: contract,
        topics,
        data,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address::from([byte; 20])
    }

    #[test]
    fn test_known_selectors() {
        assert_eq!(hex::encode(selector(CONFIRM_TRANSACTION)), "c01a8c84");
        assert_eq!(hex::encode(selector(EXECUTE_TRANSACTION)), "ee22610b");
        assert_eq!(hex::encode(selector(SUBMIT_TRANSACTION)), "c6427474");
        assert_eq!(hex::encode(selector(IS_OWNER)), "2f54bf6e");
    }

    #[test]
    fn test_submit_layout() {
        let encoded = encode_submit(&addr(0x11), &Wei::from(5u64), &[0xaa, 0xbb]);
        let args = &encoded[4..];
        assert_eq!(args.len(), 5 * WORD);
        assert_eq!(as_address(read_word(args, 0).unwrap()).unwrap(), addr(0x11));
        assert_eq!(as_u64(read_word(args, 1).unwrap()).unwrap(), 5);
        assert_eq!(as_u64(read_word(args, 2).unwrap()).unwrap(), 0x60);
        assert_eq!(read_bytes(args, 2).unwrap(), vec![0xaa, 0xbb]);
    }

    #[test]
    fn test_constructor_layout() {
        let encoded = encode_constructor(&[addr(1), addr(2), addr(3)], 2);
        assert_eq!(encoded.len(), 6 * WORD);
        assert_eq!(as_u64(read_word(&encoded, 0).unwrap()).unwrap(), 0x40);
        assert_eq!(as_u64(read_word(&encoded, 1).unwrap()).unwrap(), 2);
        assert_eq!(as_u64(read_word(&encoded, 2).unwrap()).unwrap(), 3);
        assert_eq!(as_address(read_word(&encoded, 5).unwrap()).unwrap(), addr(3));
    }

    #[test]
    fn test_decode_get_transaction_output() {
        let mut output = Vec::new();
        output.extend_from_slice(&word_address(&addr(0x22)));
        output.extend_from_slice(&Wei::from(1_000u64).to_word());
        output.extend_from_slice(&word_u64(5 * WORD as u64));
        output.extend_from_slice(&word_u64(1));
        output.extend_from_slice(&word_u64(2));
        output.extend_from_slice(&word_u64(3));
        output.extend_from_slice(&padded(&[1, 2, 3]));

        let record = decode_transaction(&output).unwrap();
        assert_eq!(record.to, addr(0x22));
        assert_eq!(record.value, Wei::from(1_000u64));
        assert_eq!(record.data, vec![1, 2, 3]);
        assert!(record.executed);
        assert_eq!(record.confirmations, 2);
    }

    #[test]
    fn test_huge_bytes_offset_or_length_is_an_error() {
        let output_with = |offset: u64, len: u64| {
            let mut output = Vec::new();
            output.extend_from_slice(&word_address(&addr(0x22)));
            output.extend_from_slice(&Wei::zero().to_word());
            output.extend_from_slice(&word_u64(offset));
            output.extend_from_slice(&word_u64(0));
            output.extend_from_slice(&word_u64(1));
            output.extend_from_slice(&word_u64(len));
            output
        };

        assert!(matches!(
            decode_transaction(&output_with(u64::MAX, 0)),
            Err(ContractError::Abi(_))
        ));
        assert!(matches!(
            decode_transaction(&output_with(u64::MAX - 8, 0)),
            Err(ContractError::Abi(_))
        ));
        // Valid offset, length word near the top of the range
        assert!(matches!(
            decode_transaction(&output_with(5 * WORD as u64, u64::MAX)),
            Err(ContractError::Abi(_))
        ));
    }

    #[test]
    fn test_truncated_output_is_an_error() {
        assert!(matches!(decode_u64(&[0u8; 10]), Err(ContractError::Abi(_))));
        assert!(matches!(decode_bool(&word_u64(7)), Err(ContractError::Abi(_))));
    }

    #[test]
    fn test_event_encoding_matches_decoding() {
        let contract = addr(0x99);
        for event in [
            ContractEvent::SubmitTransaction {
                index: 7,
                to: addr(0x33),
                value: Wei::from(42u64),
                data: vec![0xde, 0xad, 0xbe, 0xef],
            },
            ContractEvent::ConfirmTransaction {
                owner: addr(0x44),
                index: 7,
            },
            ContractEvent::ExecuteTransaction { index: 7 },
            ContractEvent::Deposit {
                sender: addr(0x55),
                amount: Wei::from(1u64),
            },
        ] {
            let log = encode_event(contract, &event);
            assert_eq!(decode_event(&log).unwrap(), Some(event));
        }
    }

    #[test]
    fn test_foreign_event_is_ignored() {
        let log = LogEntry {
            address: addr(1),
            topics: vec![event_topic("Transfer(address,address,uint256)")],
            data: Vec::new(),
        };
        assert_eq!(decode_event(&log).unwrap(), None);
    }
}
