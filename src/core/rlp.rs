//! Recursive Length Prefix encoding
//!
//! The canonical serialization for ledger transactions. Only what the
//! signing pipeline needs: byte strings, unsigned integers and flat or
//! nested lists, plus a decoder for inspecting raw signed payloads.

use thiserror::Error;

/// RLP decoding errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RlpError {
    #[error("Unexpected end of input")]
    UnexpectedEnd,
    #[error("Trailing bytes after RLP item")]
    TrailingBytes,
    #[error("Expected a list")]
    ExpectedList,
    #[error("Expected a byte string")]
    ExpectedBytes,
    #[error("Non-canonical encoding")]
    NonCanonical,
    #[error("Integer too large for {0} bits")]
    IntegerOverflow(u32),
}

// =============================================================================
// Encoding
// =============================================================================

/// Strip leading zero bytes, giving the minimal big-endian integer form
pub fn trim_leading_zeros(bytes: &[u8]) -> &[u8] {
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[first..]
}

fn encode_length(len: usize, offset: u8, out: &mut Vec<u8>) {
    if len < 56 {
        out.push(offset + len as u8);
    } else {
        let len_bytes = (len as u64).to_be_bytes();
        let len_bytes = trim_leading_zeros(&len_bytes);
        out.push(offset + 55 + len_bytes.len() as u8);
        out.extend_from_slice(len_bytes);
    }
}

/// Encode a single byte string
pub fn encode_bytes(bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 9);
    if bytes.len() == 1 && bytes[0] < 0x80 {
        out.push(bytes[0]);
    } else {
        encode_length(bytes.len(), 0x80, &mut out);
        out.extend_from_slice(bytes);
    }
    out
}

/// Builder for an RLP list
#[derive(Debug, Default)]
pub struct RlpStream {
    payload: Vec<u8>,
}

impl RlpStream {
    /// Start a new list
    pub fn new_list() -> Self {
        Self::default()
    }

    /// Append a byte string
    pub fn append_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.payload.extend(encode_bytes(bytes));
        self
    }

    /// Append an unsigned integer given as big-endian bytes (zeros trimmed)
    pub fn append_uint_bytes(&mut self, be_bytes: &[u8]) -> &mut Self {
        self.append_bytes(trim_leading_zeros(be_bytes))
    }

    pub fn append_u64(&mut self, value: u64) -> &mut Self {
        self.append_uint_bytes(&value.to_be_bytes())
    }

    /// Append an already-encoded item (e.g. a nested list)
    pub fn append_raw(&mut self, encoded: &[u8]) -> &mut Self {
        self.payload.extend_from_slice(encoded);
        self
    }

    /// Finish the list, returning its encoding
    pub fn finish(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.payload.len() + 9);
        encode_length(self.payload.len(), 0xc0, &mut out);
        out.extend_from_slice(&self.payload);
        out
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// A decoded RLP item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RlpItem {
    Bytes(Vec<u8>),
    List(Vec<RlpItem>),
}

impl RlpItem {
    pub fn as_bytes(&self) -> Result<&[u8], RlpError> {
        match self {
            RlpItem::Bytes(b) => Ok(b),
            RlpItem::List(_) => Err(RlpError::ExpectedBytes),
        }
    }

    pub fn as_list(&self) -> Result<&[RlpItem], RlpError> {
        match self {
            RlpItem::List(items) => Ok(items),
            RlpItem::Bytes(_) => Err(RlpError::ExpectedList),
        }
    }

    pub fn as_u64(&self) -> Result<u64, RlpError> {
        let bytes = self.as_bytes()?;
        if bytes.len() > 8 {
            return Err(RlpError::IntegerOverflow(64));
        }
        if bytes.first() == Some(&0) {
            return Err(RlpError::NonCanonical);
        }
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
    }
}

fn read_length(input: &[u8], len_of_len: usize) -> Result<usize, RlpError> {
    if input.len() < len_of_len {
        return Err(RlpError::UnexpectedEnd);
    }
    if len_of_len > 8 || input[0] == 0 {
        return Err(RlpError::NonCanonical);
    }
    let len = input[..len_of_len]
        .iter()
        .fold(0usize, |acc, b| (acc << 8) | *b as usize);
    if len < 56 {
        return Err(RlpError::NonCanonical);
    }
    Ok(len)
}

/// Decode one item from the front of `input`, returning it and the rest
fn decode_item(input: &[u8]) -> Result<(RlpItem, &[u8]), RlpError> {
    let prefix = *input.first().ok_or(RlpError::UnexpectedEnd)?;
    let rest = &input[1..];

    let (is_list, header_len, payload_len) = match prefix {
        0x00..=0x7f => return Ok((RlpItem::Bytes(vec![prefix]), rest)),
        0x80..=0xb7 => (false, 0, (prefix - 0x80) as usize),
        0xb8..=0xbf => {
            let len_of_len = (prefix - 0xb7) as usize;
            (false, len_of_len, read_length(rest, len_of_len)?)
        }
        0xc0..=0xf7 => (true, 0, (prefix - 0xc0) as usize),
        0xf8..=0xff => {
            let len_of_len = (prefix - 0xf7) as usize;
            (true, len_of_len, read_length(rest, len_of_len)?)
        }
    };

    let body = &rest[header_len..];
    if body.len() < payload_len {
        return Err(RlpError::UnexpectedEnd);
    }
    let (payload, remainder) = body.split_at(payload_len);

    if is_list {
        let mut items = Vec::new();
        let mut cursor = payload;
        while !cursor.is_empty() {
            let (item, next) = decode_item(cursor)?;
            items.push(item);
            cursor = next;
        }
        Ok((RlpItem::List(items), remainder))
    } else {
        if payload_len == 1 && payload[0] < 0x80 {
            return Err(RlpError::NonCanonical);
        }
        Ok((RlpItem::Bytes(payload.to_vec()), remainder))
    }
}

/// Decode exactly one item spanning the whole input
pub fn decode(input: &[u8]) -> Result<RlpItem, RlpError> {
    let (item, rest) = decode_item(input)?;
    if !rest.is_empty() {
        return Err(RlpError::TrailingBytes);
    }
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_basic_vectors() {
        assert_eq!(encode_bytes(b"dog"), vec![0x83, b'd', b'o', b'g']);
        assert_eq!(encode_bytes(b""), vec![0x80]);
        assert_eq!(encode_bytes(&[0x0f]), vec![0x0f]);
        assert_eq!(encode_bytes(&[0x80]), vec![0x81, 0x80]);
    }

    #[test]
    fn test_encode_list() {
        let mut stream = RlpStream::new_list();
        stream.append_bytes(b"cat").append_bytes(b"dog");
        assert_eq!(
            stream.finish(),
            vec![0xc8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
        );
        assert_eq!(RlpStream::new_list().finish(), vec![0xc0]);
    }

    #[test]
    fn test_encode_integers() {
        let mut stream = RlpStream::new_list();
        stream.append_u64(0).append_u64(15).append_u64(1024);
        assert_eq!(stream.finish(), vec![0xc5, 0x80, 0x0f, 0x82, 0x04, 0x00]);
    }

    #[test]
    fn test_long_string() {
        let data = vec![0xaa; 60];
        let encoded = encode_bytes(&data);
        assert_eq!(&encoded[..2], &[0xb8, 60]);
        assert_eq!(decode(&encoded).unwrap(), RlpItem::Bytes(data));
    }

    #[test]
    fn test_decode_nested() {
        let mut inner = RlpStream::new_list();
        inner.append_u64(1);
        let mut outer = RlpStream::new_list();
        outer.append_bytes(b"dog").append_raw(&inner.finish());

        let item = decode(&outer.finish()).unwrap();
        let list = item.as_list().unwrap();
        assert_eq!(list[0].as_bytes().unwrap(), b"dog");
        assert_eq!(list[1].as_list().unwrap()[0].as_u64().unwrap(), 1);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(decode(&[0x83, b'd']), Err(RlpError::UnexpectedEnd));
        assert_eq!(decode(&[0x0f, 0x0f]), Err(RlpError::TrailingBytes));
        assert_eq!(decode(&[0x81, 0x05]), Err(RlpError::NonCanonical));
        assert_eq!(decode(&[]), Err(RlpError::UnexpectedEnd));
    }
}
