//! Bencode value model with an encoder and a strict decoder.

use std::collections::BTreeMap;

use crate::error::{DescriptorError, Result};

/// Nesting limit applied while decoding untrusted blobs.
const MAX_DEPTH: usize = 64;

/// A bencoded value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<BencodeValue>),
    Dict(BTreeMap<Vec<u8>, BencodeValue>),
}

impl BencodeValue {
    #[inline]
    pub fn string(s: &str) -> Self {
        Self::Bytes(s.as_bytes().to_vec())
    }

    #[inline]
    pub fn integer(i: i64) -> Self {
        Self::Integer(i)
    }

    #[inline]
    pub fn list() -> Self {
        Self::List(Vec::new())
    }

    #[inline]
    pub fn dict() -> Self {
        Self::Dict(BTreeMap::new())
    }

    /// Add an item to a list (builder pattern)
    #[inline]
    pub fn push(mut self, value: BencodeValue) -> Self {
        if let Self::List(ref mut list) = self {
            list.push(value);
        }
        self
    }

    /// Insert a key-value pair into a dict (builder pattern)
    #[inline]
    pub fn insert(mut self, key: &str, value: BencodeValue) -> Self {
        if let Self::Dict(ref mut dict) = self {
            dict.insert(key.as_bytes().to_vec(), value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&BencodeValue> {
        match self {
            Self::Dict(dict) => dict.get(key.as_bytes()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode_into(&mut buf);
        buf
    }

    pub fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Integer(i) => {
                buf.push(b'i');
                buf.extend_from_slice(i.to_string().as_bytes());
                buf.push(b'e');
            }
            Self::Bytes(bytes) => encode_bytes(bytes, buf),
            Self::List(list) => {
                buf.push(b'l');
                for item in list {
                    item.encode_into(buf);
                }
                buf.push(b'e');
            }
            Self::Dict(dict) => {
                buf.push(b'd');
                // BTreeMap keeps keys sorted
                for (key, value) in dict {
                    encode_bytes(key, buf);
                    value.encode_into(buf);
                }
                buf.push(b'e');
            }
        }
    }

    /// Decode exactly one value; trailing bytes are an error.
    pub fn decode(input: &[u8]) -> Result<Self> {
        let mut decoder = Decoder { input, pos: 0 };
        let value = decoder.value(0)?;
        if decoder.pos != input.len() {
            return Err(DescriptorError::TrailingData(decoder.pos));
        }
        Ok(value)
    }
}

fn encode_bytes(bytes: &[u8], buf: &mut Vec<u8>) {
    buf.extend_from_slice(bytes.len().to_string().as_bytes());
    buf.push(b':');
    buf.extend_from_slice(bytes);
}

struct Decoder<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn peek(&self) -> Result<u8> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or(DescriptorError::UnexpectedEof)
    }

    fn value(&mut self, depth: usize) -> Result<BencodeValue> {
        if depth > MAX_DEPTH {
            return Err(DescriptorError::TooDeep);
        }
        match self.peek()? {
            b'i' => {
                self.pos += 1;
                let digits = self.until(b'e')?;
                Ok(BencodeValue::Integer(parse_integer(digits, self.pos)?))
            }
            b'l' => {
                self.pos += 1;
                let mut list = Vec::new();
                while self.peek()? != b'e' {
                    list.push(self.value(depth + 1)?);
                }
                self.pos += 1;
                Ok(BencodeValue::List(list))
            }
            b'd' => {
                self.pos += 1;
                let mut dict = BTreeMap::new();
                while self.peek()? != b'e' {
                    let key = self.bytes()?.to_vec();
                    let value = self.value(depth + 1)?;
                    dict.insert(key, value);
                }
                self.pos += 1;
                Ok(BencodeValue::Dict(dict))
            }
            b'0'..=b'9' => Ok(BencodeValue::Bytes(self.bytes()?.to_vec())),
            byte => Err(DescriptorError::UnexpectedByte {
                byte,
                offset: self.pos,
            }),
        }
    }

    fn bytes(&mut self) -> Result<&'a [u8]> {
        let start = self.pos;
        let digits = self.until(b':')?;
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(DescriptorError::InvalidLength(start));
        }
        let len: usize = std::str::from_utf8(digits)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or(DescriptorError::InvalidLength(start))?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.input.len())
            .ok_or(DescriptorError::UnexpectedEof)?;
        let input = self.input;
        let slice = &input[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    /// Consume up to (and including) `terminator`, returning the bytes before it.
    fn until(&mut self, terminator: u8) -> Result<&'a [u8]> {
        let input = self.input;
        let rest = &input[self.pos..];
        let idx = rest
            .iter()
            .position(|b| *b == terminator)
            .ok_or(DescriptorError::UnexpectedEof)?;
        self.pos += idx + 1;
        Ok(&rest[..idx])
    }
}

fn parse_integer(digits: &[u8], offset: usize) -> Result<i64> {
    let text = std::str::from_utf8(digits).map_err(|_| DescriptorError::InvalidInteger(offset))?;
    let unsigned = text.strip_prefix('-').unwrap_or(text);
    let leading_zero = unsigned.len() > 1 && unsigned.starts_with('0');
    if unsigned.is_empty() || leading_zero || text == "-0" {
        return Err(DescriptorError::InvalidInteger(offset));
    }
    text.parse().map_err(|_| DescriptorError::InvalidInteger(offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_scalars() {
        assert_eq!(BencodeValue::integer(42).encode(), b"i42e");
        assert_eq!(BencodeValue::integer(-1).encode(), b"i-1e");
        assert_eq!(BencodeValue::string("spam").encode(), b"4:spam");
        assert_eq!(BencodeValue::string("").encode(), b"0:");
    }

    #[test]
    fn test_encode_dict_sorts_keys() {
        let dict = BencodeValue::dict()
            .insert("zeta", BencodeValue::integer(1))
            .insert("alpha", BencodeValue::list().push(BencodeValue::string("a")));
        assert_eq!(dict.encode(), b"d5:alphal1:ae4:zetai1ee");
    }

    #[test]
    fn test_decode_nested() {
        let value = BencodeValue::decode(b"d4:infod4:name3:abc6:lengthi12eee").unwrap();
        let info = value.get("info").unwrap();
        assert_eq!(info.get("name").and_then(BencodeValue::as_str), Some("abc"));
        assert_eq!(info.get("length").and_then(BencodeValue::as_integer), Some(12));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            BencodeValue::decode(b"i12"),
            Err(DescriptorError::UnexpectedEof)
        ));
        assert!(matches!(
            BencodeValue::decode(b"i012e"),
            Err(DescriptorError::InvalidInteger(_))
        ));
        assert!(matches!(
            BencodeValue::decode(b"5:abc"),
            Err(DescriptorError::UnexpectedEof)
        ));
        assert!(matches!(
            BencodeValue::decode(b"i1ei2e"),
            Err(DescriptorError::TrailingData(3))
        ));
        assert!(matches!(
            BencodeValue::decode(b"x"),
            Err(DescriptorError::UnexpectedByte { byte: b'x', .. })
        ));
    }

    #[test]
    fn test_decode_depth_limit() {
        let mut blob = vec![b'l'; MAX_DEPTH + 2];
        blob.extend(vec![b'e'; MAX_DEPTH + 2]);
        assert!(matches!(
            BencodeValue::decode(&blob),
            Err(DescriptorError::TooDeep)
        ));
    }
}
