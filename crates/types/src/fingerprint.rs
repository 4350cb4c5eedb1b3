use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of raw bytes in a content fingerprint (SHA-1 of the info dictionary).
pub const FINGERPRINT_BYTES: usize = 20;
/// Length of the canonical hexadecimal form.
pub const FINGERPRINT_HEX_LENGTH: usize = FINGERPRINT_BYTES * 2;

/// Errors that can occur when parsing a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FingerprintError {
    #[error("fingerprint must be {expected} hex characters, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("fingerprint is not valid hexadecimal")]
    InvalidHex,
    #[error("fingerprint must be exactly {FINGERPRINT_BYTES} bytes, got {0}")]
    InvalidBytes(usize),
}

/// Content fingerprint identifying one transfer session.
///
/// The canonical string form is 40 lower-case hex characters; it is the key of
/// the in-memory registry while the raw bytes are the key of the durable store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint([u8; FINGERPRINT_BYTES]);

impl Fingerprint {
    pub const fn new(bytes: [u8; FINGERPRINT_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_BYTES] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the hex form. Upper-case input is accepted.
    pub fn from_hex(value: &str) -> Result<Self, FingerprintError> {
        if value.len() != FINGERPRINT_HEX_LENGTH {
            return Err(FingerprintError::InvalidLength {
                expected: FINGERPRINT_HEX_LENGTH,
                actual: value.len(),
            });
        }
        let mut bytes = [0u8; FINGERPRINT_BYTES];
        hex::decode_to_slice(value, &mut bytes).map_err(|_| FingerprintError::InvalidHex)?;
        Ok(Self(bytes))
    }

    /// Build a fingerprint from a raw store key.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, FingerprintError> {
        let array: [u8; FINGERPRINT_BYTES] = bytes
            .try_into()
            .map_err(|_| FingerprintError::InvalidBytes(bytes.len()))?;
        Ok(Self(array))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self.to_hex())
    }
}

impl FromStr for Fingerprint {
    type Err = FingerprintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; FINGERPRINT_BYTES]> for Fingerprint {
    fn from(value: [u8; FINGERPRINT_BYTES]) -> Self {
        Self(value)
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.to_hex()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = FingerprintError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip_is_lowercase() {
        let fp = Fingerprint::from_hex("ABCDEF0123456789ABCDEF0123456789ABCDEF01").unwrap();
        assert_eq!(fp.to_hex(), "abcdef0123456789abcdef0123456789abcdef01");
        assert_eq!(fp.to_string().len(), FINGERPRINT_HEX_LENGTH);
    }

    #[test]
    fn test_rejects_wrong_length() {
        let err = Fingerprint::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            FingerprintError::InvalidLength {
                expected: 40,
                actual: 4
            }
        );
    }

    #[test]
    fn test_rejects_non_hex() {
        let value = "zz".repeat(20);
        assert_eq!(
            Fingerprint::from_hex(&value).unwrap_err(),
            FingerprintError::InvalidHex
        );
    }

    #[test]
    fn test_from_slice() {
        let fp = Fingerprint::from_slice(&[7u8; 20]).unwrap();
        assert_eq!(fp.as_bytes(), &[7u8; 20]);
        assert!(Fingerprint::from_slice(&[1u8; 19]).is_err());
    }

    #[test]
    fn test_serde_uses_hex_string() {
        let fp = Fingerprint::new([0xab; 20]);
        let json = serde_json::to_string(&fp).unwrap();
        assert_eq!(json, format!("\"{}\"", "ab".repeat(20)));
        let back: Fingerprint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, fp);
    }
}
