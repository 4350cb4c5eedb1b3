use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::fingerprint::{Fingerprint, FINGERPRINT_BYTES, FINGERPRINT_HEX_LENGTH};

/// Shape accepted by the gateway: an exact topic plus both a display name and a tracker.
static MAGNET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^magnet:\?xt=urn:[a-zA-Z0-9]+:[a-zA-Z0-9]{32,40}((&dn=.+&tr=.+)|(&tr=.+&dn=.+))$")
        .expect("magnet pattern is valid")
});

const BTIH_PREFIX: &str = "urn:btih:";
const BASE32_LENGTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MagnetError {
    #[error("magnet uri is malformed: {0}")]
    Malformed(String),
    #[error("magnet uri does not match the accepted shape")]
    Rejected,
    #[error("magnet uri has no btih exact topic")]
    MissingTopic,
    #[error("magnet info hash is invalid: {0}")]
    InvalidHash(String),
}

/// Parsed magnet-style URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetUri {
    pub fingerprint: Fingerprint,
    pub display_name: Option<String>,
    /// Each `tr` parameter forms its own announce tier.
    pub trackers: Vec<String>,
    raw: String,
}

impl MagnetUri {
    /// Parse a magnet URI without applying the gateway's shape check.
    pub fn parse(raw: &str) -> Result<Self, MagnetError> {
        let url = Url::parse(raw).map_err(|err| MagnetError::Malformed(err.to_string()))?;
        if url.scheme() != "magnet" {
            return Err(MagnetError::Malformed(format!(
                "unexpected scheme {}",
                url.scheme()
            )));
        }

        let mut fingerprint = None;
        let mut display_name = None;
        let mut trackers = Vec::new();

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "xt" if fingerprint.is_none() => {
                    if let Some(hash) = strip_prefix_ignore_case(&value, BTIH_PREFIX) {
                        fingerprint = Some(decode_info_hash(hash)?);
                    }
                }
                "dn" if display_name.is_none() => display_name = Some(value.into_owned()),
                "tr" => {
                    if !trackers.iter().any(|t| t == value.as_ref()) {
                        trackers.push(value.into_owned());
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            fingerprint: fingerprint.ok_or(MagnetError::MissingTopic)?,
            display_name,
            trackers,
            raw: raw.to_string(),
        })
    }

    /// Rebuild a magnet URI from a routed wildcard (`magnet:`) and the raw query string,
    /// then validate it. The first query part is case-folded so upper-case hashes pass.
    pub fn from_request(wildcard: &str, raw_query: &str) -> Result<Self, MagnetError> {
        if raw_query.is_empty() {
            return Err(MagnetError::Rejected);
        }

        let mut parts: Vec<String> = raw_query.split('&').map(str::to_string).collect();
        parts[0] = parts[0].to_lowercase();
        let candidate = format!("{}?{}", wildcard, parts.join("&"));

        if !MAGNET_PATTERN.is_match(&candidate) {
            return Err(MagnetError::Rejected);
        }
        Self::parse(&candidate)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &value[prefix.len()..])
}

fn decode_info_hash(hash: &str) -> Result<Fingerprint, MagnetError> {
    match hash.len() {
        FINGERPRINT_HEX_LENGTH => {
            Fingerprint::from_hex(hash).map_err(|err| MagnetError::InvalidHash(err.to_string()))
        }
        BASE32_LENGTH => decode_base32(hash)
            .map(Fingerprint::new)
            .ok_or_else(|| MagnetError::InvalidHash(format!("bad base32 {hash}"))),
        other => Err(MagnetError::InvalidHash(format!(
            "unexpected length {other}"
        ))),
    }
}

/// RFC 4648 base32 without padding, case-insensitive.
fn decode_base32(value: &str) -> Option<[u8; FINGERPRINT_BYTES]> {
    let mut out = [0u8; FINGERPRINT_BYTES];
    let mut buffer: u64 = 0;
    let mut bits = 0u32;
    let mut index = 0usize;

    for byte in value.bytes() {
        let symbol = match byte.to_ascii_uppercase() {
            c @ b'A'..=b'Z' => c - b'A',
            c @ b'2'..=b'7' => c - b'2' + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | u64::from(symbol);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            *out.get_mut(index)? = (buffer >> bits) as u8;
            index += 1;
            buffer &= (1 << bits) - 1;
        }
    }

    (index == FINGERPRINT_BYTES).then_some(out)
}
