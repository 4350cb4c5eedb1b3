use peerhttp_types::{FileEntry, Fingerprint, FINGERPRINT_BYTES};
use sha1::{Digest, Sha1};

use crate::bencode::BencodeValue;
use crate::error::{DescriptorError, Result};

/// Piece size used when building descriptors for local content.
pub const DEFAULT_PIECE_LENGTH: u64 = 256 * 1024;

/// Addressing metadata of one session.
///
/// The raw `info` dictionary is kept as decoded so re-encoding a loaded
/// descriptor yields the same fingerprint, including keys this codec does not
/// interpret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    fingerprint: Fingerprint,
    name: String,
    files: Vec<FileEntry>,
    trackers: Vec<Vec<String>>,
    info: BencodeValue,
}

impl SessionDescriptor {
    /// Build a descriptor from content metadata. A single entry with an empty
    /// path produces a single-file info dictionary.
    pub fn build(
        name: &str,
        files: Vec<FileEntry>,
        piece_length: u64,
        pieces: Vec<u8>,
    ) -> Result<Self> {
        let mut info = BencodeValue::dict()
            .insert("name", BencodeValue::string(name))
            .insert("piece length", BencodeValue::integer(to_i64(piece_length)?))
            .insert("pieces", BencodeValue::Bytes(pieces));

        info = match files.as_slice() {
            [single] if single.path.is_empty() => {
                info.insert("length", BencodeValue::integer(to_i64(single.length)?))
            }
            _ => {
                let mut list = BencodeValue::list();
                for file in &files {
                    let path = file
                        .path
                        .iter()
                        .fold(BencodeValue::list(), |acc, seg| {
                            acc.push(BencodeValue::string(seg))
                        });
                    list = list.push(
                        BencodeValue::dict()
                            .insert("length", BencodeValue::integer(to_i64(file.length)?))
                            .insert("path", path),
                    );
                }
                info.insert("files", list)
            }
        };

        Self::from_info(info, Vec::new())
    }

    /// Interpret an `info` dictionary and compute its fingerprint.
    pub fn from_info(info: BencodeValue, trackers: Vec<Vec<String>>) -> Result<Self> {
        let name = info
            .get("name")
            .ok_or(DescriptorError::MissingField("name"))?
            .as_str()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| invalid("name", "expected a non-empty utf-8 string"))?
            .to_string();

        let files = match (info.get("files"), info.get("length")) {
            (Some(files), _) => parse_files(files)?,
            (None, Some(length)) => vec![FileEntry::new(Vec::new(), parse_length(length)?)],
            (None, None) => return Err(DescriptorError::MissingField("length")),
        };

        Ok(Self {
            fingerprint: fingerprint_of(&info),
            name,
            files,
            trackers,
            info,
        })
    }

    /// Decode a stored blob.
    pub fn decode(blob: &[u8]) -> Result<Self> {
        let root = BencodeValue::decode(blob)?;
        let info = root
            .get("info")
            .cloned()
            .ok_or(DescriptorError::MissingField("info"))?;

        let mut trackers: Vec<Vec<String>> = root
            .get("announce-list")
            .and_then(BencodeValue::as_list)
            .map(|tiers| {
                tiers
                    .iter()
                    .filter_map(BencodeValue::as_list)
                    .map(|tier| {
                        tier.iter()
                            .filter_map(BencodeValue::as_str)
                            .map(str::to_string)
                            .collect::<Vec<_>>()
                    })
                    .filter(|tier| !tier.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        if trackers.is_empty() {
            if let Some(announce) = root.get("announce").and_then(BencodeValue::as_str) {
                trackers.push(vec![announce.to_string()]);
            }
        }

        Self::from_info(info, trackers)
    }

    /// Encode into the stored blob form.
    pub fn encode(&self) -> Vec<u8> {
        let mut root = BencodeValue::dict().insert("info", self.info.clone());
        if let Some(first) = self.trackers.iter().flatten().next() {
            root = root.insert("announce", BencodeValue::string(first));
            let tiers = self.trackers.iter().fold(BencodeValue::list(), |acc, tier| {
                acc.push(
                    tier.iter()
                        .fold(BencodeValue::list(), |t, url| t.push(BencodeValue::string(url))),
                )
            });
            root = root.insert("announce-list", tiers);
        }
        root.encode()
    }

    /// Merge announce tiers, skipping URLs already present. Returns whether anything changed.
    pub fn add_trackers(&mut self, tiers: &[Vec<String>]) -> bool {
        let mut changed = false;
        for tier in tiers {
            let fresh: Vec<String> = tier
                .iter()
                .filter(|url| !self.trackers.iter().flatten().any(|known| known == *url))
                .cloned()
                .collect();
            if !fresh.is_empty() {
                self.trackers.push(fresh);
                changed = true;
            }
        }
        changed
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn files(&self) -> &[FileEntry] {
        &self.files
    }

    pub fn trackers(&self) -> &[Vec<String>] {
        &self.trackers
    }

    pub fn is_single_file(&self) -> bool {
        self.info.get("files").is_none()
    }

    pub fn total_length(&self) -> u64 {
        self.files.iter().map(|f| f.length).sum()
    }

    pub fn piece_length(&self) -> Option<u64> {
        self.info
            .get("piece length")
            .and_then(BencodeValue::as_integer)
            .and_then(|v| u64::try_from(v).ok())
    }
}

fn fingerprint_of(info: &BencodeValue) -> Fingerprint {
    let digest = Sha1::digest(info.encode());
    let mut bytes = [0u8; FINGERPRINT_BYTES];
    bytes.copy_from_slice(&digest);
    Fingerprint::new(bytes)
}

fn parse_files(value: &BencodeValue) -> Result<Vec<FileEntry>> {
    let list = value
        .as_list()
        .ok_or_else(|| invalid("files", "expected a list"))?;
    if list.is_empty() {
        return Err(invalid("files", "empty file list"));
    }

    list.iter()
        .map(|entry| {
            let length = parse_length(
                entry
                    .get("length")
                    .ok_or(DescriptorError::MissingField("length"))?,
            )?;
            let segments = entry
                .get("path")
                .and_then(BencodeValue::as_list)
                .ok_or(DescriptorError::MissingField("path"))?;
            let path = segments
                .iter()
                .map(|seg| {
                    seg.as_str()
                        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
                        .map(str::to_string)
                        .ok_or_else(|| invalid("path", "bad path segment"))
                })
                .collect::<Result<Vec<_>>>()?;
            if path.is_empty() {
                return Err(invalid("path", "empty path"));
            }
            Ok(FileEntry::new(path, length))
        })
        .collect()
}

fn parse_length(value: &BencodeValue) -> Result<u64> {
    value
        .as_integer()
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| invalid("length", "expected a non-negative integer"))
}

fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| invalid("length", "value out of range"))
}

fn invalid(field: &'static str, reason: &str) -> DescriptorError {
    DescriptorError::InvalidField {
        field,
        reason: reason.to_string(),
    }
}
