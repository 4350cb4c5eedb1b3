//! Session descriptor codec.
//!
//! A descriptor is the addressing metadata of one session in metainfo form: a
//! bencoded dictionary holding the `info` dictionary and the announce tiers. The
//! content fingerprint is the SHA-1 of the bencoded `info` dictionary, so a
//! descriptor can be stored and later re-attached without any network lookup.

pub mod bencode;
pub mod descriptor;
pub mod error;

pub use bencode::BencodeValue;
pub use descriptor::{SessionDescriptor, DEFAULT_PIECE_LENGTH};
pub use error::{DescriptorError, Result};
