//! Shared identifiers and value types for the peer-to-HTTP gateway.

pub mod file;
pub mod fingerprint;
pub mod magnet;

pub use file::*;
pub use fingerprint::*;
pub use magnet::*;
