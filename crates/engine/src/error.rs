use peerhttp_descriptor::DescriptorError;
use peerhttp_types::Fingerprint;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("session {0} has no metadata yet")]
    MetadataPending(Fingerprint),

    #[error("session {0} was closed before metadata arrived")]
    Closed(Fingerprint),

    #[error("descriptor is for {actual}, expected {expected}")]
    FingerprintMismatch {
        expected: Fingerprint,
        actual: Fingerprint,
    },

    #[error("content unavailable: {0}")]
    Unavailable(String),

    #[error("descriptor error: {0}")]
    Descriptor(#[from] DescriptorError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
