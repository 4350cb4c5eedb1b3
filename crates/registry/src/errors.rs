//! Error types for the session registry

use peerhttp_descriptor::DescriptorError;
use peerhttp_engine::EngineError;
use peerhttp_storage::StorageError;
use peerhttp_types::Fingerprint;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Timed out waiting for metadata of {fingerprint}")]
    Timeout { fingerprint: Fingerprint },

    #[error("Failed to persist {fingerprint}: {source}")]
    Persistence {
        fingerprint: Fingerprint,
        #[source]
        source: StorageError,
    },

    #[error("Descriptor decode error: {0}")]
    Decode(#[from] DescriptorError),

    #[error("Content engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Store error: {0}")]
    Store(#[from] StorageError),

    #[error("Registry task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, RegistryError>;
