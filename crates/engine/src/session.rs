use async_trait::async_trait;
use peerhttp_descriptor::SessionDescriptor;
use peerhttp_types::{Fingerprint, MagnetUri};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

use crate::error::{EngineError, Result};
use crate::reader::ContentReader;

pub type SessionRef = Arc<dyn SessionHandle>;
pub type FileRef = Arc<dyn FileHandle>;

/// Adds sessions and hands out shared handles.
///
/// Concurrent adds for the same fingerprint must resolve to the same handle.
pub trait ContentEngine: Send + Sync {
    /// Returns the handle and whether it was created by this call.
    fn add_by_fingerprint(&self, fingerprint: Fingerprint) -> (SessionRef, bool);

    fn add_by_uri(&self, uri: &MagnetUri) -> Result<SessionRef>;

    /// Re-attach a session from a stored descriptor. The handle is ready on return.
    fn add_by_descriptor(&self, descriptor: SessionDescriptor) -> Result<SessionRef>;
}

/// One transfer session as seen by the gateway.
pub trait SessionHandle: Send + Sync + fmt::Debug {
    fn fingerprint(&self) -> Fingerprint;

    fn display_name(&self) -> String;

    fn metadata_ready(&self) -> ReadySignal;

    /// File list, `None` until metadata is ready.
    fn files(&self) -> Option<Vec<FileRef>>;

    /// Descriptor blob for durable storage. Fails while metadata is pending.
    fn serialize_descriptor(&self) -> Result<Vec<u8>>;

    /// Whether the session is a single bare file rather than a folder.
    fn is_single_file(&self) -> bool;

    /// Merge auxiliary announce tiers into the session.
    fn add_peer_hints(&self, tiers: &[Vec<String>]);
}

/// One file inside a session.
#[async_trait]
pub trait FileHandle: Send + Sync + fmt::Debug {
    /// Path relative to the session root; empty for a single-file session.
    fn path(&self) -> &[String];

    fn length(&self) -> u64;

    async fn new_reader(&self) -> Result<Box<dyn ContentReader>>;
}

/// Completion signal for session metadata.
#[derive(Debug, Clone)]
pub struct ReadySignal {
    fingerprint: Fingerprint,
    rx: watch::Receiver<bool>,
}

impl ReadySignal {
    pub fn new(fingerprint: Fingerprint, rx: watch::Receiver<bool>) -> Self {
        Self { fingerprint, rx }
    }

    pub fn is_ready(&self) -> bool {
        *self.rx.borrow()
    }

    /// Suspend until metadata is ready. Dropping the future abandons the wait.
    pub async fn wait(mut self) -> Result<()> {
        let fingerprint = self.fingerprint;
        self.rx
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| EngineError::Closed(fingerprint))
    }
}
