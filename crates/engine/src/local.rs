use async_trait::async_trait;
use parking_lot::RwLock;
use peerhttp_descriptor::SessionDescriptor;
use peerhttp_types::{Fingerprint, MagnetUri};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::library;
use crate::reader::{ContentReader, LocalReader};
use crate::session::{ContentEngine, FileHandle, FileRef, ReadySignal, SessionHandle, SessionRef};

/// Content engine serving sessions from a local library directory.
///
/// Sessions whose descriptor is not known stay pending until one is published,
/// either by a library scan or by re-attaching a stored descriptor.
#[derive(Clone, Default)]
pub struct LocalEngine {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    library: Option<PathBuf>,
    catalog: RwLock<HashMap<Fingerprint, SessionDescriptor>>,
    sessions: RwLock<HashMap<Fingerprint, Arc<LocalSession>>>,
}

impl LocalEngine {
    /// Engine without a library; sessions resolve only through published descriptors.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(library: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                library: Some(library.into()),
                ..Inner::default()
            }),
        }
    }

    pub fn library(&self) -> Option<&Path> {
        self.inner.library.as_deref()
    }

    /// Describe the library on a blocking thread and publish the results.
    pub async fn scan(&self) -> Result<usize> {
        let Some(root) = self.inner.library.clone() else {
            return Ok(0);
        };
        let descriptors = tokio::task::spawn_blocking(move || library::scan_library(&root))
            .await
            .map_err(|err| EngineError::Unavailable(format!("library scan aborted: {err}")))??;

        let count = descriptors.len();
        for descriptor in descriptors {
            self.publish(descriptor);
        }
        info!(sessions = count, "library scanned");
        Ok(count)
    }

    /// Make a descriptor known; a pending session for it becomes ready.
    pub fn publish(&self, descriptor: SessionDescriptor) {
        let fingerprint = descriptor.fingerprint();
        self.inner
            .catalog
            .write()
            .insert(fingerprint, descriptor.clone());
        let pending = self.inner.sessions.read().get(&fingerprint).cloned();
        if let Some(session) = pending {
            if let Err(err) = session.resolve(descriptor) {
                warn!(error = %err, "published descriptor rejected");
            }
        }
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.read().len()
    }

    fn get_or_create(&self, fingerprint: Fingerprint) -> (Arc<LocalSession>, bool) {
        if let Some(existing) = self.inner.sessions.read().get(&fingerprint) {
            return (existing.clone(), false);
        }

        let mut sessions = self.inner.sessions.write();
        if let Some(existing) = sessions.get(&fingerprint) {
            return (existing.clone(), false);
        }

        let session = Arc::new(LocalSession::new(fingerprint, self.inner.library.clone()));
        if let Some(descriptor) = self.inner.catalog.read().get(&fingerprint) {
            if let Err(err) = session.resolve(descriptor.clone()) {
                warn!(error = %err, "catalog descriptor rejected");
            }
        }
        sessions.insert(fingerprint, session.clone());
        debug!(fingerprint = %fingerprint, ready = session.is_ready(), "session added");
        (session, true)
    }
}

impl ContentEngine for LocalEngine {
    fn add_by_fingerprint(&self, fingerprint: Fingerprint) -> (SessionRef, bool) {
        let (session, is_new) = self.get_or_create(fingerprint);
        (session as SessionRef, is_new)
    }

    fn add_by_uri(&self, uri: &MagnetUri) -> Result<SessionRef> {
        let (session, is_new) = self.get_or_create(uri.fingerprint);
        if is_new {
            if let Some(name) = &uri.display_name {
                session.state.write().pending_name = Some(name.clone());
            }
        }
        let tiers: Vec<Vec<String>> = uri.trackers.iter().map(|t| vec![t.clone()]).collect();
        session.add_peer_hints(&tiers);
        Ok(session as SessionRef)
    }

    fn add_by_descriptor(&self, descriptor: SessionDescriptor) -> Result<SessionRef> {
        let (session, _) = self.get_or_create(descriptor.fingerprint());
        session.resolve(descriptor.clone())?;
        self.inner
            .catalog
            .write()
            .entry(descriptor.fingerprint())
            .or_insert(descriptor);
        Ok(session as SessionRef)
    }
}

#[derive(Debug, Default)]
struct SessionState {
    descriptor: Option<SessionDescriptor>,
    pending_name: Option<String>,
    pending_hints: Vec<Vec<String>>,
}

#[derive(Debug)]
pub struct LocalSession {
    fingerprint: Fingerprint,
    library: Option<PathBuf>,
    state: RwLock<SessionState>,
    ready: watch::Sender<bool>,
}

impl LocalSession {
    fn new(fingerprint: Fingerprint, library: Option<PathBuf>) -> Self {
        let (ready, _) = watch::channel(false);
        Self {
            fingerprint,
            library,
            state: RwLock::new(SessionState::default()),
            ready,
        }
    }

    fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Attach metadata. The first descriptor wins; later ones only contribute trackers.
    fn resolve(&self, mut descriptor: SessionDescriptor) -> Result<()> {
        let actual = descriptor.fingerprint();
        if actual != self.fingerprint {
            return Err(EngineError::FingerprintMismatch {
                expected: self.fingerprint,
                actual,
            });
        }
        {
            let mut state = self.state.write();
            match state.descriptor.as_mut() {
                Some(existing) => {
                    existing.add_trackers(descriptor.trackers());
                }
                None => {
                    let hints = std::mem::take(&mut state.pending_hints);
                    descriptor.add_trackers(&hints);
                    state.descriptor = Some(descriptor);
                }
            }
        }
        self.ready.send_replace(true);
        Ok(())
    }
}

impl SessionHandle for LocalSession {
    fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    fn display_name(&self) -> String {
        let state = self.state.read();
        match (&state.descriptor, &state.pending_name) {
            (Some(descriptor), _) => descriptor.name().to_string(),
            (None, Some(name)) => name.clone(),
            (None, None) => self.fingerprint.to_hex(),
        }
    }

    fn metadata_ready(&self) -> ReadySignal {
        ReadySignal::new(self.fingerprint, self.ready.subscribe())
    }

    fn files(&self) -> Option<Vec<FileRef>> {
        let state = self.state.read();
        let descriptor = state.descriptor.as_ref()?;
        let name = descriptor.name();
        Some(
            descriptor
                .files()
                .iter()
                .map(|entry| {
                    let location = self
                        .library
                        .as_deref()
                        .and_then(|root| library::content_path(root, name, &entry.path));
                    Arc::new(LocalFile {
                        path: entry.path.clone(),
                        length: entry.length,
                        location,
                    }) as FileRef
                })
                .collect(),
        )
    }

    fn serialize_descriptor(&self) -> Result<Vec<u8>> {
        self.state
            .read()
            .descriptor
            .as_ref()
            .map(SessionDescriptor::encode)
            .ok_or(EngineError::MetadataPending(self.fingerprint))
    }

    fn is_single_file(&self) -> bool {
        self.state
            .read()
            .descriptor
            .as_ref()
            .map(SessionDescriptor::is_single_file)
            .unwrap_or(false)
    }

    fn add_peer_hints(&self, tiers: &[Vec<String>]) {
        let mut state = self.state.write();
        match state.descriptor.as_mut() {
            Some(descriptor) => {
                descriptor.add_trackers(tiers);
            }
            None => {
                for tier in tiers {
                    if !state.pending_hints.contains(tier) {
                        state.pending_hints.push(tier.clone());
                    }
                }
            }
        }
    }
}

#[derive(Debug)]
struct LocalFile {
    path: Vec<String>,
    length: u64,
    location: Option<PathBuf>,
}

#[async_trait]
impl FileHandle for LocalFile {
    fn path(&self) -> &[String] {
        &self.path
    }

    fn length(&self) -> u64 {
        self.length
    }

    async fn new_reader(&self) -> Result<Box<dyn ContentReader>> {
        let location = self
            .location
            .as_ref()
            .ok_or_else(|| EngineError::Unavailable(format!("no local data for {:?}", self.path)))?;
        let file = tokio::fs::File::open(location).await?;
        Ok(Box::new(LocalReader::new(file)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerhttp_types::FileEntry;
    use std::time::Duration;

    fn descriptor(name: &str) -> SessionDescriptor {
        SessionDescriptor::build(
            name,
            vec![FileEntry::new(vec!["track.mp3".into()], 3)],
            16,
            vec![0u8; 20],
        )
        .unwrap()
    }

    #[test]
    fn test_add_by_fingerprint_dedupes() {
        let engine = LocalEngine::new();
        let fp = Fingerprint::new([5u8; 20]);
        let (first, first_new) = engine.add_by_fingerprint(fp);
        let (second, second_new) = engine.add_by_fingerprint(fp);
        assert!(first_new);
        assert!(!second_new);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.session_count(), 1);
    }

    #[tokio::test]
    async fn test_publish_resolves_pending_session() {
        let engine = LocalEngine::new();
        let d = descriptor("Album");
        let (session, _) = engine.add_by_fingerprint(d.fingerprint());

        assert!(session.files().is_none());
        assert!(matches!(
            session.serialize_descriptor(),
            Err(EngineError::MetadataPending(_))
        ));

        let waiter = tokio::spawn(session.metadata_ready().wait());
        tokio::time::sleep(Duration::from_millis(10)).await;
        engine.publish(d.clone());
        waiter.await.unwrap().unwrap();

        assert_eq!(session.display_name(), "Album");
        assert_eq!(session.files().unwrap().len(), 1);
        assert_eq!(session.serialize_descriptor().unwrap(), d.encode());
    }

    #[test]
    fn test_known_descriptor_is_ready_immediately() {
        let engine = LocalEngine::new();
        let d = descriptor("Known");
        engine.publish(d.clone());

        let (session, is_new) = engine.add_by_fingerprint(d.fingerprint());
        assert!(is_new);
        assert!(session.metadata_ready().is_ready());
    }

    #[test]
    fn test_magnet_name_and_hints_before_metadata() {
        let engine = LocalEngine::new();
        let d = descriptor("Real Name");
        let uri = MagnetUri::parse(&format!(
            "magnet:?xt=urn:btih:{}&dn=Guess&tr=udp://one",
            d.fingerprint()
        ))
        .unwrap();

        let session = engine.add_by_uri(&uri).unwrap();
        assert_eq!(session.display_name(), "Guess");

        engine.add_by_descriptor(d).unwrap();
        assert_eq!(session.display_name(), "Real Name");

        let stored = SessionDescriptor::decode(&session.serialize_descriptor().unwrap()).unwrap();
        assert_eq!(stored.trackers(), &[vec!["udp://one".to_string()]]);
    }

    #[test]
    fn test_mismatched_descriptor_is_ignored() {
        let engine = LocalEngine::new();
        let fp = Fingerprint::new([8u8; 20]);
        let (session, _) = engine.add_by_fingerprint(fp);
        engine.publish(descriptor("Other"));
        assert!(!session.metadata_ready().is_ready());
    }

    #[test]
    fn test_resolve_rejects_foreign_descriptor() {
        let fp = Fingerprint::new([8u8; 20]);
        let session = LocalSession::new(fp, None);
        let other = descriptor("Other");
        match session.resolve(other.clone()) {
            Err(EngineError::FingerprintMismatch { expected, actual }) => {
                assert_eq!(expected, fp);
                assert_eq!(actual, other.fingerprint());
            }
            result => panic!("unexpected result: {result:?}"),
        }
        assert!(!session.is_ready());
        assert!(session.serialize_descriptor().is_err());
    }

    #[tokio::test]
    async fn test_reader_without_library_is_unavailable() {
        let engine = LocalEngine::new();
        let session = engine.add_by_descriptor(descriptor("Album")).unwrap();
        let files = session.files().unwrap();
        assert!(matches!(
            files[0].new_reader().await,
            Err(EngineError::Unavailable(_))
        ));
    }
}
