//! Session registry
//!
//! Indexes live sessions by fingerprint and makes each one durable exactly
//! once. Tracking waits for metadata outside any lock; the persist-and-index
//! step then runs under a single exclusive section on a blocking thread, so it
//! completes even if the caller that started it goes away.

use crate::context::TrackContext;
use crate::errors::*;
use parking_lot::{Mutex, RwLock};
use peerhttp_descriptor::SessionDescriptor;
use peerhttp_engine::{ContentEngine, SessionHandle, SessionRef};
use peerhttp_storage::DescriptorStore;
use peerhttp_types::{Fingerprint, MagnetUri};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome of [`SessionRegistry::load`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Arc<dyn ContentEngine>,
    store: Arc<dyn DescriptorStore>,
    /// Canonical fingerprint string → session
    sessions: RwLock<HashMap<String, SessionRef>>,
    /// Spans persist + index as one unit.
    persist: Mutex<()>,
    peer_hints: Vec<Vec<String>>,
}

impl SessionRegistry {
    pub fn new(
        engine: Arc<dyn ContentEngine>,
        store: Arc<dyn DescriptorStore>,
        peer_hints: Vec<Vec<String>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine,
                store,
                sessions: RwLock::new(HashMap::new()),
                persist: Mutex::new(()),
                peer_hints,
            }),
        }
    }

    /// Re-attach every stored session. Bad records are logged and skipped.
    pub fn load(&self) -> Result<LoadReport> {
        let mut records = Vec::new();
        self.inner
            .store
            .for_each(&mut |key, value| records.push((key.to_vec(), value.to_vec())))?;

        let mut report = LoadReport::default();
        for (key, blob) in records {
            match self.inner.attach(&key, &blob) {
                Ok(handle) => {
                    let fingerprint = handle.fingerprint();
                    self.inner
                        .sessions
                        .write()
                        .insert(fingerprint.to_hex(), handle);
                    report.loaded += 1;
                }
                Err(err) => {
                    warn!(key = %hex::encode(&key), error = %err, "skipping stored session");
                    report.skipped += 1;
                }
            }
        }

        metrics::gauge!("peerhttp_registry_sessions").set(self.len() as f64);
        info!(
            loaded = report.loaded,
            skipped = report.skipped,
            "session registry loaded"
        );
        Ok(report)
    }

    /// Wait for `handle` to have metadata, then persist and index it.
    ///
    /// Returns the indexed handle. If the fingerprint is already indexed the
    /// existing handle is returned without touching the store.
    pub async fn track_by_handle(&self, ctx: &TrackContext, handle: SessionRef) -> Result<SessionRef> {
        let fingerprint = handle.fingerprint();
        if let Some(existing) = self.lookup_fingerprint(&fingerprint) {
            return Ok(existing);
        }

        if ctx.is_done() {
            return Err(RegistryError::Timeout { fingerprint });
        }

        let ready = handle.metadata_ready();
        if !ready.is_ready() {
            debug!(fingerprint = %fingerprint, "waiting for metadata");
            tokio::select! {
                biased;
                result = ready.wait() => result?,
                _ = ctx.done() => {
                    metrics::counter!("peerhttp_registry_track_timeouts_total").increment(1);
                    return Err(RegistryError::Timeout { fingerprint });
                }
            }
        }

        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.persist_and_index(handle))
            .await
            .map_err(|err| RegistryError::Task(err.to_string()))?
    }

    pub async fn track_by_fingerprint(
        &self,
        ctx: &TrackContext,
        fingerprint: Fingerprint,
    ) -> Result<SessionRef> {
        let (handle, is_new) = self.inner.engine.add_by_fingerprint(fingerprint);
        debug!(fingerprint = %fingerprint, is_new, "tracking by fingerprint");
        self.track_by_handle(ctx, handle).await
    }

    pub async fn track_by_uri(&self, ctx: &TrackContext, uri: &MagnetUri) -> Result<SessionRef> {
        let handle = self.inner.engine.add_by_uri(uri)?;
        debug!(fingerprint = %uri.fingerprint, "tracking by uri");
        self.track_by_handle(ctx, handle).await
    }

    /// Look up by canonical (lower-case hex) fingerprint. Never waits.
    pub fn lookup(&self, fingerprint: &str) -> Option<SessionRef> {
        self.inner.sessions.read().get(fingerprint).cloned()
    }

    pub fn lookup_fingerprint(&self, fingerprint: &Fingerprint) -> Option<SessionRef> {
        self.lookup(&fingerprint.to_hex())
    }

    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flush the durable store. Called once on shutdown.
    pub fn close(&self) -> Result<()> {
        self.inner.store.flush()?;
        info!(sessions = self.len(), "session registry closed");
        Ok(())
    }
}

impl Inner {
    fn attach(&self, key: &[u8], blob: &[u8]) -> Result<SessionRef> {
        let fingerprint = Fingerprint::from_slice(key)
            .map_err(|err| RegistryError::InvalidInput(err.to_string()))?;
        let descriptor = SessionDescriptor::decode(blob)?;
        if descriptor.fingerprint() != fingerprint {
            return Err(RegistryError::InvalidInput(format!(
                "record keyed {} holds descriptor for {}",
                fingerprint,
                descriptor.fingerprint()
            )));
        }
        Ok(self.engine.add_by_descriptor(descriptor)?)
    }

    fn persist_and_index(&self, handle: SessionRef) -> Result<SessionRef> {
        let _section = self.persist.lock();

        let fingerprint = handle.fingerprint();
        let key = fingerprint.to_hex();
        if let Some(existing) = self.sessions.read().get(&key) {
            return Ok(existing.clone());
        }

        let blob = handle.serialize_descriptor()?;
        self.store
            .put(&fingerprint, &blob)
            .map_err(|source| RegistryError::Persistence {
                fingerprint,
                source,
            })?;
        handle.add_peer_hints(&self.peer_hints);

        let count = {
            let mut sessions = self.sessions.write();
            sessions.insert(key, handle.clone());
            sessions.len()
        };

        metrics::counter!("peerhttp_registry_persisted_total").increment(1);
        metrics::gauge!("peerhttp_registry_sessions").set(count as f64);
        info!(
            fingerprint = %fingerprint,
            name = %handle.display_name(),
            bytes = blob.len(),
            "session tracked"
        );
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use peerhttp_engine::LocalEngine;
    use peerhttp_storage::MemoryStore;
    use peerhttp_types::FileEntry;
    use std::time::Duration;

    fn descriptor(name: &str) -> SessionDescriptor {
        SessionDescriptor::build(
            name,
            vec![
                FileEntry::new(vec!["01 - a.mp3".into()], 10),
                FileEntry::new(vec!["02 - b.mp3".into()], 20),
            ],
            16,
            vec![0u8; 40],
        )
        .unwrap()
    }

    fn registry() -> (SessionRegistry, LocalEngine, MemoryStore) {
        let engine = LocalEngine::new();
        let store = MemoryStore::new();
        let registry = SessionRegistry::new(
            Arc::new(engine.clone()),
            Arc::new(store.clone()),
            vec![vec!["udp://hint".to_string()]],
        );
        (registry, engine, store)
    }

    #[tokio::test]
    async fn test_track_persists_and_indexes() {
        let (registry, engine, store) = registry();
        let d = descriptor("Album");
        engine.publish(d.clone());

        let handle = registry
            .track_by_fingerprint(&TrackContext::new(), d.fingerprint())
            .await
            .unwrap();

        assert_eq!(handle.fingerprint(), d.fingerprint());
        assert!(registry.lookup(&d.fingerprint().to_hex()).is_some());
        assert_eq!(store.write_count(), 1);

        let stored = SessionDescriptor::decode(&store.get(&d.fingerprint()).unwrap().unwrap()).unwrap();
        assert_eq!(stored.files(), d.files());
    }

    #[tokio::test]
    async fn test_peer_hints_added_after_tracking() {
        let (registry, engine, _store) = registry();
        let d = descriptor("Hinted");
        engine.publish(d.clone());

        let handle = registry
            .track_by_fingerprint(&TrackContext::new(), d.fingerprint())
            .await
            .unwrap();
        let current = SessionDescriptor::decode(&handle.serialize_descriptor().unwrap()).unwrap();
        assert_eq!(current.trackers(), &[vec!["udp://hint".to_string()]]);
    }

    #[tokio::test]
    async fn test_second_track_is_not_persisted_again() {
        let (registry, engine, store) = registry();
        let d = descriptor("Twice");
        engine.publish(d.clone());

        let ctx = TrackContext::new();
        registry.track_by_fingerprint(&ctx, d.fingerprint()).await.unwrap();
        registry.track_by_fingerprint(&ctx, d.fingerprint()).await.unwrap();
        assert_eq!(store.write_count(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_context_skips_ready_session() {
        let (registry, engine, store) = registry();
        let d = descriptor("Late");
        engine.publish(d.clone());

        let ctx = TrackContext::new();
        ctx.cancel();
        let err = registry
            .track_by_fingerprint(&ctx, d.fingerprint())
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::Timeout { .. }));
        assert_eq!(store.write_count(), 0);
        assert!(registry.lookup_fingerprint(&d.fingerprint()).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_no_state() {
        let (registry, _engine, store) = registry();
        let fp = Fingerprint::new([4u8; 20]);

        let err = registry
            .track_by_fingerprint(&TrackContext::with_timeout(Duration::from_secs(5)), fp)
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::Timeout { fingerprint } if fingerprint == fp));
        assert_eq!(store.write_count(), 0);
        assert!(registry.lookup_fingerprint(&fp).is_none());
    }

    #[test]
    fn test_load_skips_corrupt_records() {
        let (registry, engine, store) = registry();
        let good = descriptor("Good");
        store.put(&good.fingerprint(), &good.encode()).unwrap();
        store.put(&Fingerprint::new([1u8; 20]), b"not bencode").unwrap();
        store.insert_raw(b"short-key", &good.encode());
        // Valid blob stored under the wrong key.
        store
            .put(&Fingerprint::new([2u8; 20]), &descriptor("Other").encode())
            .unwrap();

        let report = registry.load().unwrap();
        assert_eq!(report, LoadReport { loaded: 1, skipped: 3 });
        assert!(registry.lookup_fingerprint(&good.fingerprint()).is_some());
        assert_eq!(engine.session_count(), 1);
    }
}
