use parking_lot::RwLock;
use peerhttp_types::Fingerprint;
use sled::{Db, Tree};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// File name of the database inside the work directory.
pub const DB_NAME: &str = ".app.sled.db";
/// Single logical namespace holding session descriptors.
pub const DESCRIPTOR_TREE: &str = "torrent_info";

/// Storage errors
#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Database did not open within {0:?}")]
    OpenTimeout(Duration),
    #[error("Storage task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Durable fingerprint → descriptor blob mapping.
///
/// Keys are the raw fingerprint bytes. Implementations must make each `put`
/// atomic and durable before returning.
pub trait DescriptorStore: Send + Sync {
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>>;
    fn put(&self, fingerprint: &Fingerprint, blob: &[u8]) -> Result<()>;
    /// Visit every record. Keys are passed raw so callers can reject malformed ones.
    fn for_each(&self, visit: &mut dyn FnMut(&[u8], &[u8])) -> Result<()>;
    fn len(&self) -> Result<usize>;
    fn flush(&self) -> Result<()>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

/// Sled-backed implementation
pub struct SledStore {
    db: Db,
    descriptors: Tree,
    path: PathBuf,
}

impl SledStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let db = sled::open(&path)?;
        let descriptors = db.open_tree(DESCRIPTOR_TREE)?;
        info!(path = %path.display(), records = descriptors.len(), "descriptor store opened");
        Ok(Self {
            db,
            descriptors,
            path,
        })
    }

    /// Open `<work_dir>/.app.sled.db` on a blocking thread, giving up after `timeout`.
    pub async fn open_in(work_dir: &Path, timeout: Duration) -> Result<Self> {
        let path = work_dir.join(DB_NAME);
        let task = tokio::task::spawn_blocking(move || Self::new(path));
        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(StorageError::Task(join.to_string())),
            Err(_) => Err(StorageError::OpenTimeout(timeout)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DescriptorStore for SledStore {
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>> {
        Ok(self
            .descriptors
            .get(fingerprint.as_bytes())?
            .map(|v| v.to_vec()))
    }

    fn put(&self, fingerprint: &Fingerprint, blob: &[u8]) -> Result<()> {
        self.descriptors.insert(fingerprint.as_bytes(), blob)?;
        self.descriptors.flush()?;
        debug!(fingerprint = %fingerprint, bytes = blob.len(), "descriptor persisted");
        Ok(())
    }

    fn for_each(&self, visit: &mut dyn FnMut(&[u8], &[u8])) -> Result<()> {
        for entry in self.descriptors.iter() {
            let (key, value) = entry?;
            visit(key.as_ref(), value.as_ref());
        }
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.descriptors.len())
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
    writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put` calls that reached the store.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Insert a raw record, bypassing key validation.
    pub fn insert_raw(&self, key: &[u8], value: &[u8]) {
        self.records.write().insert(key.to_vec(), value.to_vec());
    }
}

impl DescriptorStore for MemoryStore {
    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>> {
        Ok(self.records.read().get(&fingerprint.as_bytes()[..]).cloned())
    }

    fn put(&self, fingerprint: &Fingerprint, blob: &[u8]) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.records
            .write()
            .insert(fingerprint.as_bytes().to_vec(), blob.to_vec());
        Ok(())
    }

    fn for_each(&self, visit: &mut dyn FnMut(&[u8], &[u8])) -> Result<()> {
        let records = self.records.read().clone();
        for (key, value) in &records {
            visit(key.as_slice(), value.as_slice());
        }
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records.read().len())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_counts_writes() {
        let store = MemoryStore::new();
        let fp = Fingerprint::new([1u8; 20]);
        store.put(&fp, b"one").unwrap();
        store.put(&fp, b"two").unwrap();
        assert_eq!(store.write_count(), 2);
        assert_eq!(store.len().unwrap(), 1);
        assert_eq!(store.get(&fp).unwrap().as_deref(), Some(&b"two"[..]));
    }

    #[test]
    fn test_memory_store_iterates_raw_keys() {
        let store = MemoryStore::new();
        store.insert_raw(b"short", b"junk");
        store.put(&Fingerprint::new([2u8; 20]), b"blob").unwrap();

        let mut seen = Vec::new();
        store
            .for_each(&mut |k, v| seen.push((k.len(), v.to_vec())))
            .unwrap();
        seen.sort();
        assert_eq!(seen, vec![(5, b"junk".to_vec()), (20, b"blob".to_vec())]);
    }
}
