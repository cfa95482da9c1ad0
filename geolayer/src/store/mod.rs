//! Transactional record store.
//!
//! The store keeps one immutable [`StoreState`] per committed version behind
//! an `Arc`. Readers pin a version with a [`Snapshot`] and never block;
//! a [`Transaction`] buffers its changes and publishes them in a single
//! atomic swap on commit. Records, layer catalog entries and index trees are
//! all part of the same state, so they always change together.

mod persistence;
mod record;
mod transaction;
mod value;

use im::OrdMap;
use log::{debug, info};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::common::{LockRegistry, WriterLock};
use crate::config::StoreConfig;
use crate::errors::{ErrorKind, GeoError, GeoResult};
use crate::rtree::RTree;

pub use record::{Record, RecordId};
pub use transaction::Transaction;
pub use value::{compare_values, Value};

use transaction::ChangeSet;

/// Read access to records, shared by snapshots and transactions.
pub trait RecordSource {
    fn record(&self, id: RecordId) -> Option<Record>;
}

/// One committed version of everything in the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoreState {
    pub(crate) records: OrdMap<RecordId, Record>,
    pub(crate) catalog: OrdMap<String, Record>,
    pub(crate) trees: OrdMap<String, RTree>,
    pub(crate) next_id: u64,
    pub(crate) version: u64,
}

impl Default for StoreState {
    fn default() -> Self {
        StoreState {
            records: OrdMap::new(),
            catalog: OrdMap::new(),
            trees: OrdMap::new(),
            next_id: 1,
            version: 0,
        }
    }
}

/// Handle onto a record store. Clones share the same store.
#[derive(Clone)]
pub struct RecordStore {
    inner: Arc<RecordStoreInner>,
}

struct RecordStoreInner {
    state: RwLock<Arc<StoreState>>,
    id_sequence: AtomicU64,
    readers: Arc<AtomicUsize>,
    closed: AtomicBool,
    dirty: AtomicBool,
    file_path: Option<PathBuf>,
    writer_locks: LockRegistry,
}

impl RecordStore {
    /// Opens the store described by `config`, loading the persisted image
    /// when the configured file exists.
    pub fn open(config: &StoreConfig) -> GeoResult<RecordStore> {
        let state = match &config.file_path {
            Some(path) if path.exists() => {
                let state = persistence::read_state(path)?;
                info!(
                    "Opened store at {} (version {}, {} records)",
                    path.display(),
                    state.version,
                    state.records.len()
                );
                state
            }
            Some(path) => {
                info!("Creating new store at {}", path.display());
                StoreState::default()
            }
            None => StoreState::default(),
        };
        Ok(Self::from_state(state, config.file_path.clone()))
    }

    /// Creates a store that lives only in memory.
    pub fn in_memory() -> RecordStore {
        Self::from_state(StoreState::default(), None)
    }

    fn from_state(state: StoreState, file_path: Option<PathBuf>) -> RecordStore {
        RecordStore {
            inner: Arc::new(RecordStoreInner {
                id_sequence: AtomicU64::new(state.next_id),
                state: RwLock::new(Arc::new(state)),
                readers: Arc::new(AtomicUsize::new(0)),
                closed: AtomicBool::new(false),
                dirty: AtomicBool::new(false),
                file_path,
                writer_locks: LockRegistry::new(),
            }),
        }
    }

    /// Starts a transaction based on the latest committed state.
    pub fn begin(&self) -> GeoResult<Transaction> {
        self.check_closed()?;
        Ok(Transaction::new(self.clone(), self.current()))
    }

    /// Pins the latest committed state for reading.
    pub fn snapshot(&self) -> GeoResult<Snapshot> {
        self.check_closed()?;
        self.inner.readers.fetch_add(1, Ordering::SeqCst);
        Ok(Snapshot {
            inner: Arc::new(SnapshotInner {
                state: self.current(),
                readers: self.inner.readers.clone(),
            }),
        })
    }

    /// Version of the latest committed state.
    pub fn version(&self) -> u64 {
        self.inner.state.read().version
    }

    /// Number of snapshots currently alive.
    pub fn active_snapshots(&self) -> usize {
        self.inner.readers.load(Ordering::SeqCst)
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.inner.file_path.as_deref()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Writes the latest committed state to the backing file, if any.
    pub fn flush(&self) -> GeoResult<()> {
        self.check_closed()?;
        self.write_image()
    }

    /// Flushes and closes the store. Closing twice is a no-op.
    pub fn close(&self) -> GeoResult<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.write_image()?;
        info!("Store closed");
        Ok(())
    }

    /// Lock serializing the writers of the resource called `name`.
    pub(crate) fn writer_lock(&self, name: &str) -> WriterLock {
        self.inner.writer_locks.get_lock(name)
    }

    /// Forgets the writer lock of a deleted resource. Handles still holding
    /// the old lock keep it; a resource created later under the same name
    /// gets a fresh one.
    pub(crate) fn release_writer_lock(&self, name: &str) -> bool {
        self.inner.writer_locks.remove_lock(name)
    }

    #[cfg(test)]
    pub(crate) fn writer_lock_count(&self) -> usize {
        self.inner.writer_locks.lock_count()
    }

    pub(crate) fn next_record_id(&self) -> RecordId {
        RecordId::new(self.inner.id_sequence.fetch_add(1, Ordering::SeqCst))
    }

    fn current(&self) -> Arc<StoreState> {
        self.inner.state.read().clone()
    }

    fn check_closed(&self) -> GeoResult<()> {
        if self.is_closed() {
            return Err(GeoError::new("Store is closed", ErrorKind::StoreClosed));
        }
        Ok(())
    }

    fn write_image(&self) -> GeoResult<()> {
        let Some(path) = &self.inner.file_path else {
            return Ok(());
        };
        if !self.inner.dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let state = self.current();
        if let Err(e) = persistence::write_state(path, &state) {
            self.inner.dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        info!(
            "Flushed store version {} to {}",
            state.version,
            path.display()
        );
        Ok(())
    }

    /// Publishes a transaction's changes as the next committed version.
    ///
    /// Fails with `TransactionError`, publishing nothing, when an index tree
    /// or catalog entry the transaction touched changed since its base.
    pub(crate) fn apply(&self, base: &StoreState, changes: ChangeSet) -> GeoResult<u64> {
        self.check_closed()?;
        let mut guard = self.inner.state.write();
        let latest: &StoreState = &guard;

        for (name, base_version) in &changes.tree_bases {
            let current = latest.trees.get(name).map(RTree::version);
            if current != *base_version {
                return Err(GeoError::new(
                    &format!(
                        "Index of layer '{}' was changed by a concurrent transaction",
                        name
                    ),
                    ErrorKind::TransactionError,
                ));
            }
        }
        for name in changes.catalog.keys() {
            if latest.catalog.get(name) != base.catalog.get(name) {
                return Err(GeoError::new(
                    &format!(
                        "Catalog entry '{}' was changed by a concurrent transaction",
                        name
                    ),
                    ErrorKind::TransactionError,
                ));
            }
        }

        let mut next = latest.clone();
        for (id, change) in changes.records {
            match change {
                Some(record) => next.records.insert(id, record),
                None => next.records.remove(&id),
            };
        }
        for (name, change) in changes.catalog {
            match change {
                Some(entry) => next.catalog.insert(name, entry),
                None => next.catalog.remove(&name),
            };
        }
        for (name, change) in changes.trees {
            match change {
                Some(mut tree) => {
                    let current = latest.trees.get(&name).map_or(0, RTree::version);
                    tree.set_version(current.max(tree.version()) + 1);
                    next.trees.insert(name, tree);
                }
                None => {
                    next.trees.remove(&name);
                }
            }
        }
        next.next_id = next
            .next_id
            .max(self.inner.id_sequence.load(Ordering::SeqCst));
        next.version += 1;

        let version = next.version;
        *guard = Arc::new(next);
        self.inner.dirty.store(true, Ordering::SeqCst);
        debug!("Committed store version {}", version);
        Ok(version)
    }
}

/// An immutable view of one committed store version.
///
/// Holding a snapshot never blocks writers; it keeps its version alive until
/// the last clone is dropped.
#[derive(Clone)]
pub struct Snapshot {
    inner: Arc<SnapshotInner>,
}

struct SnapshotInner {
    state: Arc<StoreState>,
    readers: Arc<AtomicUsize>,
}

impl Drop for SnapshotInner {
    fn drop(&mut self) {
        self.readers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Snapshot {
    pub fn version(&self) -> u64 {
        self.inner.state.version
    }

    pub fn tree(&self, name: &str) -> Option<&RTree> {
        self.inner.state.trees.get(name)
    }

    pub fn catalog_entry(&self, name: &str) -> Option<&Record> {
        self.inner.state.catalog.get(name)
    }

    pub fn catalog_names(&self) -> Vec<String> {
        self.inner.state.catalog.keys().cloned().collect()
    }

    pub fn record_count(&self) -> usize {
        self.inner.state.records.len()
    }
}

impl RecordSource for Snapshot {
    fn record(&self, id: RecordId) -> Option<Record> {
        self.inner.state.records.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Envelope;
    use std::thread;
    use tempfile::tempdir;

    fn envelope(x: f64, y: f64) -> Envelope {
        Envelope::new(x, y, x, y)
    }

    #[test]
    fn test_commit_makes_changes_visible() {
        let store = RecordStore::in_memory();
        let mut tx = store.begin().unwrap();
        let mut record = tx.create_record();
        record.put("name", "a");
        let id = record.id();
        tx.put_record(record).unwrap();

        let before = store.snapshot().unwrap();
        tx.commit().unwrap();
        let after = store.snapshot().unwrap();

        assert!(before.record(id).is_none());
        assert_eq!(after.record(id).unwrap().get("name"), Some(&Value::from("a")));
        assert_eq!(after.version(), before.version() + 1);
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let store = RecordStore::in_memory();
        let id = {
            let mut tx = store.begin().unwrap();
            let record = tx.create_record();
            let id = record.id();
            tx.put_record(record).unwrap();
            id
        };
        assert!(store.snapshot().unwrap().record(id).is_none());
        assert_eq!(store.version(), 0);
    }

    #[test]
    fn test_record_ids_are_never_reused() {
        let store = RecordStore::in_memory();
        let mut tx = store.begin().unwrap();
        let first = tx.create_record().id();
        tx.rollback();
        let mut tx = store.begin().unwrap();
        let second = tx.create_record().id();
        assert!(second > first);
    }

    #[test]
    fn test_snapshot_counting() {
        let store = RecordStore::in_memory();
        assert_eq!(store.active_snapshots(), 0);
        let a = store.snapshot().unwrap();
        let b = store.snapshot().unwrap();
        let a2 = a.clone();
        assert_eq!(store.active_snapshots(), 2);
        drop(a);
        assert_eq!(store.active_snapshots(), 2);
        drop(a2);
        drop(b);
        assert_eq!(store.active_snapshots(), 0);
    }

    #[test]
    fn test_stale_tree_commit_conflicts() {
        let store = RecordStore::in_memory();
        let mut tx = store.begin().unwrap();
        tx.put_tree("roads", RTree::new(8, 3)).unwrap();
        tx.commit().unwrap();

        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        first
            .tree_mut("roads")
            .unwrap()
            .insert(RecordId::new(100), envelope(0.0, 0.0))
            .unwrap();
        second
            .tree_mut("roads")
            .unwrap()
            .insert(RecordId::new(101), envelope(1.0, 1.0))
            .unwrap();
        first.commit().unwrap();
        let err = second.commit().unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::TransactionError);

        let snapshot = store.snapshot().unwrap();
        let tree = snapshot.tree("roads").unwrap();
        assert!(tree.contains(RecordId::new(100)));
        assert!(!tree.contains(RecordId::new(101)));
    }

    #[test]
    fn test_snapshot_isolated_from_concurrent_writer() {
        let store = RecordStore::in_memory();
        let mut tx = store.begin().unwrap();
        tx.put_tree("pts", RTree::new(8, 3)).unwrap();
        tx.commit().unwrap();

        let snapshot = store.snapshot().unwrap();
        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..100u64 {
                    let mut tx = store.begin().unwrap();
                    tx.tree_mut("pts")
                        .unwrap()
                        .insert(RecordId::new(i + 1000), envelope(i as f64, 0.0))
                        .unwrap();
                    tx.commit().unwrap();
                }
            })
        };
        writer.join().unwrap();

        assert_eq!(snapshot.tree("pts").unwrap().len(), 0);
        assert_eq!(store.snapshot().unwrap().tree("pts").unwrap().len(), 100);
    }

    #[test]
    fn test_closed_store_rejects_operations() {
        let store = RecordStore::in_memory();
        store.close().unwrap();
        assert!(store.is_closed());
        assert_eq!(store.begin().err().unwrap().kind(), &ErrorKind::StoreClosed);
        assert_eq!(store.snapshot().err().unwrap().kind(), &ErrorKind::StoreClosed);
        assert!(store.close().is_ok());
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempdir().unwrap();
        let config = StoreConfig::file(dir.path().join("data.geo"));

        let id = {
            let store = RecordStore::open(&config).unwrap();
            let mut tx = store.begin().unwrap();
            let mut record = tx.create_record();
            record.put("x", 1.5);
            let id = record.id();
            tx.put_record(record).unwrap();
            let mut tree = RTree::new(8, 3);
            tree.insert(id, envelope(1.5, 0.0)).unwrap();
            tx.put_tree("layer", tree).unwrap();
            tx.commit().unwrap();
            store.close().unwrap();
            id
        };

        let store = RecordStore::open(&config).unwrap();
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.record(id).unwrap().get("x"), Some(&Value::F64(1.5)));
        assert!(snapshot.tree("layer").unwrap().contains(id));

        // new ids continue after the persisted ones
        let mut tx = store.begin().unwrap();
        assert!(tx.create_record().id() > id);
    }

    #[test]
    fn test_flush_without_changes_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.geo");
        let store = RecordStore::open(&StoreConfig::file(&path)).unwrap();
        store.flush().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_released_writer_lock_is_replaced() {
        let store = RecordStore::in_memory();
        let old = store.writer_lock("roads");
        store.writer_lock("rivers");
        assert_eq!(store.writer_lock_count(), 2);

        assert!(store.release_writer_lock("roads"));
        assert!(!store.release_writer_lock("roads"));
        assert_eq!(store.writer_lock_count(), 1);

        // a handle taken before the release still works
        drop(old.lock());
        store.writer_lock("roads");
        assert_eq!(store.writer_lock_count(), 2);
    }
}
