use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::errors::{ErrorKind, GeoError, GeoResult};
use crate::rtree::RTree;

use super::{Record, RecordId, RecordSource, RecordStore, StoreState};

/// Pending changes of one transaction. `None` marks a deletion.
#[derive(Default)]
pub(crate) struct ChangeSet {
    pub(crate) records: BTreeMap<RecordId, Option<Record>>,
    pub(crate) catalog: BTreeMap<String, Option<Record>>,
    pub(crate) trees: BTreeMap<String, Option<RTree>>,
    /// Version of each touched tree in the base state, checked on commit.
    pub(crate) tree_bases: BTreeMap<String, Option<u64>>,
}

impl ChangeSet {
    fn len(&self) -> usize {
        self.records.len() + self.catalog.len() + self.trees.len()
    }
}

/// A unit of atomic change against a [`RecordStore`].
///
/// Reads see the transaction's own writes layered over the state it began
/// from. Nothing is visible to anyone else until [`Transaction::commit`];
/// dropping an uncommitted transaction discards its changes.
pub struct Transaction {
    store: RecordStore,
    base: Arc<StoreState>,
    changes: ChangeSet,
    active: bool,
}

impl Transaction {
    pub(crate) fn new(store: RecordStore, base: Arc<StoreState>) -> Self {
        Transaction {
            store,
            base,
            changes: ChangeSet::default(),
            active: true,
        }
    }

    /// Allocates a fresh, empty record. It is stored only once passed to
    /// [`Transaction::put_record`].
    pub fn create_record(&mut self) -> Record {
        Record::new(self.store.next_record_id())
    }

    pub fn put_record(&mut self, record: Record) -> GeoResult<()> {
        self.ensure_active()?;
        self.changes.records.insert(record.id(), Some(record));
        Ok(())
    }

    /// Deletes a record, returning whether it existed.
    pub fn delete_record(&mut self, id: RecordId) -> GeoResult<bool> {
        self.ensure_active()?;
        let existed = self.record(id).is_some();
        if existed {
            self.changes.records.insert(id, None);
        }
        Ok(existed)
    }

    /// The index tree stored under `name`, as this transaction sees it.
    pub fn tree(&self, name: &str) -> Option<&RTree> {
        match self.changes.trees.get(name) {
            Some(change) => change.as_ref(),
            None => self.base.trees.get(name),
        }
    }

    /// Working copy of the tree under `name`, created on first access.
    pub fn tree_mut(&mut self, name: &str) -> GeoResult<&mut RTree> {
        self.ensure_active()?;
        if !self.changes.trees.contains_key(name) {
            let base = self.base.trees.get(name).cloned();
            if base.is_none() {
                return Err(no_such_tree(name));
            }
            self.note_tree_base(name);
            self.changes.trees.insert(name.to_string(), base);
        }
        match self.changes.trees.get_mut(name) {
            Some(Some(tree)) => Ok(tree),
            _ => Err(no_such_tree(name)),
        }
    }

    /// Stores `tree` under `name`, replacing any existing tree.
    pub fn put_tree(&mut self, name: &str, tree: RTree) -> GeoResult<()> {
        self.ensure_active()?;
        self.note_tree_base(name);
        self.changes.trees.insert(name.to_string(), Some(tree));
        Ok(())
    }

    /// Removes the tree under `name`, returning whether it existed.
    pub fn drop_tree(&mut self, name: &str) -> GeoResult<bool> {
        self.ensure_active()?;
        let existed = self.tree(name).is_some();
        self.note_tree_base(name);
        self.changes.trees.insert(name.to_string(), None);
        Ok(existed)
    }

    pub fn catalog_entry(&self, name: &str) -> Option<Record> {
        match self.changes.catalog.get(name) {
            Some(change) => change.clone(),
            None => self.base.catalog.get(name).cloned(),
        }
    }

    pub fn catalog_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .base
            .catalog
            .keys()
            .filter(|name| !self.changes.catalog.contains_key(*name))
            .cloned()
            .collect();
        names.extend(
            self.changes
                .catalog
                .iter()
                .filter(|(_, entry)| entry.is_some())
                .map(|(name, _)| name.clone()),
        );
        names.sort();
        names
    }

    pub fn put_catalog_entry(&mut self, name: &str, entry: Record) -> GeoResult<()> {
        self.ensure_active()?;
        self.changes.catalog.insert(name.to_string(), Some(entry));
        Ok(())
    }

    pub fn remove_catalog_entry(&mut self, name: &str) -> GeoResult<bool> {
        self.ensure_active()?;
        let existed = self.catalog_entry(name).is_some();
        self.changes.catalog.insert(name.to_string(), None);
        Ok(existed)
    }

    /// Number of buffered changes.
    pub fn pending_changes(&self) -> usize {
        self.changes.len()
    }

    /// Publishes every change atomically.
    ///
    /// Fails with `TransactionError` when a touched index or catalog entry
    /// was committed by someone else in the meantime; nothing is published
    /// in that case.
    pub fn commit(mut self) -> GeoResult<()> {
        self.ensure_active()?;
        self.active = false;
        let changes = std::mem::take(&mut self.changes);
        let count = changes.len();
        let version = self.store.apply(&self.base, changes)?;
        debug!("Transaction committed {} changes as version {}", count, version);
        Ok(())
    }

    /// Discards every change.
    pub fn rollback(mut self) {
        self.active = false;
        debug!("Transaction rolled back {} changes", self.changes.len());
        self.changes = ChangeSet::default();
    }

    fn ensure_active(&self) -> GeoResult<()> {
        if !self.active {
            return Err(GeoError::new(
                "Transaction is already finished",
                ErrorKind::TransactionError,
            ));
        }
        if self.store.is_closed() {
            return Err(GeoError::new("Store is closed", ErrorKind::StoreClosed));
        }
        Ok(())
    }

    fn note_tree_base(&mut self, name: &str) {
        if !self.changes.tree_bases.contains_key(name) {
            let version = self.base.trees.get(name).map(RTree::version);
            self.changes.tree_bases.insert(name.to_string(), version);
        }
    }
}

impl RecordSource for Transaction {
    fn record(&self, id: RecordId) -> Option<Record> {
        match self.changes.records.get(&id) {
            Some(change) => change.clone(),
            None => self.base.records.get(&id).cloned(),
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.active && self.changes.len() > 0 {
            warn!(
                "Transaction dropped without commit, rolling back {} changes",
                self.changes.len()
            );
        }
    }
}

fn no_such_tree(name: &str) -> GeoError {
    GeoError::new(
        &format!("No index for layer '{}'", name),
        ErrorKind::NotFound,
    )
}
