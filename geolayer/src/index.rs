//! Per-layer spatial index over encoded records.

use log::{debug, warn};
use std::sync::Arc;

use crate::config::IndexConfig;
use crate::encoder::GeometryEncoder;
use crate::errors::{ErrorKind, GeoError, GeoResult};
use crate::filter::SearchFilter;
use crate::geometry::{Envelope, Geometry};
use crate::rtree::{EnvelopeCursor, IntegrityReport, RTree, RTreeStats};
use crate::store::{Record, RecordId, RecordSource, Snapshot, Transaction};

type PruneFn = Box<dyn Fn(&Envelope) -> bool + Send + Sync>;

/// The bounding-volume index of one layer.
///
/// The tree itself lives in the record store under the layer name, so index
/// changes commit atomically with the record changes of the same
/// transaction. This handle only carries what is needed to interpret it.
#[derive(Clone)]
pub struct SpatialIndex {
    inner: Arc<SpatialIndexInner>,
}

struct SpatialIndexInner {
    name: String,
    encoder: GeometryEncoder,
    config: IndexConfig,
}

impl SpatialIndex {
    pub fn new(name: &str, encoder: GeometryEncoder, config: IndexConfig) -> Self {
        SpatialIndex {
            inner: Arc::new(SpatialIndexInner {
                name: name.to_string(),
                encoder,
                config,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn encoder(&self) -> &GeometryEncoder {
        &self.inner.encoder
    }

    pub fn config(&self) -> &IndexConfig {
        &self.inner.config
    }

    /// Creates the empty tree, unless one already exists.
    pub fn create(&self, tx: &mut Transaction) -> GeoResult<()> {
        if tx.tree(self.name()).is_none() {
            let config = self.config();
            tx.put_tree(self.name(), RTree::new(config.max_entries, config.min_entries))?;
        }
        Ok(())
    }

    /// Indexes one record by the envelope of its decoded geometry.
    ///
    /// A record whose geometry cannot be decoded is rejected with
    /// `IndexError` before the tree is touched.
    pub fn insert(&self, tx: &mut Transaction, record: &Record) -> GeoResult<Envelope> {
        let envelope = self.envelope_for(record, &*tx)?;
        tx.tree_mut(self.name())?.insert(record.id(), envelope)?;
        Ok(envelope)
    }

    /// Indexes many records at once with sort-tile-recursive packing.
    ///
    /// Every record is decoded before the tree is touched, so a single bad
    /// geometry leaves the index unchanged.
    pub fn bulk_insert(&self, tx: &mut Transaction, records: &[Record]) -> GeoResult<usize> {
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            entries.push((record.id(), self.envelope_for(record, &*tx)?));
        }
        let count = entries.len();
        tx.tree_mut(self.name())?.bulk_load(entries)?;
        debug!("Bulk loaded {} entries into index '{}'", count, self.name());
        Ok(count)
    }

    /// Removes the entry for `id`.
    ///
    /// An absent entry is reported as `NotFound` when `strict`, otherwise it
    /// is logged and `Ok(false)` is returned.
    pub fn remove(&self, tx: &mut Transaction, id: RecordId, strict: bool) -> GeoResult<bool> {
        let removed = tx.tree_mut(self.name())?.remove(id)?;
        if !removed {
            if strict {
                return Err(GeoError::new(
                    &format!("Record {} is not indexed in layer '{}'", id, self.name()),
                    ErrorKind::NotFound,
                ));
            }
            warn!("Record {} is not indexed in layer '{}'", id, self.name());
        }
        Ok(removed)
    }

    /// Ids of every entry, as `tx` sees the tree.
    pub fn indexed_ids(&self, tx: &Transaction) -> Vec<RecordId> {
        match tx.tree(self.name()) {
            Some(tree) => tree.ids().collect(),
            None => Vec::new(),
        }
    }

    /// Discards the tree, returning whether it existed.
    pub fn drop_index(&self, tx: &mut Transaction) -> GeoResult<bool> {
        tx.drop_tree(self.name())
    }

    pub fn count(&self, snapshot: &Snapshot) -> GeoResult<u64> {
        Ok(self.tree(snapshot)?.len())
    }

    pub fn contains(&self, snapshot: &Snapshot, id: RecordId) -> GeoResult<bool> {
        Ok(self.tree(snapshot)?.contains(id))
    }

    /// Envelope covering every indexed entry.
    pub fn bounds(&self, snapshot: &Snapshot) -> GeoResult<Envelope> {
        Ok(self.tree(snapshot)?.bounds())
    }

    pub fn check_integrity(&self, snapshot: &Snapshot) -> GeoResult<IntegrityReport> {
        Ok(self.tree(snapshot)?.check_integrity())
    }

    pub fn stats(&self, snapshot: &Snapshot) -> GeoResult<RTreeStats> {
        Ok(self.tree(snapshot)?.stats())
    }

    /// Starts a lazy two-phase search against `snapshot`.
    ///
    /// Subtrees are opened only when their envelope passes the filter's
    /// prune test; each surviving entry is decoded and confirmed against its
    /// exact geometry as the results are pulled.
    pub fn search(&self, snapshot: &Snapshot, filter: SearchFilter) -> GeoResult<SearchResults> {
        let filter = Arc::new(filter);
        let prune_filter = filter.clone();
        let prune: PruneFn = Box::new(move |envelope| prune_filter.prune(envelope));
        let cursor = self.tree(snapshot)?.cursor(prune);
        debug!("Searching index '{}' with {:?}", self.name(), filter);
        Ok(SearchResults {
            cursor,
            filter,
            index: self.clone(),
            snapshot: snapshot.clone(),
            failed: false,
        })
    }

    fn tree<'a>(&self, snapshot: &'a Snapshot) -> GeoResult<&'a RTree> {
        snapshot.tree(self.name()).ok_or_else(|| {
            GeoError::new(
                &format!("No index for layer '{}'", self.name()),
                ErrorKind::NotFound,
            )
        })
    }

    fn envelope_for(&self, record: &Record, source: &dyn RecordSource) -> GeoResult<Envelope> {
        let geometry = self.inner.encoder.decode(record, source).map_err(|e| {
            GeoError::new_with_cause(
                &format!(
                    "Cannot index record {} in layer '{}'",
                    record.id(),
                    self.name()
                ),
                ErrorKind::IndexError,
                e,
            )
        })?;
        Ok(geometry.envelope())
    }
}

/// One confirmed search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub record: Record,
    pub geometry: Geometry,
    /// Distance from the query point for nearest-neighbour searches.
    pub distance: Option<f64>,
}

/// Lazy sequence of search results over one snapshot.
///
/// Dropping it at any point releases the pinned snapshot. After the first
/// error the sequence ends.
pub struct SearchResults {
    cursor: EnvelopeCursor<PruneFn>,
    filter: Arc<SearchFilter>,
    index: SpatialIndex,
    snapshot: Snapshot,
    failed: bool,
}

impl SearchResults {
    pub fn search_filter(&self) -> &SearchFilter {
        &self.filter
    }

    fn fail(&mut self, error: GeoError) -> Option<GeoResult<SearchHit>> {
        self.failed = true;
        Some(Err(error))
    }
}

impl Iterator for SearchResults {
    type Item = GeoResult<SearchHit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            let entry = match self.cursor.next()? {
                Ok(entry) => entry,
                Err(e) => return self.fail(e),
            };
            let Some(record) = self.snapshot.record(entry.id) else {
                return self.fail(GeoError::new(
                    &format!(
                        "Index '{}' references missing record {}",
                        self.index.name(),
                        entry.id
                    ),
                    ErrorKind::IndexError,
                ));
            };
            let geometry = match self.index.encoder().decode(&record, &self.snapshot) {
                Ok(geometry) => geometry,
                Err(e) => return self.fail(e),
            };
            if let Some(found) = self.filter.confirm(&geometry) {
                return Some(Ok(SearchHit {
                    record,
                    geometry,
                    distance: found.distance,
                }));
            }
        }
    }
}
