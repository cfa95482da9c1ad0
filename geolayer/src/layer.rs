//! Named collections of geometries sharing one encoder, index and CRS.

use log::{debug, info};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::bridge::{to_coordinate, to_geometry, CoordinateInput, TaggedGeometry};
use crate::common::WriterLock;
use crate::config::IndexConfig;
use crate::crs::Crs;
use crate::encoder::{EncoderCatalog, GeometryEncoder};
use crate::errors::{ErrorKind, GeoError, GeoResult};
use crate::filter::{DistanceModel, SearchFilter};
use crate::geometry::{Envelope, Geometry};
use crate::index::SpatialIndex;
use crate::pipeline::GeoPipeline;
use crate::rtree::{IntegrityReport, RTreeStats};
use crate::store::{Record, RecordId, RecordSource, RecordStore, Snapshot, Transaction, Value};

/// Index kind recorded for every layer.
pub const RTREE_INDEX_KIND: &str = "rtree";

const NAME_FIELD: &str = "name";
const ENCODER_FIELD: &str = "encoder";
const ENCODER_CONFIG_FIELD: &str = "encoder_config";
const INDEX_FIELD: &str = "index";
const CRS_FIELD: &str = "crs";
const ATTRIBUTES_FIELD: &str = "attributes";

/// Persisted description of a layer, kept in the store catalog.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LayerMetadata {
    pub(crate) name: String,
    pub(crate) encoder_kind: String,
    pub(crate) encoder_config: String,
    pub(crate) index_kind: String,
    pub(crate) crs: Option<Crs>,
    pub(crate) attributes: Vec<String>,
}

impl LayerMetadata {
    pub(crate) fn to_record(&self, id: RecordId) -> Record {
        let mut record = Record::new(id);
        record.put(NAME_FIELD, self.name.as_str());
        record.put(ENCODER_FIELD, self.encoder_kind.as_str());
        record.put(ENCODER_CONFIG_FIELD, self.encoder_config.as_str());
        record.put(INDEX_FIELD, self.index_kind.as_str());
        record.put(CRS_FIELD, self.crs.map(|crs| i64::from(crs.code())));
        record.put(
            ATTRIBUTES_FIELD,
            Value::Array(
                self.attributes
                    .iter()
                    .map(|name| Value::from(name.as_str()))
                    .collect(),
            ),
        );
        record
    }

    pub(crate) fn from_record(record: &Record) -> GeoResult<LayerMetadata> {
        let text = |field: &str| -> GeoResult<String> {
            record
                .get(field)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| corrupt_metadata(record, field))
        };
        let crs = match record.get(CRS_FIELD) {
            None | Some(Value::Null) => None,
            Some(value) => {
                let code = value
                    .as_i64()
                    .and_then(|code| u32::try_from(code).ok())
                    .ok_or_else(|| corrupt_metadata(record, CRS_FIELD))?;
                Some(Crs::from_srid(code)?)
            }
        };
        let attributes = match record.get(ATTRIBUTES_FIELD).and_then(Value::as_array) {
            Some(items) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| corrupt_metadata(record, ATTRIBUTES_FIELD))
                })
                .collect::<GeoResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(LayerMetadata {
            name: text(NAME_FIELD)?,
            encoder_kind: text(ENCODER_FIELD)?,
            encoder_config: text(ENCODER_CONFIG_FIELD)?,
            index_kind: text(INDEX_FIELD)?,
            crs,
            attributes,
        })
    }
}

fn corrupt_metadata(record: &Record, field: &str) -> GeoError {
    GeoError::new(
        &format!(
            "Layer metadata record {} has an invalid '{}' field",
            record.id(),
            field
        ),
        ErrorKind::FileCorrupted,
    )
}

/// A named, independently indexed collection of geometries.
///
/// Handles are cheap to clone. Writes through any handle for the same
/// layer are serialized by a per-layer writer lock, and each write commits
/// its record and index changes in one transaction.
#[derive(Clone)]
pub struct Layer {
    inner: Arc<LayerInner>,
}

struct LayerInner {
    name: String,
    catalog_id: RecordId,
    crs: Option<Crs>,
    encoder_kind: String,
    index: SpatialIndex,
    store: RecordStore,
    config: IndexConfig,
    write_lock: WriterLock,
}

impl Layer {
    /// Builds a handle bound to the catalog entry `catalog_id`. Once that
    /// entry is gone, even if a layer of the same name replaces it, every
    /// operation through the handle fails with `NotFound`.
    pub(crate) fn open(
        store: &RecordStore,
        catalog_id: RecordId,
        metadata: &LayerMetadata,
        catalog: &EncoderCatalog,
        config: IndexConfig,
    ) -> GeoResult<Layer> {
        if metadata.index_kind != RTREE_INDEX_KIND {
            return Err(GeoError::new(
                &format!("Unknown index kind: {}", metadata.index_kind),
                ErrorKind::ConfigurationError,
            ));
        }
        let encoder = catalog.create(&metadata.encoder_kind, &metadata.encoder_config)?;
        Ok(Layer {
            inner: Arc::new(LayerInner {
                name: metadata.name.clone(),
                catalog_id,
                crs: metadata.crs,
                encoder_kind: metadata.encoder_kind.clone(),
                index: SpatialIndex::new(&metadata.name, encoder, config),
                store: store.clone(),
                config,
                write_lock: store.writer_lock(&metadata.name),
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn crs(&self) -> Option<Crs> {
        self.inner.crs
    }

    pub fn encoder(&self) -> &GeometryEncoder {
        self.inner.index.encoder()
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.inner.index
    }

    /// The encoder discriminator the layer was created with.
    pub fn encoder_kind(&self) -> &str {
        &self.inner.encoder_kind
    }

    pub fn signature(&self) -> String {
        let crs = self.crs().map_or("unset", |crs| crs.name());
        format!(
            "EditableLayer(name='{}', encoder={}, crs={})",
            self.name(),
            self.encoder().signature(),
            crs
        )
    }

    /// Names of the non-geometric fields carried by each feature.
    pub fn attribute_names(&self) -> GeoResult<Vec<String>> {
        let snapshot = self.snapshot()?;
        let entry = snapshot
            .catalog_entry(self.name())
            .ok_or_else(|| no_such_layer(self.name()))?;
        Ok(LayerMetadata::from_record(entry)?.attributes)
    }

    /// Replaces the attribute name list as a whole.
    pub fn set_attribute_names(&self, names: Vec<String>) -> GeoResult<()> {
        self.write(|tx| {
            let entry = tx
                .catalog_entry(self.name())
                .ok_or_else(|| no_such_layer(self.name()))?;
            let mut metadata = LayerMetadata::from_record(&entry)?;
            metadata.attributes = names;
            tx.put_catalog_entry(self.name(), metadata.to_record(entry.id()))
        })
    }

    /// Encodes and indexes one geometry, returning the stored record.
    pub fn add(&self, geometry: &Geometry) -> GeoResult<Record> {
        self.add_feature(geometry, &BTreeMap::new())
    }

    /// Encodes and indexes one geometry carrying attribute values.
    pub fn add_feature(
        &self,
        geometry: &Geometry,
        attributes: &BTreeMap<String, Value>,
    ) -> GeoResult<Record> {
        self.write(|tx| {
            let record = self.encode_new(geometry, attributes, tx)?;
            self.index().insert(tx, &record)?;
            Ok(record)
        })
    }

    /// Parses WKT and adds the resulting geometry.
    pub fn add_wkt(&self, wkt: &str) -> GeoResult<Record> {
        let geometry = to_geometry(&CoordinateInput::from(wkt))?;
        self.add(&geometry)
    }

    /// Parses every text first, then adds them all in batches.
    pub fn add_wkts(&self, wkts: &[&str]) -> GeoResult<Vec<Record>> {
        let geometries = wkts
            .iter()
            .map(|wkt| to_geometry(&CoordinateInput::from(*wkt)))
            .collect::<GeoResult<Vec<_>>>()?;
        self.add_all(&geometries)
    }

    /// Adds many geometries with bulk index loading.
    ///
    /// Work is committed in chunks of `bulk_batch_size`. A failure aborts
    /// only the chunk it occurs in; chunks committed before it stay.
    pub fn add_all(&self, geometries: &[Geometry]) -> GeoResult<Vec<Record>> {
        let mut added = Vec::with_capacity(geometries.len());
        let no_attributes = BTreeMap::new();
        for (n, chunk) in geometries.chunks(self.batch_size()).enumerate() {
            let records = self.write(|tx| {
                let mut records = Vec::with_capacity(chunk.len());
                for geometry in chunk {
                    records.push(self.encode_new(geometry, &no_attributes, tx)?);
                }
                self.index().bulk_insert(tx, &records)?;
                Ok(records)
            })?;
            debug!(
                "Committed chunk {} of {} geometries to layer '{}'",
                n,
                records.len(),
                self.name()
            );
            added.extend(records);
        }
        Ok(added)
    }

    /// Indexes a record whose geometry fields were written by other means.
    pub fn index_existing(&self, id: RecordId) -> GeoResult<Envelope> {
        self.write(|tx| {
            let record = tx.record(id).ok_or_else(|| no_such_record(id))?;
            self.index().insert(tx, &record)
        })
    }

    /// Indexes many existing records, committed in batches.
    pub fn index_existing_all(&self, ids: &[RecordId]) -> GeoResult<usize> {
        let mut total = 0;
        for chunk in ids.chunks(self.batch_size()) {
            total += self.write(|tx| {
                let records = chunk
                    .iter()
                    .map(|id| tx.record(*id).ok_or_else(|| no_such_record(*id)))
                    .collect::<GeoResult<Vec<_>>>()?;
                self.index().bulk_insert(tx, &records)
            })?;
        }
        Ok(total)
    }

    /// Removes a feature and its index entry. Absent features are logged
    /// and reported as `false`.
    pub fn remove(&self, id: RecordId) -> GeoResult<bool> {
        self.write(|tx| self.remove_feature(tx, id, false))
    }

    /// Removes a feature, failing with `NotFound` when it is not indexed.
    pub fn remove_strict(&self, id: RecordId) -> GeoResult<()> {
        self.write(|tx| self.remove_feature(tx, id, true)).map(|_| ())
    }

    /// Decodes the geometry of a record of this layer.
    pub fn decode(&self, record: &Record) -> GeoResult<Geometry> {
        let snapshot = self.snapshot()?;
        self.encoder().decode(record, &snapshot)
    }

    /// Decodes a geometry together with its reference system.
    pub fn decode_tagged(&self, record: &Record) -> GeoResult<TaggedGeometry> {
        Ok(TaggedGeometry::tag(self.decode(record)?, self.crs()))
    }

    pub fn count(&self) -> GeoResult<u64> {
        let snapshot = self.snapshot()?;
        self.index().count(&snapshot)
    }

    pub fn check_integrity(&self) -> GeoResult<IntegrityReport> {
        let snapshot = self.snapshot()?;
        self.index().check_integrity(&snapshot)
    }

    pub fn stats(&self) -> GeoResult<RTreeStats> {
        let snapshot = self.snapshot()?;
        self.index().stats(&snapshot)
    }

    /// Starts a lazy pipeline over the layer as of now. Later commits are
    /// not observed by it.
    pub fn search(&self, filter: SearchFilter) -> GeoResult<GeoPipeline> {
        let snapshot = self.snapshot()?;
        let results = self.index().search(&snapshot, filter)?;
        Ok(GeoPipeline::from_search(results))
    }

    /// Features whose envelope lies entirely inside `envelope`.
    pub fn search_within_bbox(&self, envelope: Envelope) -> GeoResult<GeoPipeline> {
        self.search(SearchFilter::within_envelope(envelope))
    }

    /// Features sharing at least one point with `envelope`.
    pub fn search_intersect_window(&self, envelope: Envelope) -> GeoResult<GeoPipeline> {
        self.search(SearchFilter::intersects_window(envelope))
    }

    /// Features intersecting a geometry given in any accepted input form.
    pub fn search_intersects(&self, input: impl Into<CoordinateInput>) -> GeoResult<GeoPipeline> {
        let geometry = to_geometry(&input.into())?;
        self.search(SearchFilter::intersects(geometry))
    }

    /// Features lying inside a boundary geometry.
    pub fn search_within(&self, boundary: impl Into<CoordinateInput>) -> GeoResult<GeoPipeline> {
        let boundary = to_geometry(&boundary.into())?;
        self.search(SearchFilter::within(boundary))
    }

    /// Features within `max_distance` of a point, nearest first.
    ///
    /// Layers in a geographic (or unset) CRS measure kilometres along the
    /// great circle; Cartesian layers measure planar coordinate units.
    pub fn within_distance(
        &self,
        point: impl Into<CoordinateInput>,
        max_distance: f64,
    ) -> GeoResult<GeoPipeline> {
        let point = to_coordinate(&point.into())?;
        let model = DistanceModel::for_crs(self.crs());
        Ok(self
            .search(SearchFilter::nearest_neighbor(point, max_distance, model))?
            .sort(model.property_name()))
    }

    /// Deletes every feature, then the index, then the layer itself.
    pub fn delete(&self) -> GeoResult<usize> {
        let removed = self.write(|tx| {
            let ids = self.index().indexed_ids(tx);
            for id in &ids {
                if let Some(mut record) = tx.record(*id) {
                    self.encoder().release(&mut record, tx)?;
                    tx.delete_record(*id)?;
                }
            }
            self.index().drop_index(tx)?;
            tx.remove_catalog_entry(self.name())?;
            Ok(ids.len())
        })?;
        self.inner.store.release_writer_lock(self.name());
        info!("Deleted layer '{}' with {} features", self.name(), removed);
        Ok(removed)
    }

    fn batch_size(&self) -> usize {
        self.inner.config.bulk_batch_size.max(1)
    }

    /// Runs `f` in a fresh transaction under the layer's writer lock and
    /// commits on success. On error the transaction is dropped unapplied.
    fn write<T, F>(&self, f: F) -> GeoResult<T>
    where
        F: FnOnce(&mut Transaction) -> GeoResult<T>,
    {
        let _guard = self.inner.write_lock.lock();
        let mut tx = self.inner.store.begin()?;
        if !self.is_current(tx.catalog_entry(self.name()).as_ref()) {
            tx.rollback();
            return Err(no_such_layer(self.name()));
        }
        match f(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                tx.rollback();
                Err(e)
            }
        }
    }

    /// Pins the latest committed state, provided this handle's layer is
    /// still the one registered under its name.
    fn snapshot(&self) -> GeoResult<Snapshot> {
        let snapshot = self.inner.store.snapshot()?;
        if self.is_current(snapshot.catalog_entry(self.name())) {
            Ok(snapshot)
        } else {
            Err(no_such_layer(self.name()))
        }
    }

    fn is_current(&self, entry: Option<&Record>) -> bool {
        entry.map_or(false, |entry| entry.id() == self.inner.catalog_id)
    }

    fn encode_new(
        &self,
        geometry: &Geometry,
        attributes: &BTreeMap<String, Value>,
        tx: &mut Transaction,
    ) -> GeoResult<Record> {
        let mut record = tx.create_record();
        for (name, value) in attributes {
            record.put(name, value.clone());
        }
        self.encoder().encode(geometry, &mut record, tx)?;
        tx.put_record(record.clone())?;
        Ok(record)
    }

    fn remove_feature(&self, tx: &mut Transaction, id: RecordId, strict: bool) -> GeoResult<bool> {
        let removed = self.index().remove(tx, id, strict)?;
        if removed {
            if let Some(mut record) = tx.record(id) {
                self.encoder().release(&mut record, tx)?;
                tx.delete_record(id)?;
            }
        }
        Ok(removed)
    }
}

pub(crate) fn no_such_layer(name: &str) -> GeoError {
    GeoError::new(&format!("No such layer '{}'", name), ErrorKind::NotFound)
}

fn no_such_record(id: RecordId) -> GeoError {
    GeoError::new(&format!("No such record {}", id), ErrorKind::NotFound)
}
