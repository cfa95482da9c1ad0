//! Database entry point tying the store, encoder catalog and layer registry together.

use log::info;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{GeoConfig, StoreConfig};
use crate::encoder::{EncoderCatalog, EncoderFactory};
use crate::errors::{ErrorKind, GeoError, GeoResult};
use crate::layer::Layer;
use crate::registry::LayerRegistry;
use crate::store::RecordStore;

/// A spatial database: a record store plus the layers defined in it.
///
/// Handles are cheap to clone and share one store.
///
/// ```rust,ignore
/// let db = SpatialDatabase::builder()
///     .file_path("/tmp/cities.db")
///     .open_or_create()?;
/// let cities = db.registry().create_point_layer("cities", "wgs84")?;
/// cities.add(&Geometry::point(4.9, 52.37))?;
/// db.close()?;
/// ```
#[derive(Clone)]
pub struct SpatialDatabase {
    inner: Arc<SpatialDatabaseInner>,
}

struct SpatialDatabaseInner {
    config: GeoConfig,
    store: RecordStore,
    registry: LayerRegistry,
}

impl SpatialDatabase {
    pub fn builder() -> SpatialDatabaseBuilder {
        SpatialDatabaseBuilder::new()
    }

    fn open(config: GeoConfig, catalog: EncoderCatalog) -> GeoResult<SpatialDatabase> {
        config.validate()?;
        let store = RecordStore::open(&config.store)?;
        let registry = LayerRegistry::new(store.clone(), catalog, config.index);
        info!(
            "Opened spatial database ({}) with {} layers",
            config
                .store
                .file_path
                .as_ref()
                .map_or("in memory".to_string(), |p| p.display().to_string()),
            registry.names()?.len()
        );
        Ok(SpatialDatabase {
            inner: Arc::new(SpatialDatabaseInner {
                config,
                store,
                registry,
            }),
        })
    }

    pub fn config(&self) -> &GeoConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &RecordStore {
        &self.inner.store
    }

    pub fn registry(&self) -> &LayerRegistry {
        &self.inner.registry
    }

    /// Shorthand for `registry().get(name)`.
    pub fn layer(&self, name: &str) -> GeoResult<Layer> {
        self.inner.registry.get(name)
    }

    /// Writes the latest committed state to the backing file, if any.
    pub fn flush(&self) -> GeoResult<()> {
        self.inner.store.flush()
    }

    /// Flushes and closes the store. Every later operation fails with
    /// `StoreClosed`.
    pub fn close(&self) -> GeoResult<()> {
        self.inner.store.close()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.store.is_closed()
    }
}

/// Fluent configuration of a [`SpatialDatabase`].
///
/// The first invalid setting is remembered and reported by
/// [`SpatialDatabaseBuilder::open_or_create`]; later settings are ignored.
pub struct SpatialDatabaseBuilder {
    error: Option<GeoError>,
    config: GeoConfig,
    catalog: EncoderCatalog,
}

impl SpatialDatabaseBuilder {
    pub fn new() -> Self {
        SpatialDatabaseBuilder {
            error: None,
            config: GeoConfig::default(),
            catalog: EncoderCatalog::standard(),
        }
    }

    /// Persists the database in `path`.
    pub fn file_path(mut self, path: impl Into<PathBuf>) -> Self {
        if self.error.is_none() {
            self.config.store = StoreConfig::file(path);
        }
        self
    }

    /// Keeps the database in memory only (the default).
    pub fn in_memory(mut self) -> Self {
        if self.error.is_none() {
            self.config.store = StoreConfig::in_memory();
        }
        self
    }

    /// Maximum entries per index node; at least 4.
    pub fn max_entries(mut self, max_entries: usize) -> Self {
        if self.error.is_none() {
            if max_entries < 4 {
                self.error = Some(GeoError::new(
                    &format!("max_entries must be at least 4, got {}", max_entries),
                    ErrorKind::ConfigurationError,
                ));
            } else {
                self.config.index.max_entries = max_entries;
            }
        }
        self
    }

    /// Minimum fill of non-root index nodes; checked against `max_entries`
    /// when the database opens.
    pub fn min_entries(mut self, min_entries: usize) -> Self {
        if self.error.is_none() {
            self.config.index.min_entries = min_entries;
        }
        self
    }

    /// Number of geometries committed per batch by bulk operations.
    pub fn bulk_batch_size(mut self, batch_size: usize) -> Self {
        if self.error.is_none() {
            if batch_size == 0 {
                self.error = Some(GeoError::new(
                    "bulk_batch_size must be at least 1",
                    ErrorKind::ConfigurationError,
                ));
            } else {
                self.config.index.bulk_batch_size = batch_size;
            }
        }
        self
    }

    /// Registers an additional encoder discriminator.
    pub fn register_encoder(mut self, name: &str, factory: EncoderFactory) -> Self {
        if self.error.is_none() {
            if name.trim().is_empty() {
                self.error = Some(GeoError::new(
                    "Encoder name cannot be empty",
                    ErrorKind::ConfigurationError,
                ));
            } else {
                self.catalog.register(name, factory);
            }
        }
        self
    }

    /// Opens the configured database, creating it when it does not exist.
    pub fn open_or_create(self) -> GeoResult<SpatialDatabase> {
        if let Some(error) = self.error {
            return Err(error);
        }
        SpatialDatabase::open(self.config, self.catalog)
    }
}

impl Default for SpatialDatabaseBuilder {
    fn default() -> Self {
        Self::new()
    }
}
