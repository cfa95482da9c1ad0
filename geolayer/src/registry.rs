//! Layer lifecycle: creation, lookup and deletion by name.

use indexmap::IndexMap;
use log::info;
use std::sync::Arc;

use crate::common::WriterLock;
use crate::config::IndexConfig;
use crate::crs::{hint_crs_name, select_crs, Crs};
use crate::encoder::EncoderCatalog;
use crate::errors::{ErrorKind, GeoError, GeoResult};
use crate::layer::{no_such_layer, Layer, LayerMetadata, RTREE_INDEX_KIND};
use crate::store::RecordStore;

/// Writer lock name serializing catalog changes. Layer names are never
/// empty, so it cannot collide with a layer's own lock.
const CATALOG_LOCK: &str = "";

/// A predefined combination of encoder kind and default configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerType {
    pub name: &'static str,
    pub encoder_kind: &'static str,
    pub default_config: &'static str,
}

const LAYER_TYPES: [LayerType; 5] = [
    LayerType {
        name: "SimplePoint",
        encoder_kind: "SimplePointEncoder",
        default_config: "longitude:latitude",
    },
    LayerType {
        name: "WKT",
        encoder_kind: "WKTGeometryEncoder",
        default_config: "geometry",
    },
    LayerType {
        name: "WKB",
        encoder_kind: "WKBGeometryEncoder",
        default_config: "geometry",
    },
    LayerType {
        name: "SimpleProperty",
        encoder_kind: "SimplePropertyEncoder",
        default_config: "",
    },
    LayerType {
        name: "SimpleGraph",
        encoder_kind: "SimpleGraphEncoder",
        default_config: "next",
    },
];

/// The predefined layer types, keyed by name.
pub fn layer_types() -> IndexMap<&'static str, LayerType> {
    LAYER_TYPES.iter().map(|t| (t.name, *t)).collect()
}

/// Maps layer names to layers.
///
/// Layer metadata lives in the store catalog; handles are rebuilt from it
/// on every lookup, so they always reflect the committed state.
#[derive(Clone)]
pub struct LayerRegistry {
    inner: Arc<LayerRegistryInner>,
}

struct LayerRegistryInner {
    store: RecordStore,
    catalog: EncoderCatalog,
    config: IndexConfig,
    catalog_lock: WriterLock,
}

impl LayerRegistry {
    pub fn new(store: RecordStore, catalog: EncoderCatalog, config: IndexConfig) -> Self {
        LayerRegistry {
            inner: Arc::new(LayerRegistryInner {
                catalog_lock: store.writer_lock(CATALOG_LOCK),
                store,
                catalog,
                config,
            }),
        }
    }

    pub fn encoder_catalog(&self) -> &EncoderCatalog {
        &self.inner.catalog
    }

    /// Creates a layer.
    ///
    /// Fails with `ConfigurationError` when the name is taken, the encoder
    /// or index kind is unknown or the encoder configuration is invalid.
    /// Nothing is written in that case.
    pub fn create(
        &self,
        name: &str,
        encoder_kind: &str,
        encoder_config: &str,
        index_kind: &str,
        crs: Option<Crs>,
    ) -> GeoResult<Layer> {
        self.create_with_attributes(name, encoder_kind, encoder_config, index_kind, crs, Vec::new())
    }

    /// Creates a layer that declares the attribute fields its features carry.
    pub fn create_with_attributes(
        &self,
        name: &str,
        encoder_kind: &str,
        encoder_config: &str,
        index_kind: &str,
        crs: Option<Crs>,
        attributes: Vec<String>,
    ) -> GeoResult<Layer> {
        if name.is_empty() {
            return Err(GeoError::new(
                "Layer name cannot be empty",
                ErrorKind::ConfigurationError,
            ));
        }
        let encoder = self.inner.catalog.create(encoder_kind, encoder_config)?;
        let metadata = LayerMetadata {
            name: name.to_string(),
            encoder_kind: encoder.kind_name().to_string(),
            encoder_config: encoder.config(),
            index_kind: index_kind.to_lowercase(),
            crs,
            attributes,
        };

        let _guard = self.inner.catalog_lock.lock();
        let mut tx = self.inner.store.begin()?;
        if tx.catalog_entry(name).is_some() {
            return Err(GeoError::new(
                &format!("Cannot create existing layer: {}", name),
                ErrorKind::ConfigurationError,
            ));
        }
        let entry = tx.create_record();
        let layer = Layer::open(
            &self.inner.store,
            entry.id(),
            &metadata,
            &self.inner.catalog,
            self.inner.config,
        )?;
        tx.put_catalog_entry(name, metadata.to_record(entry.id()))?;
        layer.index().create(&mut tx)?;
        tx.commit()?;
        info!("Created layer {}", layer.signature());
        Ok(layer)
    }

    /// Creates a point layer storing `longitude`/`latitude` fields.
    pub fn create_point_layer(&self, name: &str, crs_name: &str) -> GeoResult<Layer> {
        self.create_point_layer_with_config(name, "", crs_name)
    }

    /// Creates a point layer on the given coordinate fields. An unset CRS
    /// defaults to WGS-84 when the y field name mentions "lat".
    pub fn create_point_layer_xy(
        &self,
        name: &str,
        x_field: &str,
        y_field: &str,
        crs_name: &str,
    ) -> GeoResult<Layer> {
        let crs_name = hint_crs_name(crs_name, y_field);
        self.create_point_layer_with_config(name, &format!("{}:{}", x_field, y_field), &crs_name)
    }

    /// Creates a point layer from an `x:y` encoder configuration.
    pub fn create_point_layer_with_config(
        &self,
        name: &str,
        encoder_config: &str,
        crs_name: &str,
    ) -> GeoResult<Layer> {
        let crs = select_crs(crs_name)?;
        self.create(name, "SimplePointEncoder", encoder_config, RTREE_INDEX_KIND, crs)
    }

    /// Creates a layer storing WKT text in `field` (default `geometry`).
    pub fn create_wkt_layer(&self, name: &str, field: &str, crs_name: &str) -> GeoResult<Layer> {
        let crs = select_crs(crs_name)?;
        self.create(name, "WKTGeometryEncoder", field, RTREE_INDEX_KIND, crs)
    }

    /// Creates a layer of one of the predefined [`layer_types`]. An empty
    /// configuration selects the type's default.
    pub fn create_of_type(&self, name: &str, type_name: &str, config: &str) -> GeoResult<Layer> {
        let layer_type = LAYER_TYPES
            .iter()
            .find(|t| t.name.eq_ignore_ascii_case(type_name))
            .ok_or_else(|| {
                GeoError::new(
                    &format!(
                        "Unknown layer type: {}, expected one of {}",
                        type_name,
                        LAYER_TYPES.map(|t| t.name).join(", ")
                    ),
                    ErrorKind::ConfigurationError,
                )
            })?;
        let config = if config.is_empty() {
            layer_type.default_config
        } else {
            config
        };
        self.create(name, layer_type.encoder_kind, config, RTREE_INDEX_KIND, None)
    }

    /// Looks up a layer, failing with `NotFound` when absent.
    pub fn get(&self, name: &str) -> GeoResult<Layer> {
        self.find(name)?.ok_or_else(|| no_such_layer(name))
    }

    /// Looks up a layer.
    pub fn find(&self, name: &str) -> GeoResult<Option<Layer>> {
        let snapshot = self.inner.store.snapshot()?;
        match snapshot.catalog_entry(name) {
            Some(entry) => {
                let metadata = LayerMetadata::from_record(entry)?;
                Layer::open(
                    &self.inner.store,
                    entry.id(),
                    &metadata,
                    &self.inner.catalog,
                    self.inner.config,
                )
                .map(Some)
            }
            None => Ok(None),
        }
    }

    pub fn exists(&self, name: &str) -> GeoResult<bool> {
        Ok(self.inner.store.snapshot()?.catalog_entry(name).is_some())
    }

    /// Layer names in ascending order.
    pub fn names(&self) -> GeoResult<Vec<String>> {
        Ok(self.inner.store.snapshot()?.catalog_names())
    }

    /// Every layer name with its signature, in name order.
    pub fn layers(&self) -> GeoResult<IndexMap<String, String>> {
        let mut layers = IndexMap::new();
        for name in self.names()? {
            if let Some(layer) = self.find(&name)? {
                layers.insert(name, layer.signature());
            }
        }
        Ok(layers)
    }

    /// Deletes a layer with all its features, returning how many were removed.
    pub fn delete(&self, name: &str) -> GeoResult<usize> {
        let layer = self.get(name)?;
        let _guard = self.inner.catalog_lock.lock();
        layer.delete()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::WGS84;
    use crate::filter::SearchFilter;
    use crate::geometry::Geometry;

    fn registry() -> LayerRegistry {
        LayerRegistry::new(
            RecordStore::in_memory(),
            EncoderCatalog::standard(),
            IndexConfig::default(),
        )
    }

    #[test]
    fn test_create_and_get() {
        let registry = registry();
        let layer = registry
            .create("roads", "wkt", "", "RTree", Some(WGS84))
            .unwrap();
        assert_eq!(layer.encoder_kind(), "WKTGeometryEncoder");
        let found = registry.get("roads").unwrap();
        assert_eq!(found.crs(), Some(WGS84));
        assert_eq!(found.signature(), layer.signature());
        assert!(registry.exists("roads").unwrap());
        assert!(registry.find("Roads").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_name_is_rejected() {
        let registry = registry();
        let layer = registry.create_point_layer("roads", "").unwrap();
        layer.add(&Geometry::point(1.0, 1.0)).unwrap();
        let err = registry.create_wkt_layer("roads", "", "").err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::ConfigurationError);
        assert_eq!(err.message(), "Cannot create existing layer: roads");
        assert_eq!(registry.get("roads").unwrap().count().unwrap(), 1);
    }

    #[test]
    fn test_create_validation() {
        let registry = registry();
        let cases = [
            registry.create("a", "geohash", "", "rtree", None).err(),
            registry.create("a", "wkt", "", "quadtree", None).err(),
            registry.create("a", "point", "lon", "rtree", None).err(),
            registry.create("", "wkt", "", "rtree", None).err(),
            registry.create_of_type("a", "Shapefile", "").err(),
        ];
        for err in cases {
            assert_eq!(err.unwrap().kind(), &ErrorKind::ConfigurationError);
        }
        let err = registry.create_point_layer("a", "bogus").err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::UnsupportedCrs);
        assert!(registry.names().unwrap().is_empty());
    }

    #[test]
    fn test_point_layer_crs_hint() {
        let registry = registry();
        let hinted = registry.create_point_layer_xy("a", "lon", "lat", "").unwrap();
        assert_eq!(hinted.crs(), Some(WGS84));
        let plain = registry.create_point_layer_xy("b", "x", "y", "").unwrap();
        assert_eq!(plain.crs(), None);
        assert_eq!(
            plain.encoder().signature(),
            "SimplePointEncoder(x='x', y='y')"
        );
    }

    #[test]
    fn test_layer_types() {
        let types = layer_types();
        assert_eq!(
            types.keys().copied().collect::<Vec<_>>(),
            vec!["SimplePoint", "WKT", "WKB", "SimpleProperty", "SimpleGraph"]
        );
        let registry = registry();
        let layer = registry.create_of_type("g", "simplegraph", "").unwrap();
        assert_eq!(layer.encoder().signature(), "SimpleGraphEncoder(link='next')");
        let layer = registry.create_of_type("p", "SimpleProperty", "geo_").unwrap();
        assert_eq!(layer.encoder().config(), "geo_");
    }

    #[test]
    fn test_names_layers_and_delete() {
        let registry = registry();
        registry.create_wkt_layer("b", "", "").unwrap();
        registry.create_wkt_layer("a", "", "wgs84").unwrap();
        assert_eq!(registry.names().unwrap(), vec!["a", "b"]);
        let layers = registry.layers().unwrap();
        assert_eq!(
            layers.get("a").unwrap(),
            "EditableLayer(name='a', encoder=WKTGeometryEncoder(field='geometry'), crs=WGS-84)"
        );

        registry.get("a").unwrap().add_wkt("POINT (1 1)").unwrap();
        assert_eq!(registry.delete("a").unwrap(), 1);
        assert_eq!(registry.names().unwrap(), vec!["b"]);
        let err = registry.delete("a").unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::NotFound);
        assert_eq!(err.message(), "No such layer 'a'");
    }

    #[test]
    fn test_deleted_name_can_be_reused() {
        let registry = registry();
        let first = registry.create_point_layer("pts", "").unwrap();
        first.add(&Geometry::point(0.0, 0.0)).unwrap();
        registry.delete("pts").unwrap();
        let second = registry.create_wkt_layer("pts", "", "").unwrap();
        assert_eq!(second.count().unwrap(), 0);
        assert_eq!(registry.get("pts").unwrap().encoder_kind(), "WKTGeometryEncoder");
    }

    #[test]
    fn test_handle_of_deleted_layer_cannot_touch_successor() {
        let registry = registry();
        let stale = registry.create_point_layer("pts", "").unwrap();
        stale.add(&Geometry::point(0.0, 0.0)).unwrap();
        registry.delete("pts").unwrap();
        let fresh = registry.create_wkt_layer("pts", "", "").unwrap();

        let err = stale.add(&Geometry::point(1.0, 1.0)).err().unwrap();
        assert_eq!(err.kind(), &ErrorKind::NotFound);
        assert_eq!(err.message(), "No such layer 'pts'");
        assert_eq!(stale.count().unwrap_err().kind(), &ErrorKind::NotFound);
        assert_eq!(
            stale.search(SearchFilter::MatchAll).err().unwrap().kind(),
            &ErrorKind::NotFound
        );
        assert_eq!(
            stale.add_all(&[Geometry::point(2.0, 2.0)]).unwrap_err().kind(),
            &ErrorKind::NotFound
        );
        assert_eq!(stale.delete().unwrap_err().kind(), &ErrorKind::NotFound);

        fresh.add_wkt("LINESTRING (0 0, 1 1)").unwrap();
        assert_eq!(fresh.count().unwrap(), 1);
        let flows = fresh.search(SearchFilter::MatchAll).unwrap().to_vec().unwrap();
        assert_eq!(flows.len(), 1);
        assert_eq!(registry.get("pts").unwrap().count().unwrap(), 1);
    }
}
