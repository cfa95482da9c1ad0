//! Geometry encoders: bidirectional mappings between geometries and record fields.
//!
//! Each layer owns exactly one encoder, selected at creation time by a
//! discriminator string looked up in an [`EncoderCatalog`]. The variant set
//! is closed, so [`GeometryEncoder`] is an enum and every operation matches
//! exhaustively.

mod graph;
mod point;
mod property;
mod wkb;
mod wkt;

use std::collections::BTreeMap;

use crate::errors::{ErrorKind, GeoError, GeoResult};
use crate::geometry::Geometry;
use crate::store::{Record, RecordSource, Transaction, Value};

pub use graph::GraphEncoder;
pub use point::PointEncoder;
pub use property::PropertyEncoder;
pub use wkb::WkbEncoder;
pub use wkt::WktEncoder;

/// Strategy converting between a geometry value and fields on a record.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryEncoder {
    Point(PointEncoder),
    Wkt(WktEncoder),
    Wkb(WkbEncoder),
    Property(PropertyEncoder),
    Graph(GraphEncoder),
}

impl GeometryEncoder {
    /// Writes `geometry` onto `record`.
    ///
    /// The geometry is validated first; a geometry the variant cannot
    /// represent fails with `EncodingError` and leaves the record untouched.
    /// Only the graph variant writes additional records through `tx`.
    pub fn encode(
        &self,
        geometry: &Geometry,
        record: &mut Record,
        tx: &mut Transaction,
    ) -> GeoResult<()> {
        geometry.validate()?;
        match self {
            GeometryEncoder::Point(encoder) => encoder.encode(geometry, record),
            GeometryEncoder::Wkt(encoder) => encoder.encode(geometry, record),
            GeometryEncoder::Wkb(encoder) => encoder.encode(geometry, record),
            GeometryEncoder::Property(encoder) => encoder.encode(geometry, record),
            GeometryEncoder::Graph(encoder) => encoder.encode(geometry, record, tx),
        }
    }

    /// Reads the geometry stored on `record`.
    pub fn decode(&self, record: &Record, source: &dyn RecordSource) -> GeoResult<Geometry> {
        let geometry = match self {
            GeometryEncoder::Point(encoder) => encoder.decode(record),
            GeometryEncoder::Wkt(encoder) => encoder.decode(record),
            GeometryEncoder::Wkb(encoder) => encoder.decode(record),
            GeometryEncoder::Property(encoder) => encoder.decode(record),
            GeometryEncoder::Graph(encoder) => encoder.decode(record, source),
        }?;
        geometry.validate()?;
        Ok(geometry)
    }

    /// Deletes any records the encoder created for `record`.
    pub fn release(&self, record: &mut Record, tx: &mut Transaction) -> GeoResult<()> {
        match self {
            GeometryEncoder::Graph(encoder) => encoder.release(record, tx),
            _ => Ok(()),
        }
    }

    /// Canonical discriminator of this variant.
    pub fn kind_name(&self) -> &'static str {
        match self {
            GeometryEncoder::Point(_) => point::KIND,
            GeometryEncoder::Wkt(_) => wkt::KIND,
            GeometryEncoder::Wkb(_) => wkb::KIND,
            GeometryEncoder::Property(_) => property::KIND,
            GeometryEncoder::Graph(_) => graph::KIND,
        }
    }

    /// The configuration string that recreates this encoder.
    pub fn config(&self) -> String {
        match self {
            GeometryEncoder::Point(encoder) => encoder.config(),
            GeometryEncoder::Wkt(encoder) => encoder.config(),
            GeometryEncoder::Wkb(encoder) => encoder.config(),
            GeometryEncoder::Property(encoder) => encoder.config(),
            GeometryEncoder::Graph(encoder) => encoder.config(),
        }
    }

    /// Human-readable description, e.g. `SimplePointEncoder(x='lon', y='lat')`.
    pub fn signature(&self) -> String {
        match self {
            GeometryEncoder::Point(encoder) => encoder.signature(),
            GeometryEncoder::Wkt(encoder) => encoder.signature(),
            GeometryEncoder::Wkb(encoder) => encoder.signature(),
            GeometryEncoder::Property(encoder) => encoder.signature(),
            GeometryEncoder::Graph(encoder) => encoder.signature(),
        }
    }
}

/// Builds an encoder from its configuration string.
pub type EncoderFactory = fn(&str) -> GeoResult<GeometryEncoder>;

/// Mapping from discriminator to encoder factory.
///
/// Built once and handed to the layer registry. Lookups ignore case.
#[derive(Clone)]
pub struct EncoderCatalog {
    factories: BTreeMap<String, EncoderFactory>,
}

impl EncoderCatalog {
    pub fn empty() -> Self {
        EncoderCatalog {
            factories: BTreeMap::new(),
        }
    }

    /// Catalog with every built-in variant under its canonical name and short alias.
    pub fn standard() -> Self {
        let mut catalog = Self::empty();
        catalog.register(point::KIND, |config| {
            PointEncoder::from_config(config).map(GeometryEncoder::Point)
        });
        catalog.register("point", |config| {
            PointEncoder::from_config(config).map(GeometryEncoder::Point)
        });
        catalog.register(wkt::KIND, |config| {
            Ok(GeometryEncoder::Wkt(WktEncoder::from_config(config)))
        });
        catalog.register("wkt", |config| {
            Ok(GeometryEncoder::Wkt(WktEncoder::from_config(config)))
        });
        catalog.register(wkb::KIND, |config| {
            Ok(GeometryEncoder::Wkb(WkbEncoder::from_config(config)))
        });
        catalog.register("wkb", |config| {
            Ok(GeometryEncoder::Wkb(WkbEncoder::from_config(config)))
        });
        catalog.register(property::KIND, |config| {
            Ok(GeometryEncoder::Property(PropertyEncoder::from_config(config)))
        });
        catalog.register("property", |config| {
            Ok(GeometryEncoder::Property(PropertyEncoder::from_config(config)))
        });
        catalog.register(graph::KIND, |config| {
            Ok(GeometryEncoder::Graph(GraphEncoder::from_config(config)))
        });
        catalog.register("graph", |config| {
            Ok(GeometryEncoder::Graph(GraphEncoder::from_config(config)))
        });
        catalog
    }

    /// Registers `factory` under `name`, replacing any previous registration.
    pub fn register(&mut self, name: &str, factory: EncoderFactory) {
        self.factories.insert(name.to_lowercase(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&name.to_lowercase())
    }

    /// Registered discriminators, lower-cased.
    pub fn kinds(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Creates an encoder; an unknown discriminator is a `ConfigurationError`.
    pub fn create(&self, kind: &str, config: &str) -> GeoResult<GeometryEncoder> {
        let factory = self.factories.get(&kind.to_lowercase()).ok_or_else(|| {
            GeoError::new(
                &format!("Unknown encoder kind: {}", kind),
                ErrorKind::ConfigurationError,
            )
        })?;
        factory(config)
    }
}

impl Default for EncoderCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

pub(crate) fn missing_field(record: &Record, field: &str) -> GeoError {
    GeoError::new(
        &format!("Missing field '{}' on record {}", field, record.id()),
        ErrorKind::EncodingError,
    )
}

pub(crate) fn unsupported_value(
    record: &Record,
    field: &str,
    expected: &str,
    value: &Value,
) -> GeoError {
    GeoError::new(
        &format!(
            "Field '{}' on record {} is not {}: {}",
            field,
            record.id(),
            expected,
            value
        ),
        ErrorKind::EncodingError,
    )
}

pub(crate) fn field_f64(record: &Record, field: &str) -> GeoResult<f64> {
    let value = record.get(field).ok_or_else(|| missing_field(record, field))?;
    match value.as_f64() {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(GeoError::new(
            &format!(
                "Field '{}' on record {} is not a finite number: {}",
                field,
                record.id(),
                value
            ),
            ErrorKind::EncodingError,
        )),
    }
}

pub(crate) fn field_i64(record: &Record, field: &str) -> GeoResult<i64> {
    let value = record.get(field).ok_or_else(|| missing_field(record, field))?;
    value.as_i64().ok_or_else(|| {
        GeoError::new(
            &format!(
                "Field '{}' on record {} is not an integer: {}",
                field,
                record.id(),
                value
            ),
            ErrorKind::EncodingError,
        )
    })
}

pub(crate) fn field_count(record: &Record, field: &str) -> GeoResult<usize> {
    let value = field_i64(record, field)?;
    usize::try_from(value).map_err(|_| {
        GeoError::new(
            &format!(
                "Field '{}' on record {} is not a valid count: {}",
                field,
                record.id(),
                value
            ),
            ErrorKind::EncodingError,
        )
    })
}

pub(crate) fn optional_srid(record: &Record, field: &str) -> GeoResult<Option<u32>> {
    match record.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::I64(v)) => u32::try_from(*v).map(Some).map_err(|_| {
            GeoError::new(
                &format!("Invalid SRID {} on record {}", v, record.id()),
                ErrorKind::EncodingError,
            )
        }),
        Some(other) => Err(GeoError::new(
            &format!("Invalid SRID {} on record {}", other, record.id()),
            ErrorKind::EncodingError,
        )),
    }
}

pub(crate) fn unsupported_shape(encoder: &str, geometry: &Geometry) -> GeoError {
    GeoError::new(
        &format!("{} cannot encode {}", encoder, geometry),
        ErrorKind::EncodingError,
    )
}
