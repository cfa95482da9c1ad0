//! Normalization of heterogeneous caller inputs into coordinates and geometries.

use std::collections::BTreeMap;

use crate::crs::{Crs, CARTESIAN};
use crate::errors::{ErrorKind, GeoError, GeoResult};
use crate::geometry::wkt::parse_wkt;
use crate::geometry::{Coordinate, Geometry, Shape};
use crate::store::{Record, Value};

/// Field name pairs recognized as longitude/latitude, in lookup order.
pub const COORDINATE_FIELD_PAIRS: [(&str, &str); 2] = [("longitude", "latitude"), ("lon", "lat")];

/// The input shapes a caller may supply where a location is expected.
#[derive(Debug, Clone, PartialEq)]
pub enum CoordinateInput {
    /// An already typed coordinate.
    Typed(Coordinate),
    /// An already typed geometry.
    Geometry(Geometry),
    /// A record carrying a longitude/latitude field pair.
    Record(Record),
    /// A key/value mapping carrying a longitude/latitude pair.
    Map(BTreeMap<String, Value>),
    /// Well-Known-Text.
    Wkt(String),
}

impl From<Coordinate> for CoordinateInput {
    fn from(value: Coordinate) -> Self {
        CoordinateInput::Typed(value)
    }
}

impl From<Geometry> for CoordinateInput {
    fn from(value: Geometry) -> Self {
        CoordinateInput::Geometry(value)
    }
}

impl From<Record> for CoordinateInput {
    fn from(value: Record) -> Self {
        CoordinateInput::Record(value)
    }
}

impl From<BTreeMap<String, Value>> for CoordinateInput {
    fn from(value: BTreeMap<String, Value>) -> Self {
        CoordinateInput::Map(value)
    }
}

impl From<&str> for CoordinateInput {
    fn from(value: &str) -> Self {
        CoordinateInput::Wkt(value.to_string())
    }
}

/// Converts any supported input into a single coordinate.
///
/// Records and maps are read through the first field pair of
/// [`COORDINATE_FIELD_PAIRS`] for which both fields are present. Geometries
/// and WKT are accepted only when they describe a point.
pub fn to_coordinate(input: &CoordinateInput) -> GeoResult<Coordinate> {
    match input {
        CoordinateInput::Typed(coordinate) => Ok(*coordinate),
        CoordinateInput::Geometry(geometry) => point_of(geometry),
        CoordinateInput::Record(record) => {
            from_fields(|name| record.get(name), &format!("record {}", record.id()))
        }
        CoordinateInput::Map(map) => from_fields(|name| map.get(name), "map"),
        CoordinateInput::Wkt(text) => point_of(&parse_wkt(text)?),
    }
}

/// Converts any supported input into a geometry; WKT may be of any kind.
pub fn to_geometry(input: &CoordinateInput) -> GeoResult<Geometry> {
    match input {
        CoordinateInput::Geometry(geometry) => Ok(geometry.clone()),
        CoordinateInput::Wkt(text) => parse_wkt(text),
        other => {
            let coordinate = to_coordinate(other)?;
            Ok(Geometry::new(Shape::Point(coordinate)))
        }
    }
}

fn point_of(geometry: &Geometry) -> GeoResult<Coordinate> {
    match geometry.shape() {
        Shape::Point(coordinate) => Ok(*coordinate),
        _ => Err(GeoError::new(
            &format!("Cannot convert {} to a coordinate", geometry.kind()),
            ErrorKind::ConversionError,
        )),
    }
}

fn from_fields<'a, F>(lookup: F, source: &str) -> GeoResult<Coordinate>
where
    F: Fn(&str) -> Option<&'a Value>,
{
    for (x_name, y_name) in COORDINATE_FIELD_PAIRS {
        if let (Some(x), Some(y)) = (lookup(x_name), lookup(y_name)) {
            let x = numeric(x, x_name, source)?;
            let y = numeric(y, y_name, source)?;
            return Ok(Coordinate::new(x, y));
        }
    }
    Err(GeoError::new(
        &format!(
            "Cannot find longitude/latitude or lon/lat fields on {}",
            source
        ),
        ErrorKind::ConversionError,
    ))
}

fn numeric(value: &Value, field: &str, source: &str) -> GeoResult<f64> {
    match value.as_f64() {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(GeoError::new(
            &format!("Field '{}' on {} is not a finite number: {}", field, source, value),
            ErrorKind::ConversionError,
        )),
    }
}

/// A geometry together with the reference system its coordinates are in.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedGeometry {
    pub geometry: Geometry,
    pub crs: Crs,
}

impl TaggedGeometry {
    /// Tags `geometry` with the CRS named by its SRID when recognized, else
    /// with the layer CRS, else as Cartesian.
    pub fn tag(geometry: Geometry, layer_crs: Option<Crs>) -> TaggedGeometry {
        let crs = geometry
            .srid()
            .and_then(|srid| Crs::from_srid(srid).ok())
            .or(layer_crs)
            .unwrap_or(CARTESIAN);
        TaggedGeometry { geometry, crs }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::WGS84;
    use crate::store::RecordId;

    #[test]
    fn test_typed_input() {
        let c = Coordinate::new(1.0, 2.0);
        assert_eq!(to_coordinate(&c.into()).unwrap(), c);
        assert_eq!(
            to_coordinate(&Geometry::point(3.0, 4.0).into()).unwrap(),
            Coordinate::new(3.0, 4.0)
        );
    }

    #[test]
    fn test_record_prefers_longitude_latitude() {
        let mut record = Record::new(RecordId::new(1));
        record.put("lon", 1.0);
        record.put("lat", 2.0);
        record.put("longitude", 10.0);
        record.put("latitude", 20.0);
        assert_eq!(
            to_coordinate(&record.into()).unwrap(),
            Coordinate::new(10.0, 20.0)
        );
    }

    #[test]
    fn test_pair_needs_both_fields() {
        let mut record = Record::new(RecordId::new(1));
        record.put("longitude", 10.0);
        record.put("lon", 1.0);
        record.put("lat", 2);
        assert_eq!(
            to_coordinate(&record.into()).unwrap(),
            Coordinate::new(1.0, 2.0)
        );
    }

    #[test]
    fn test_map_input() {
        let mut map = BTreeMap::new();
        map.insert("lon".to_string(), Value::F64(5.5));
        map.insert("lat".to_string(), Value::I64(-3));
        assert_eq!(to_coordinate(&map.into()).unwrap(), Coordinate::new(5.5, -3.0));
    }

    #[test]
    fn test_unrecognized_input_fails() {
        let mut map = BTreeMap::new();
        map.insert("x".to_string(), Value::F64(1.0));
        let err = to_coordinate(&map.into()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ConversionError);

        let mut map = BTreeMap::new();
        map.insert("lon".to_string(), Value::from("east"));
        map.insert("lat".to_string(), Value::F64(1.0));
        let err = to_coordinate(&map.into()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ConversionError);
        assert!(err.message().contains("lon"));
    }

    #[test]
    fn test_wkt_input() {
        assert_eq!(
            to_coordinate(&"POINT (1 2)".into()).unwrap(),
            Coordinate::new(1.0, 2.0)
        );
        let err = to_coordinate(&"LINESTRING (0 0, 1 1)".into()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::ConversionError);

        let line = to_geometry(&"LINESTRING (0 0, 1 1)".into()).unwrap();
        assert_eq!(line.coordinates().len(), 2);
        let err = to_geometry(&"LINESTRING (0 0".into()).unwrap_err();
        assert_eq!(err.kind(), &ErrorKind::EncodingError);
    }

    #[test]
    fn test_to_geometry_from_map() {
        let mut map = BTreeMap::new();
        map.insert("longitude".to_string(), Value::F64(1.0));
        map.insert("latitude".to_string(), Value::F64(2.0));
        assert_eq!(to_geometry(&map.into()).unwrap(), Geometry::point(1.0, 2.0));
    }

    #[test]
    fn test_tagging() {
        let tagged = TaggedGeometry::tag(Geometry::point(0.0, 0.0).with_srid(Some(4326)), None);
        assert_eq!(tagged.crs, WGS84);
        let tagged = TaggedGeometry::tag(Geometry::point(0.0, 0.0), Some(WGS84));
        assert_eq!(tagged.crs, WGS84);
        let tagged = TaggedGeometry::tag(Geometry::point(0.0, 0.0).with_srid(Some(3857)), None);
        assert_eq!(tagged.crs, CARTESIAN);
    }
}
