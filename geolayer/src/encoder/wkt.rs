use crate::errors::GeoResult;
use crate::geometry::wkt::{parse_wkt, write_wkt};
use crate::geometry::Geometry;
use crate::store::{Record, Value};

use super::{missing_field, unsupported_value};

pub(crate) const KIND: &str = "WKTGeometryEncoder";

pub(crate) const DEFAULT_FIELD: &str = "geometry";

/// Stores a geometry as (E)WKT text in one field.
#[derive(Debug, Clone, PartialEq)]
pub struct WktEncoder {
    field: String,
}

impl WktEncoder {
    pub fn new(field: &str) -> Self {
        WktEncoder {
            field: field.to_string(),
        }
    }

    pub fn from_config(config: &str) -> Self {
        match config.trim() {
            "" => Self::new(DEFAULT_FIELD),
            field => Self::new(field),
        }
    }

    pub(crate) fn encode(&self, geometry: &Geometry, record: &mut Record) -> GeoResult<()> {
        record.put(&self.field, write_wkt(geometry));
        Ok(())
    }

    pub(crate) fn decode(&self, record: &Record) -> GeoResult<Geometry> {
        match record.get(&self.field) {
            Some(Value::String(text)) => parse_wkt(text),
            Some(other) => Err(unsupported_value(record, &self.field, "WKT text", other)),
            None => Err(missing_field(record, &self.field)),
        }
    }

    pub(crate) fn config(&self) -> String {
        self.field.clone()
    }

    pub(crate) fn signature(&self) -> String {
        format!("{}(field='{}')", KIND, self.field)
    }
}
