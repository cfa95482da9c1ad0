use crate::errors::GeoResult;
use crate::geometry::wkb::{parse_wkb, write_wkb};
use crate::geometry::Geometry;
use crate::store::{Record, Value};

use super::wkt::DEFAULT_FIELD;
use super::{missing_field, unsupported_value};

pub(crate) const KIND: &str = "WKBGeometryEncoder";

/// Stores a geometry as (E)WKB bytes in one field.
#[derive(Debug, Clone, PartialEq)]
pub struct WkbEncoder {
    field: String,
}

impl WkbEncoder {
    pub fn new(field: &str) -> Self {
        WkbEncoder {
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
        record.put(&self.field, write_wkb(geometry));
        Ok(())
    }

    pub(crate) fn decode(&self, record: &Record) -> GeoResult<Geometry> {
        match record.get(&self.field) {
            Some(Value::Bytes(bytes)) => parse_wkb(bytes),
            Some(other) => Err(unsupported_value(record, &self.field, "WKB bytes", other)),
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
