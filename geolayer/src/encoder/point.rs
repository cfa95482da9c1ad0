use crate::errors::{ErrorKind, GeoError, GeoResult};
use crate::geometry::{Geometry, Shape};
use crate::store::Record;

use super::{field_f64, unsupported_shape};

pub(crate) const KIND: &str = "SimplePointEncoder";

const DEFAULT_X_FIELD: &str = "longitude";
const DEFAULT_Y_FIELD: &str = "latitude";

/// Stores a 2D point as two numeric fields.
///
/// Configured as `"xField:yField"`; an empty configuration selects
/// `longitude:latitude`. Points carrying an SRID are rejected, since two
/// fields cannot hold it.
#[derive(Debug, Clone, PartialEq)]
pub struct PointEncoder {
    x_field: String,
    y_field: String,
}

impl PointEncoder {
    pub fn new(x_field: &str, y_field: &str) -> Self {
        PointEncoder {
            x_field: x_field.to_string(),
            y_field: y_field.to_string(),
        }
    }

    pub fn from_config(config: &str) -> GeoResult<Self> {
        let config = config.trim();
        if config.is_empty() {
            return Ok(Self::default());
        }
        match config.split_once(':') {
            Some((x, y)) if !x.trim().is_empty() && !y.trim().is_empty() && x.trim() != y.trim() => {
                Ok(Self::new(x.trim(), y.trim()))
            }
            _ => Err(GeoError::new(
                &format!(
                    "Invalid SimplePointEncoder config '{}', expected 'xField:yField'",
                    config
                ),
                ErrorKind::ConfigurationError,
            )),
        }
    }

    pub fn x_field(&self) -> &str {
        &self.x_field
    }

    pub fn y_field(&self) -> &str {
        &self.y_field
    }

    pub(crate) fn encode(&self, geometry: &Geometry, record: &mut Record) -> GeoResult<()> {
        if let Some(srid) = geometry.srid() {
            return Err(GeoError::new(
                &format!("{} cannot store SRID {} of {}", KIND, srid, geometry),
                ErrorKind::EncodingError,
            ));
        }
        match geometry.shape() {
            Shape::Point(c) if c.z.is_none() => {
                record.put(&self.x_field, c.x);
                record.put(&self.y_field, c.y);
                Ok(())
            }
            _ => Err(unsupported_shape(KIND, geometry)),
        }
    }

    pub(crate) fn decode(&self, record: &Record) -> GeoResult<Geometry> {
        let x = field_f64(record, &self.x_field)?;
        let y = field_f64(record, &self.y_field)?;
        Ok(Geometry::point(x, y))
    }

    pub(crate) fn config(&self) -> String {
        format!("{}:{}", self.x_field, self.y_field)
    }

    pub(crate) fn signature(&self) -> String {
        format!("{}(x='{}', y='{}')", KIND, self.x_field, self.y_field)
    }
}

impl Default for PointEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_X_FIELD, DEFAULT_Y_FIELD)
    }
}
