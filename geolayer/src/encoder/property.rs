use crate::errors::{ErrorKind, GeoError, GeoResult};
use crate::geometry::{Coordinate, Geometry, GeometryKind, Shape};
use crate::store::{Record, Value};

use super::{field_count, field_f64, field_i64, optional_srid, unsupported_shape};

pub(crate) const KIND: &str = "SimplePropertyEncoder";

/// Stores a geometry as flat numeric fields on the record itself.
///
/// For a configured prefix `p` the record receives `p` + `gtype` (the
/// simple-features type code), `count`, `srid` when present and one
/// `x{i}`/`y{i}` (and `z{i}`) field per vertex. Points, line strings,
/// multi-points and polygons without holes are supported.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropertyEncoder {
    prefix: String,
}

impl PropertyEncoder {
    pub fn new(prefix: &str) -> Self {
        PropertyEncoder {
            prefix: prefix.to_string(),
        }
    }

    pub fn from_config(config: &str) -> Self {
        Self::new(config.trim())
    }

    fn field(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    fn vertex_field(&self, axis: char, index: usize) -> String {
        format!("{}{}{}", self.prefix, axis, index)
    }

    pub(crate) fn encode(&self, geometry: &Geometry, record: &mut Record) -> GeoResult<()> {
        let vertices: &[Coordinate] = match geometry.shape() {
            Shape::Point(c) => std::slice::from_ref(c),
            Shape::LineString(cs) | Shape::MultiPoint(cs) => cs,
            Shape::Polygon(p) if p.interiors.is_empty() => &p.exterior,
            _ => return Err(unsupported_shape(KIND, geometry)),
        };

        self.clear(record);
        record.put(&self.field("gtype"), i64::from(geometry.kind().code()));
        record.put(&self.field("count"), vertices.len() as i64);
        if let Some(srid) = geometry.srid() {
            record.put(&self.field("srid"), i64::from(srid));
        }
        for (i, c) in vertices.iter().enumerate() {
            record.put(&self.vertex_field('x', i), c.x);
            record.put(&self.vertex_field('y', i), c.y);
            if let Some(z) = c.z {
                record.put(&self.vertex_field('z', i), z);
            }
        }
        Ok(())
    }

    pub(crate) fn decode(&self, record: &Record) -> GeoResult<Geometry> {
        let code = field_i64(record, &self.field("gtype"))?;
        let kind = u32::try_from(code)
            .ok()
            .and_then(GeometryKind::from_code)
            .ok_or_else(|| {
                GeoError::new(
                    &format!("Unknown geometry type code {} on record {}", code, record.id()),
                    ErrorKind::EncodingError,
                )
            })?;
        let count = field_count(record, &self.field("count"))?;
        let mut vertices = Vec::with_capacity(count);
        for i in 0..count {
            let x = field_f64(record, &self.vertex_field('x', i))?;
            let y = field_f64(record, &self.vertex_field('y', i))?;
            let z_field = self.vertex_field('z', i);
            let c = if record.contains(&z_field) {
                Coordinate::new_3d(x, y, field_f64(record, &z_field)?)
            } else {
                Coordinate::new(x, y)
            };
            vertices.push(c);
        }

        let geometry = match kind {
            GeometryKind::Point if count == 1 => Geometry::new(Shape::Point(vertices[0])),
            GeometryKind::LineString => Geometry::line_string(vertices),
            GeometryKind::MultiPoint => Geometry::multi_point(vertices),
            GeometryKind::Polygon => Geometry::polygon(vertices, Vec::new()),
            _ => {
                return Err(GeoError::new(
                    &format!(
                        "{} cannot decode {} with {} vertices on record {}",
                        KIND,
                        kind,
                        count,
                        record.id()
                    ),
                    ErrorKind::EncodingError,
                ))
            }
        };
        Ok(geometry.with_srid(optional_srid(record, &self.field("srid"))?))
    }

    /// Removes the fields written by a previous encode.
    fn clear(&self, record: &mut Record) {
        let previous = record
            .get(&self.field("count"))
            .and_then(Value::as_i64)
            .unwrap_or(0)
            .max(0) as usize;
        for i in 0..previous {
            for axis in ['x', 'y', 'z'] {
                record.remove(&self.vertex_field(axis, i));
            }
        }
        record.remove(&self.field("srid"));
    }

    pub(crate) fn config(&self) -> String {
        self.prefix.clone()
    }

    pub(crate) fn signature(&self) -> String {
        format!("{}(prefix='{}')", KIND, self.prefix)
    }
}
