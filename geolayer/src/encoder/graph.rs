use std::collections::HashSet;

use log::warn;

use crate::errors::{ErrorKind, GeoError, GeoResult};
use crate::geometry::{Coordinate, Geometry, GeometryKind, Polygon, Shape};
use crate::store::{Record, RecordId, RecordSource, Transaction, Value};

use super::{field_f64, field_i64, missing_field, optional_srid, unsupported_value};

pub(crate) const KIND: &str = "SimpleGraphEncoder";

const DEFAULT_LINK_FIELD: &str = "next";
const GTYPE_FIELD: &str = "gtype";
const SRID_FIELD: &str = "srid";
const PARTS_FIELD: &str = "parts";
const RINGS_FIELD: &str = "rings";

/// Stores a geometry as a graph of linked records.
///
/// The feature record keeps the type code, the SRID and a `parts` array of
/// references. For point and line kinds each part is the head of a chain
/// of vertex records, each holding `x`, `y`, optional `z` and a reference
/// to the following vertex under the configured link field. For polygon
/// kinds each part is a record whose `rings` array references one chain
/// per ring.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEncoder {
    link_field: String,
}

impl GraphEncoder {
    pub fn new(link_field: &str) -> Self {
        GraphEncoder {
            link_field: link_field.to_string(),
        }
    }

    pub fn from_config(config: &str) -> Self {
        match config.trim() {
            "" => Self::new(DEFAULT_LINK_FIELD),
            link => Self::new(link),
        }
    }

    pub(crate) fn encode(
        &self,
        geometry: &Geometry,
        record: &mut Record,
        tx: &mut Transaction,
    ) -> GeoResult<()> {
        if record.contains(PARTS_FIELD) {
            self.release(record, tx)?;
        }

        let mut parts = Vec::new();
        match geometry.shape() {
            Shape::Point(c) => parts.push(self.write_chain(std::slice::from_ref(c), tx)?),
            Shape::LineString(cs) => parts.push(self.write_chain(cs, tx)?),
            Shape::MultiPoint(cs) => {
                for c in cs {
                    parts.push(self.write_chain(std::slice::from_ref(c), tx)?);
                }
            }
            Shape::MultiLineString(lines) => {
                for line in lines {
                    parts.push(self.write_chain(line, tx)?);
                }
            }
            Shape::Polygon(p) => parts.push(self.write_polygon(p, tx)?),
            Shape::MultiPolygon(polygons) => {
                for p in polygons {
                    parts.push(self.write_polygon(p, tx)?);
                }
            }
        }

        record.put(GTYPE_FIELD, i64::from(geometry.kind().code()));
        match geometry.srid() {
            Some(srid) => record.put(SRID_FIELD, i64::from(srid)),
            None => record.remove(SRID_FIELD),
        };
        record.put(PARTS_FIELD, references(parts));
        Ok(())
    }

    pub(crate) fn decode(&self, record: &Record, source: &dyn RecordSource) -> GeoResult<Geometry> {
        let code = field_i64(record, GTYPE_FIELD)?;
        let kind = u32::try_from(code)
            .ok()
            .and_then(GeometryKind::from_code)
            .ok_or_else(|| {
                GeoError::new(
                    &format!("Unknown geometry type code {} on record {}", code, record.id()),
                    ErrorKind::EncodingError,
                )
            })?;
        let parts = reference_list(record, PARTS_FIELD)?;

        let shape = match kind {
            GeometryKind::Polygon | GeometryKind::MultiPolygon => {
                let mut polygons = Vec::with_capacity(parts.len());
                for part in parts {
                    polygons.push(self.read_polygon(part, source)?);
                }
                if kind == GeometryKind::MultiPolygon {
                    Shape::MultiPolygon(polygons)
                } else {
                    single(record, kind, polygons).map(Shape::Polygon)?
                }
            }
            _ => {
                let mut chains = Vec::with_capacity(parts.len());
                for part in parts {
                    chains.push(self.read_chain(part, source)?);
                }
                match kind {
                    GeometryKind::Point => {
                        let chain = single(record, kind, chains)?;
                        single(record, kind, chain).map(Shape::Point)?
                    }
                    GeometryKind::LineString => single(record, kind, chains).map(Shape::LineString)?,
                    GeometryKind::MultiPoint => {
                        let mut points = Vec::with_capacity(chains.len());
                        for chain in chains {
                            points.push(single(record, kind, chain)?);
                        }
                        Shape::MultiPoint(points)
                    }
                    _ => Shape::MultiLineString(chains),
                }
            }
        };
        Ok(Geometry::new(shape).with_srid(optional_srid(record, SRID_FIELD)?))
    }

    /// Deletes every linked record reachable from `record` and clears its
    /// graph fields. Missing links are skipped.
    pub(crate) fn release(&self, record: &mut Record, tx: &mut Transaction) -> GeoResult<()> {
        let mut doomed = Vec::new();
        let parts = record
            .get(PARTS_FIELD)
            .and_then(Value::as_array)
            .map(|refs| refs.iter().filter_map(Value::as_ref_id).collect::<Vec<_>>())
            .unwrap_or_default();

        for part in parts {
            let Some(part_record) = tx.record(part) else {
                warn!("Linked record {} of record {} is already gone", part, record.id());
                continue;
            };
            match part_record.get(RINGS_FIELD).and_then(Value::as_array) {
                Some(rings) => {
                    doomed.push(part);
                    for ring in rings.iter().filter_map(Value::as_ref_id) {
                        self.collect_chain(ring, &*tx, &mut doomed);
                    }
                }
                None => self.collect_chain(part, &*tx, &mut doomed),
            }
        }

        for id in doomed {
            tx.delete_record(id)?;
        }
        record.remove(PARTS_FIELD);
        record.remove(GTYPE_FIELD);
        record.remove(SRID_FIELD);
        Ok(())
    }

    pub(crate) fn config(&self) -> String {
        self.link_field.clone()
    }

    pub(crate) fn signature(&self) -> String {
        format!("{}(link='{}')", KIND, self.link_field)
    }

    fn write_chain(&self, coordinates: &[Coordinate], tx: &mut Transaction) -> GeoResult<RecordId> {
        let mut vertices: Vec<Record> = coordinates
            .iter()
            .map(|c| {
                let mut vertex = tx.create_record();
                vertex.put("x", c.x);
                vertex.put("y", c.y);
                if let Some(z) = c.z {
                    vertex.put("z", z);
                }
                vertex
            })
            .collect();
        for i in 1..vertices.len() {
            let next = vertices[i].id();
            vertices[i - 1].put(&self.link_field, next);
        }
        let head = vertices.first().map(Record::id).ok_or_else(|| {
            GeoError::new("Cannot link an empty coordinate sequence", ErrorKind::EncodingError)
        })?;
        for vertex in vertices {
            tx.put_record(vertex)?;
        }
        Ok(head)
    }

    fn write_polygon(&self, polygon: &Polygon, tx: &mut Transaction) -> GeoResult<RecordId> {
        let mut rings = Vec::new();
        for ring in polygon.rings() {
            rings.push(self.write_chain(ring, tx)?);
        }
        let mut part = tx.create_record();
        part.put(RINGS_FIELD, references(rings));
        let id = part.id();
        tx.put_record(part)?;
        Ok(id)
    }

    fn read_chain(&self, head: RecordId, source: &dyn RecordSource) -> GeoResult<Vec<Coordinate>> {
        let mut coordinates = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(head);
        while let Some(id) = current {
            if !visited.insert(id) {
                return Err(GeoError::new(
                    &format!("Cycle in linked geometry at record {}", id),
                    ErrorKind::EncodingError,
                ));
            }
            let vertex = source.record(id).ok_or_else(|| missing_link(id))?;
            let x = field_f64(&vertex, "x")?;
            let y = field_f64(&vertex, "y")?;
            coordinates.push(if vertex.contains("z") {
                Coordinate::new_3d(x, y, field_f64(&vertex, "z")?)
            } else {
                Coordinate::new(x, y)
            });
            current = match vertex.get(&self.link_field) {
                None | Some(Value::Null) => None,
                Some(Value::Ref(next)) => Some(*next),
                Some(other) => {
                    return Err(unsupported_value(&vertex, &self.link_field, "a link", other))
                }
            };
        }
        Ok(coordinates)
    }

    fn read_polygon(&self, part: RecordId, source: &dyn RecordSource) -> GeoResult<Polygon> {
        let record = source.record(part).ok_or_else(|| missing_link(part))?;
        let mut rings = Vec::new();
        for head in reference_list(&record, RINGS_FIELD)? {
            rings.push(self.read_chain(head, source)?);
        }
        let mut rings = rings.into_iter();
        let exterior = rings.next().ok_or_else(|| {
            GeoError::new(
                &format!("Polygon record {} has no rings", part),
                ErrorKind::EncodingError,
            )
        })?;
        Ok(Polygon::new(exterior, rings.collect()))
    }

    fn collect_chain(&self, head: RecordId, source: &dyn RecordSource, out: &mut Vec<RecordId>) {
        let mut visited = HashSet::new();
        let mut current = Some(head);
        while let Some(id) = current {
            if !visited.insert(id) {
                break;
            }
            let Some(vertex) = source.record(id) else {
                break;
            };
            out.push(id);
            current = vertex.get(&self.link_field).and_then(Value::as_ref_id);
        }
    }
}

impl Default for GraphEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_LINK_FIELD)
    }
}

fn references(ids: Vec<RecordId>) -> Value {
    Value::Array(ids.into_iter().map(Value::Ref).collect())
}

fn reference_list(record: &Record, field: &str) -> GeoResult<Vec<RecordId>> {
    let value = record.get(field).ok_or_else(|| missing_field(record, field))?;
    let items = value
        .as_array()
        .ok_or_else(|| unsupported_value(record, field, "a reference list", value))?;
    items
        .iter()
        .map(|item| {
            item.as_ref_id()
                .ok_or_else(|| unsupported_value(record, field, "a reference list", value))
        })
        .collect()
}

fn single<T>(record: &Record, kind: GeometryKind, items: Vec<T>) -> GeoResult<T> {
    let count = items.len();
    let mut items = items.into_iter();
    match (items.next(), items.next()) {
        (Some(item), None) => Ok(item),
        _ => Err(GeoError::new(
            &format!(
                "{} on record {} needs exactly one part, found {}",
                kind,
                record.id(),
                count
            ),
            ErrorKind::EncodingError,
        )),
    }
}

fn missing_link(id: RecordId) -> GeoError {
    GeoError::new(
        &format!("Missing linked record {}", id),
        ErrorKind::EncodingError,
    )
}
