//! Well-Known-Binary reader and writer.
//!
//! The reader accepts both byte orders, ISO type codes (`1000 + n` for Z)
//! and the EWKB Z and SRID flags. The writer always emits little-endian
//! EWKB, setting the SRID flag only when the geometry carries an SRID.

use super::{Coordinate, Geometry, GeometryKind, Polygon, Shape};
use crate::errors::{ErrorKind, GeoError};
use thiserror::Error;

const EWKB_Z_FLAG: u32 = 0x8000_0000;
const EWKB_M_FLAG: u32 = 0x4000_0000;
const EWKB_SRID_FLAG: u32 = 0x2000_0000;
const EWKB_FLAGS: u32 = EWKB_Z_FLAG | EWKB_M_FLAG | EWKB_SRID_FLAG;

/// Errors produced while reading WKB bytes.
#[derive(Debug, Error, PartialEq)]
pub enum WkbError {
    #[error("unexpected end of data at byte {0}")]
    UnexpectedEnd(usize),

    #[error("invalid byte order marker {0}")]
    InvalidByteOrder(u8),

    #[error("unknown geometry type code {0}")]
    UnknownType(u32),

    #[error("measured ordinates are not supported (type code {0})")]
    MeasuredOrdinates(u32),

    #[error("expected {expected} inside {container}, found {found}")]
    UnexpectedPart {
        container: GeometryKind,
        expected: GeometryKind,
        found: GeometryKind,
    },

    #[error("{0} trailing bytes")]
    TrailingBytes(usize),
}

impl From<WkbError> for GeoError {
    fn from(err: WkbError) -> Self {
        GeoError::new(&format!("Invalid WKB: {}", err), ErrorKind::EncodingError)
    }
}

/// Decodes WKB or EWKB bytes into a validated geometry.
pub fn parse_wkb(bytes: &[u8]) -> Result<Geometry, GeoError> {
    let mut reader = Reader {
        bytes,
        position: 0,
        little_endian: true,
    };
    let geometry = reader.geometry()?;
    if reader.position != bytes.len() {
        return Err(WkbError::TrailingBytes(bytes.len() - reader.position).into());
    }
    geometry.validate()?;
    Ok(geometry)
}

/// Encodes a geometry as little-endian EWKB.
pub fn write_wkb(geometry: &Geometry) -> Vec<u8> {
    let mut out = Vec::with_capacity(21 + 16 * geometry.coordinates().len());
    let has_z = geometry.has_z();
    write_header(&mut out, geometry.kind(), has_z, geometry.srid());

    match geometry.shape() {
        Shape::Point(c) => write_coordinate(&mut out, c, has_z),
        Shape::LineString(cs) => write_coordinates(&mut out, cs, has_z),
        Shape::Polygon(p) => write_polygon_body(&mut out, p, has_z),
        Shape::MultiPoint(cs) => {
            write_u32(&mut out, cs.len() as u32);
            for c in cs {
                write_header(&mut out, GeometryKind::Point, has_z, None);
                write_coordinate(&mut out, c, has_z);
            }
        }
        Shape::MultiLineString(lines) => {
            write_u32(&mut out, lines.len() as u32);
            for line in lines {
                write_header(&mut out, GeometryKind::LineString, has_z, None);
                write_coordinates(&mut out, line, has_z);
            }
        }
        Shape::MultiPolygon(polys) => {
            write_u32(&mut out, polys.len() as u32);
            for p in polys {
                write_header(&mut out, GeometryKind::Polygon, has_z, None);
                write_polygon_body(&mut out, p, has_z);
            }
        }
    }
    out
}

fn write_header(out: &mut Vec<u8>, kind: GeometryKind, has_z: bool, srid: Option<u32>) {
    out.push(1);
    let mut code = kind.code();
    if has_z {
        code |= EWKB_Z_FLAG;
    }
    if srid.is_some() {
        code |= EWKB_SRID_FLAG;
    }
    write_u32(out, code);
    if let Some(srid) = srid {
        write_u32(out, srid);
    }
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn write_coordinate(out: &mut Vec<u8>, c: &Coordinate, has_z: bool) {
    out.extend_from_slice(&c.x.to_le_bytes());
    out.extend_from_slice(&c.y.to_le_bytes());
    if has_z {
        out.extend_from_slice(&c.z.unwrap_or(f64::NAN).to_le_bytes());
    }
}

fn write_coordinates(out: &mut Vec<u8>, cs: &[Coordinate], has_z: bool) {
    write_u32(out, cs.len() as u32);
    for c in cs {
        write_coordinate(out, c, has_z);
    }
}

fn write_polygon_body(out: &mut Vec<u8>, polygon: &Polygon, has_z: bool) {
    write_u32(out, 1 + polygon.interiors.len() as u32);
    for ring in polygon.rings() {
        write_coordinates(out, ring, has_z);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
    little_endian: bool,
}

struct Header {
    kind: GeometryKind,
    has_z: bool,
    srid: Option<u32>,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N], WkbError> {
        let end = self.position + N;
        let slice = self
            .bytes
            .get(self.position..end)
            .ok_or(WkbError::UnexpectedEnd(self.position))?;
        let mut buf = [0u8; N];
        buf.copy_from_slice(slice);
        self.position = end;
        Ok(buf)
    }

    fn u32(&mut self) -> Result<u32, WkbError> {
        let buf = self.take::<4>()?;
        Ok(if self.little_endian {
            u32::from_le_bytes(buf)
        } else {
            u32::from_be_bytes(buf)
        })
    }

    fn f64(&mut self) -> Result<f64, WkbError> {
        let buf = self.take::<8>()?;
        Ok(if self.little_endian {
            f64::from_le_bytes(buf)
        } else {
            f64::from_be_bytes(buf)
        })
    }

    /// Counts are bounded by the remaining bytes so corrupt input cannot
    /// trigger huge allocations.
    fn count(&mut self, min_item_size: usize) -> Result<usize, WkbError> {
        let n = self.u32()? as usize;
        let remaining = self.bytes.len().saturating_sub(self.position);
        if n.saturating_mul(min_item_size) > remaining {
            return Err(WkbError::UnexpectedEnd(self.bytes.len()));
        }
        Ok(n)
    }

    fn header(&mut self) -> Result<Header, WkbError> {
        let [order] = self.take::<1>()?;
        self.little_endian = match order {
            0 => false,
            1 => true,
            other => return Err(WkbError::InvalidByteOrder(other)),
        };

        let raw = self.u32()?;
        if raw & EWKB_M_FLAG != 0 {
            return Err(WkbError::MeasuredOrdinates(raw));
        }
        let mut has_z = raw & EWKB_Z_FLAG != 0;
        let srid = if raw & EWKB_SRID_FLAG != 0 {
            Some(self.u32()?)
        } else {
            None
        };

        let base = raw & !EWKB_FLAGS;
        match base / 1000 {
            0 => {}
            1 => has_z = true,
            _ => return Err(WkbError::MeasuredOrdinates(raw)),
        }
        let kind = GeometryKind::from_code(base % 1000).ok_or(WkbError::UnknownType(raw))?;
        Ok(Header { kind, has_z, srid })
    }

    fn geometry(&mut self) -> Result<Geometry, WkbError> {
        let header = self.header()?;
        let has_z = header.has_z;
        let shape = match header.kind {
            GeometryKind::Point => Shape::Point(self.coordinate(has_z)?),
            GeometryKind::LineString => Shape::LineString(self.coordinates(has_z)?),
            GeometryKind::Polygon => Shape::Polygon(self.polygon_body(has_z)?),
            GeometryKind::MultiPoint => {
                let n = self.count(21)?;
                let mut points = Vec::with_capacity(n);
                for _ in 0..n {
                    let part = self.part(GeometryKind::MultiPoint, GeometryKind::Point)?;
                    if let Shape::Point(c) = part.shape() {
                        points.push(*c);
                    }
                }
                Shape::MultiPoint(points)
            }
            GeometryKind::MultiLineString => {
                let n = self.count(9)?;
                let mut lines = Vec::with_capacity(n);
                for _ in 0..n {
                    let part = self.part(GeometryKind::MultiLineString, GeometryKind::LineString)?;
                    if let Shape::LineString(cs) = part.shape() {
                        lines.push(cs.clone());
                    }
                }
                Shape::MultiLineString(lines)
            }
            GeometryKind::MultiPolygon => {
                let n = self.count(9)?;
                let mut polys = Vec::with_capacity(n);
                for _ in 0..n {
                    let part = self.part(GeometryKind::MultiPolygon, GeometryKind::Polygon)?;
                    if let Shape::Polygon(p) = part.shape() {
                        polys.push(p.clone());
                    }
                }
                Shape::MultiPolygon(polys)
            }
        };
        Ok(Geometry::new(shape).with_srid(header.srid))
    }

    fn part(
        &mut self,
        container: GeometryKind,
        expected: GeometryKind,
    ) -> Result<Geometry, WkbError> {
        let order = self.little_endian;
        let part = self.geometry()?;
        self.little_endian = order;
        if part.kind() != expected {
            return Err(WkbError::UnexpectedPart {
                container,
                expected,
                found: part.kind(),
            });
        }
        Ok(part)
    }

    fn coordinate(&mut self, has_z: bool) -> Result<Coordinate, WkbError> {
        let x = self.f64()?;
        let y = self.f64()?;
        let z = if has_z { Some(self.f64()?) } else { None };
        Ok(Coordinate { x, y, z })
    }

    fn coordinates(&mut self, has_z: bool) -> Result<Vec<Coordinate>, WkbError> {
        let n = self.count(if has_z { 24 } else { 16 })?;
        (0..n).map(|_| self.coordinate(has_z)).collect()
    }

    fn polygon_body(&mut self, has_z: bool) -> Result<Polygon, WkbError> {
        let n = self.count(4)?;
        let mut rings = (0..n)
            .map(|_| self.coordinates(has_z))
            .collect::<Result<Vec<_>, _>>()?;
        if rings.is_empty() {
            return Ok(Polygon::new(Vec::new(), Vec::new()));
        }
        let exterior = rings.remove(0);
        Ok(Polygon::new(exterior, rings))
    }
}
