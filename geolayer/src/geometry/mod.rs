//! Simple-features geometry model.
//!
//! A [`Geometry`] is a [`Shape`] (Point, LineString, Polygon and their
//! multi-part forms) plus an optional spatial reference identifier. Values
//! are immutable once constructed; every constructor returns a fresh value.

mod algorithms;
mod envelope;
pub mod wkb;
pub mod wkt;

pub use algorithms::{haversine_km, Location, EARTH_RADIUS_KM};
pub use envelope::Envelope;

use crate::errors::{ErrorKind, GeoError, GeoResult};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A position with X, Y and an optional Z ordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl Coordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Coordinate { x, y, z: None }
    }

    pub fn new_3d(x: f64, y: f64, z: f64) -> Self {
        Coordinate { x, y, z: Some(z) }
    }

    /// Returns true when every present ordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.map_or(true, f64::is_finite)
    }

    /// Planar distance in the XY plane.
    pub fn distance(&self, other: &Coordinate) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Compares only the X and Y ordinates.
    pub fn equals_2d(&self, other: &Coordinate) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl Display for Coordinate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.z {
            Some(z) => write!(f, "{} {} {}", self.x, self.y, z),
            None => write!(f, "{} {}", self.x, self.y),
        }
    }
}

/// A polygon with one exterior ring and zero or more holes. Rings are closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    pub exterior: Vec<Coordinate>,
    pub interiors: Vec<Vec<Coordinate>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Coordinate>, interiors: Vec<Vec<Coordinate>>) -> Self {
        Polygon {
            exterior,
            interiors,
        }
    }

    pub fn rings(&self) -> impl Iterator<Item = &Vec<Coordinate>> {
        std::iter::once(&self.exterior).chain(self.interiors.iter())
    }
}

/// The shape payload of a geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    Point(Coordinate),
    LineString(Vec<Coordinate>),
    Polygon(Polygon),
    MultiPoint(Vec<Coordinate>),
    MultiLineString(Vec<Vec<Coordinate>>),
    MultiPolygon(Vec<Polygon>),
}

/// Geometry kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    LineString,
    Polygon,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
}

impl GeometryKind {
    pub const ALL: [GeometryKind; 6] = [
        GeometryKind::Point,
        GeometryKind::LineString,
        GeometryKind::Polygon,
        GeometryKind::MultiPoint,
        GeometryKind::MultiLineString,
        GeometryKind::MultiPolygon,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            GeometryKind::Point => "Point",
            GeometryKind::LineString => "LineString",
            GeometryKind::Polygon => "Polygon",
            GeometryKind::MultiPoint => "MultiPoint",
            GeometryKind::MultiLineString => "MultiLineString",
            GeometryKind::MultiPolygon => "MultiPolygon",
        }
    }

    /// Simple-features type code shared by WKB and the property encoder.
    pub fn code(&self) -> u32 {
        match self {
            GeometryKind::Point => 1,
            GeometryKind::LineString => 2,
            GeometryKind::Polygon => 3,
            GeometryKind::MultiPoint => 4,
            GeometryKind::MultiLineString => 5,
            GeometryKind::MultiPolygon => 6,
        }
    }

    pub fn from_code(code: u32) -> Option<GeometryKind> {
        GeometryKind::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<GeometryKind> {
        GeometryKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(name))
    }
}

impl Display for GeometryKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An immutable geometry value with an optional SRID.
///
/// `Display` renders the value as (E)WKT.
///
/// # Examples
///
/// ```rust,ignore
/// use geolayer::geometry::{Coordinate, Geometry};
///
/// let line = Geometry::line_string(vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)]);
/// assert_eq!(line.to_string(), "LINESTRING (0 0, 1 1)");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    shape: Shape,
    srid: Option<u32>,
}

impl Geometry {
    pub fn new(shape: Shape) -> Self {
        Geometry { shape, srid: None }
    }

    pub fn point(x: f64, y: f64) -> Self {
        Geometry::new(Shape::Point(Coordinate::new(x, y)))
    }

    pub fn point_z(x: f64, y: f64, z: f64) -> Self {
        Geometry::new(Shape::Point(Coordinate::new_3d(x, y, z)))
    }

    pub fn line_string(coordinates: Vec<Coordinate>) -> Self {
        Geometry::new(Shape::LineString(coordinates))
    }

    pub fn polygon(exterior: Vec<Coordinate>, interiors: Vec<Vec<Coordinate>>) -> Self {
        Geometry::new(Shape::Polygon(Polygon::new(exterior, interiors)))
    }

    pub fn multi_point(points: Vec<Coordinate>) -> Self {
        Geometry::new(Shape::MultiPoint(points))
    }

    pub fn multi_line_string(lines: Vec<Vec<Coordinate>>) -> Self {
        Geometry::new(Shape::MultiLineString(lines))
    }

    pub fn multi_polygon(polygons: Vec<Polygon>) -> Self {
        Geometry::new(Shape::MultiPolygon(polygons))
    }

    /// Builds the closed rectangular polygon covering an envelope.
    pub fn from_envelope(envelope: &Envelope) -> Self {
        let ring = vec![
            Coordinate::new(envelope.min_x, envelope.min_y),
            Coordinate::new(envelope.min_x, envelope.max_y),
            Coordinate::new(envelope.max_x, envelope.max_y),
            Coordinate::new(envelope.max_x, envelope.min_y),
            Coordinate::new(envelope.min_x, envelope.min_y),
        ];
        Geometry::polygon(ring, Vec::new())
    }

    /// Returns a copy of this geometry tagged with `srid`.
    pub fn with_srid(&self, srid: Option<u32>) -> Self {
        Geometry {
            shape: self.shape.clone(),
            srid,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn srid(&self) -> Option<u32> {
        self.srid
    }

    pub fn kind(&self) -> GeometryKind {
        match &self.shape {
            Shape::Point(_) => GeometryKind::Point,
            Shape::LineString(_) => GeometryKind::LineString,
            Shape::Polygon(_) => GeometryKind::Polygon,
            Shape::MultiPoint(_) => GeometryKind::MultiPoint,
            Shape::MultiLineString(_) => GeometryKind::MultiLineString,
            Shape::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }

    /// All coordinates in traversal order (rings and parts concatenated).
    pub fn coordinates(&self) -> Vec<Coordinate> {
        match &self.shape {
            Shape::Point(c) => vec![*c],
            Shape::LineString(cs) | Shape::MultiPoint(cs) => cs.clone(),
            Shape::Polygon(p) => p.rings().flatten().copied().collect(),
            Shape::MultiLineString(lines) => lines.iter().flatten().copied().collect(),
            Shape::MultiPolygon(polys) => polys
                .iter()
                .flat_map(|p| p.rings().flatten().copied())
                .collect(),
        }
    }

    /// The first coordinate; every valid geometry has one.
    pub fn first_coordinate(&self) -> Option<Coordinate> {
        match &self.shape {
            Shape::Point(c) => Some(*c),
            Shape::LineString(cs) | Shape::MultiPoint(cs) => cs.first().copied(),
            Shape::Polygon(p) => p.exterior.first().copied(),
            Shape::MultiLineString(lines) => lines.first().and_then(|l| l.first().copied()),
            Shape::MultiPolygon(polys) => polys.first().and_then(|p| p.exterior.first().copied()),
        }
    }

    pub fn has_z(&self) -> bool {
        self.first_coordinate().is_some_and(|c| c.z.is_some())
    }

    /// The exact minimum bounding rectangle.
    pub fn envelope(&self) -> Envelope {
        let mut envelope = Envelope::empty();
        for c in self.coordinates() {
            envelope.expand_to_include(c.x, c.y);
        }
        envelope
    }

    /// Structural validation: finite ordinates, minimum point counts, closed
    /// rings and a consistent dimension.
    pub fn validate(&self) -> GeoResult<()> {
        let invalid = |reason: &str| {
            Err(GeoError::new(
                &format!("Invalid {} geometry: {}", self.kind(), reason),
                ErrorKind::EncodingError,
            ))
        };

        let coordinates = self.coordinates();
        if coordinates.is_empty() {
            return invalid("no coordinates");
        }
        if let Some(bad) = coordinates.iter().find(|c| !c.is_finite()) {
            return invalid(&format!("non-finite coordinate ({})", bad));
        }
        let has_z = coordinates[0].z.is_some();
        if coordinates.iter().any(|c| c.z.is_some() != has_z) {
            return invalid("mixed coordinate dimensions");
        }

        match &self.shape {
            Shape::Point(_) | Shape::MultiPoint(_) => Ok(()),
            Shape::LineString(cs) => check_line(cs).or_else(|r| invalid(&r)),
            Shape::MultiLineString(lines) => {
                for line in lines {
                    if let Err(r) = check_line(line) {
                        return invalid(&r);
                    }
                }
                Ok(())
            }
            Shape::Polygon(p) => check_polygon(p).or_else(|r| invalid(&r)),
            Shape::MultiPolygon(polys) => {
                for p in polys {
                    if let Err(r) = check_polygon(p) {
                        return invalid(&r);
                    }
                }
                Ok(())
            }
        }
    }

    pub fn intersects(&self, other: &Geometry) -> bool {
        algorithms::intersects(self, other)
    }

    /// True when `other` lies entirely inside this geometry, boundary included.
    pub fn contains(&self, other: &Geometry) -> bool {
        algorithms::contains(self, other)
    }

    pub fn within(&self, other: &Geometry) -> bool {
        algorithms::contains(other, self)
    }

    /// Planar distance from `point` to the nearest part of this geometry.
    pub fn distance_to(&self, point: &Coordinate) -> f64 {
        point.distance(&self.closest_point(point))
    }

    /// The point of this geometry nearest to `point` in the plane; `point`
    /// itself when it lies inside a polygon.
    pub fn closest_point(&self, point: &Coordinate) -> Coordinate {
        algorithms::closest_point(self, point)
    }

    /// Total length of all linear components (polygon perimeters included).
    pub fn length(&self) -> f64 {
        algorithms::length(self)
    }

    /// Area of all polygonal components, holes subtracted.
    pub fn area(&self) -> f64 {
        algorithms::area(self)
    }
}

impl Display for Geometry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", wkt::write_wkt(self))
    }
}

fn check_line(coordinates: &[Coordinate]) -> Result<(), String> {
    if coordinates.len() < 2 {
        return Err(format!("line needs 2 or more points, found {}", coordinates.len()));
    }
    Ok(())
}

fn check_polygon(polygon: &Polygon) -> Result<(), String> {
    for ring in polygon.rings() {
        if ring.len() < 4 {
            return Err(format!("ring needs 4 or more points, found {}", ring.len()));
        }
        let first = ring[0];
        let last = ring[ring.len() - 1];
        if !first.equals_2d(&last) {
            return Err(format!("ring is not closed ({} != {})", first, last));
        }
    }
    Ok(())
}
