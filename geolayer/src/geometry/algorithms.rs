//! Exact planar predicates and measures used by the confirm phase of searches.

use super::{Coordinate, Geometry, Polygon, Shape};

/// Mean earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6_371.0088;

const EPSILON: f64 = 1e-10;

/// Position of a point relative to a polygon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Interior,
    Boundary,
    Exterior,
}

/// One primitive component of a geometry.
enum Part<'a> {
    Point(Coordinate),
    Line(&'a [Coordinate]),
    Area(&'a Polygon),
}

fn parts(geometry: &Geometry) -> Vec<Part<'_>> {
    match geometry.shape() {
        Shape::Point(c) => vec![Part::Point(*c)],
        Shape::LineString(cs) => vec![Part::Line(cs)],
        Shape::Polygon(p) => vec![Part::Area(p)],
        Shape::MultiPoint(cs) => cs.iter().map(|c| Part::Point(*c)).collect(),
        Shape::MultiLineString(lines) => lines.iter().map(|l| Part::Line(l)).collect(),
        Shape::MultiPolygon(polys) => polys.iter().map(Part::Area).collect(),
    }
}

/// Great-circle distance in kilometres; `x` is longitude and `y` latitude, in degrees.
pub fn haversine_km(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.y.to_radians();
    let lat2 = b.y.to_radians();
    let d_lat = (b.y - a.y).to_radians();
    let d_lon = (b.x - a.x).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

pub(super) fn intersects(a: &Geometry, b: &Geometry) -> bool {
    if !a.envelope().intersects(&b.envelope()) {
        return false;
    }
    let b_parts = parts(b);
    parts(a)
        .iter()
        .any(|pa| b_parts.iter().any(|pb| part_intersects(pa, pb)))
}

pub(super) fn contains(outer: &Geometry, inner: &Geometry) -> bool {
    if !outer.envelope().contains(&inner.envelope()) {
        return false;
    }
    let outer_parts = parts(outer);
    parts(inner)
        .iter()
        .all(|pi| outer_parts.iter().any(|po| part_covers(po, pi)))
}

pub(super) fn closest_point(geometry: &Geometry, point: &Coordinate) -> Coordinate {
    let mut best = Coordinate::new(point.x, point.y);
    let mut best_distance = f64::INFINITY;
    let mut consider = |candidate: Coordinate| {
        let d = point.distance(&candidate);
        if d < best_distance {
            best_distance = d;
            best = Coordinate::new(candidate.x, candidate.y);
        }
    };

    for part in parts(geometry) {
        match part {
            Part::Point(c) => consider(c),
            Part::Line(line) => {
                for w in line.windows(2) {
                    consider(closest_on_segment(point, &w[0], &w[1]));
                }
            }
            Part::Area(polygon) => {
                if locate(point, polygon) != Location::Exterior {
                    consider(*point);
                } else {
                    for ring in polygon.rings() {
                        for w in ring.windows(2) {
                            consider(closest_on_segment(point, &w[0], &w[1]));
                        }
                    }
                }
            }
        }
    }
    best
}

pub(super) fn length(geometry: &Geometry) -> f64 {
    let line_length =
        |line: &[Coordinate]| -> f64 { line.windows(2).map(|w| w[0].distance(&w[1])).sum() };
    parts(geometry)
        .iter()
        .map(|part| match part {
            Part::Point(_) => 0.0,
            Part::Line(line) => line_length(line),
            Part::Area(polygon) => polygon.rings().map(|r| line_length(r)).sum(),
        })
        .sum()
}

pub(super) fn area(geometry: &Geometry) -> f64 {
    parts(geometry)
        .iter()
        .map(|part| match part {
            Part::Area(polygon) => {
                let holes: f64 = polygon.interiors.iter().map(|h| ring_area(h)).sum();
                ring_area(&polygon.exterior) - holes
            }
            _ => 0.0,
        })
        .sum()
}

fn ring_area(ring: &[Coordinate]) -> f64 {
    let twice: f64 = ring
        .windows(2)
        .map(|w| w[0].x * w[1].y - w[1].x * w[0].y)
        .sum();
    (twice / 2.0).abs()
}

/// Locates a point against a polygon with holes.
pub(crate) fn locate(point: &Coordinate, polygon: &Polygon) -> Location {
    if polygon.rings().any(|ring| point_on_line(point, ring)) {
        return Location::Boundary;
    }
    if !point_in_ring(point, &polygon.exterior) {
        return Location::Exterior;
    }
    if polygon.interiors.iter().any(|hole| point_in_ring(point, hole)) {
        return Location::Exterior;
    }
    Location::Interior
}

fn part_intersects(a: &Part<'_>, b: &Part<'_>) -> bool {
    match (a, b) {
        (Part::Point(p), Part::Point(q)) => p.equals_2d(q),
        (Part::Point(p), Part::Line(l)) | (Part::Line(l), Part::Point(p)) => point_on_line(p, l),
        (Part::Point(p), Part::Area(poly)) | (Part::Area(poly), Part::Point(p)) => {
            locate(p, poly) != Location::Exterior
        }
        (Part::Line(l1), Part::Line(l2)) => lines_cross(l1, l2),
        (Part::Line(l), Part::Area(poly)) | (Part::Area(poly), Part::Line(l)) => {
            poly.rings().any(|ring| lines_cross(l, ring))
                || l.first().is_some_and(|c| locate(c, poly) != Location::Exterior)
        }
        (Part::Area(p1), Part::Area(p2)) => {
            p1.rings().any(|r1| p2.rings().any(|r2| lines_cross(r1, r2)))
                || p1.exterior.first().is_some_and(|c| locate(c, p2) != Location::Exterior)
                || p2.exterior.first().is_some_and(|c| locate(c, p1) != Location::Exterior)
        }
    }
}

/// True when every point of `inner` lies on `outer`.
fn part_covers(outer: &Part<'_>, inner: &Part<'_>) -> bool {
    match (outer, inner) {
        (Part::Point(o), Part::Point(p)) => o.equals_2d(p),
        (Part::Point(o), Part::Line(l)) => l.iter().all(|c| o.equals_2d(c)),
        (Part::Line(l), Part::Point(p)) => point_on_line(p, l),
        (Part::Line(outer_line), Part::Line(inner_line)) => inner_line
            .windows(2)
            .all(|w| segment_covered_by_line(&w[0], &w[1], outer_line)),
        (Part::Area(poly), Part::Point(p)) => locate(p, poly) != Location::Exterior,
        (Part::Area(poly), Part::Line(l)) => line_covered_by_area(l, poly),
        (Part::Area(poly), Part::Area(inner_poly)) => {
            line_covered_by_area(&inner_poly.exterior, poly)
                && poly.interiors.iter().all(|hole| {
                    !sample_points(hole)
                        .iter()
                        .any(|c| locate(c, inner_poly) == Location::Interior)
                })
        }
        (Part::Point(_), Part::Area(_)) | (Part::Line(_), Part::Area(_)) => false,
    }
}

fn line_covered_by_area(line: &[Coordinate], polygon: &Polygon) -> bool {
    if line.len() == 1 {
        return locate(&line[0], polygon) != Location::Exterior;
    }
    line.windows(2).all(|w| {
        let (a, b) = (&w[0], &w[1]);
        let mut params = vec![0.0, 1.0];
        for ring in polygon.rings() {
            for edge in ring.windows(2) {
                intersection_params(a, b, &edge[0], &edge[1], &mut params);
            }
        }
        pieces_satisfy(a, b, params, |c| locate(c, polygon) != Location::Exterior)
    })
}

fn segment_covered_by_line(a: &Coordinate, b: &Coordinate, line: &[Coordinate]) -> bool {
    let mut params = vec![0.0, 1.0];
    for vertex in line {
        if point_on_segment(vertex, a, b) {
            params.push(segment_param(a, b, vertex));
        }
    }
    pieces_satisfy(a, b, params, |c| point_on_line(c, line))
}

/// Splits segment `ab` at the given parameters and checks the predicate on
/// every split point and every piece midpoint.
fn pieces_satisfy(
    a: &Coordinate,
    b: &Coordinate,
    mut params: Vec<f64>,
    predicate: impl Fn(&Coordinate) -> bool,
) -> bool {
    params.sort_by(|x, y| x.total_cmp(y));
    params.dedup_by(|x, y| (*x - *y).abs() < EPSILON);

    let at = |t: f64| Coordinate::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t);
    if !params.iter().all(|t| predicate(&at(*t))) {
        return false;
    }
    params
        .windows(2)
        .all(|w| predicate(&at((w[0] + w[1]) / 2.0)))
}

/// Pushes the parameters along `ab` where it meets segment `cd`.
fn intersection_params(
    a: &Coordinate,
    b: &Coordinate,
    c: &Coordinate,
    d: &Coordinate,
    out: &mut Vec<f64>,
) {
    let (rx, ry) = (b.x - a.x, b.y - a.y);
    let (sx, sy) = (d.x - c.x, d.y - c.y);
    let denom = rx * sy - ry * sx;
    let (qx, qy) = (c.x - a.x, c.y - a.y);

    if denom.abs() < EPSILON {
        // parallel; only collinear overlap contributes split points
        if orientation(a, b, c) == 0 {
            for p in [c, d] {
                if point_on_segment(p, a, b) {
                    out.push(segment_param(a, b, p));
                }
            }
        }
        return;
    }

    let t = (qx * sy - qy * sx) / denom;
    let u = (qx * ry - qy * rx) / denom;
    if (-EPSILON..=1.0 + EPSILON).contains(&t) && (-EPSILON..=1.0 + EPSILON).contains(&u) {
        out.push(t.clamp(0.0, 1.0));
    }
}

fn segment_param(a: &Coordinate, b: &Coordinate, p: &Coordinate) -> f64 {
    let (rx, ry) = (b.x - a.x, b.y - a.y);
    let len2 = rx * rx + ry * ry;
    if len2 == 0.0 {
        return 0.0;
    }
    (((p.x - a.x) * rx + (p.y - a.y) * ry) / len2).clamp(0.0, 1.0)
}

fn closest_on_segment(p: &Coordinate, a: &Coordinate, b: &Coordinate) -> Coordinate {
    let t = segment_param(a, b, p);
    Coordinate::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
}

fn sample_points(ring: &[Coordinate]) -> Vec<Coordinate> {
    let mut points: Vec<Coordinate> = ring.to_vec();
    points.extend(
        ring.windows(2)
            .map(|w| Coordinate::new((w[0].x + w[1].x) / 2.0, (w[0].y + w[1].y) / 2.0)),
    );
    points
}

fn lines_cross(l1: &[Coordinate], l2: &[Coordinate]) -> bool {
    if l1.len() == 1 {
        return point_on_line(&l1[0], l2);
    }
    if l2.len() == 1 {
        return point_on_line(&l2[0], l1);
    }
    l1.windows(2).any(|s1| {
        l2.windows(2)
            .any(|s2| segments_intersect(&s1[0], &s1[1], &s2[0], &s2[1]))
    })
}

fn point_on_line(p: &Coordinate, line: &[Coordinate]) -> bool {
    match line.len() {
        0 => false,
        1 => p.equals_2d(&line[0]),
        _ => line.windows(2).any(|w| point_on_segment(p, &w[0], &w[1])),
    }
}

fn point_on_segment(p: &Coordinate, a: &Coordinate, b: &Coordinate) -> bool {
    orientation(a, b, p) == 0 && on_segment(a, p, b)
}

/// Ray casting; boundary points are reported by [`locate`] before this runs.
fn point_in_ring(point: &Coordinate, ring: &[Coordinate]) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let mut inside = false;
    let n = ring.len();
    let mut j = n - 1;

    for i in 0..n {
        let (xi, yi) = (ring[i].x, ring[i].y);
        let (xj, yj) = (ring[j].x, ring[j].y);

        if ((yi > point.y) != (yj > point.y))
            && (point.x < (xj - xi) * (point.y - yi) / (yj - yi) + xi)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

fn segments_intersect(p1: &Coordinate, p2: &Coordinate, p3: &Coordinate, p4: &Coordinate) -> bool {
    let o1 = orientation(p1, p2, p3);
    let o2 = orientation(p1, p2, p4);
    let o3 = orientation(p3, p4, p1);
    let o4 = orientation(p3, p4, p2);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    (o1 == 0 && on_segment(p1, p3, p2))
        || (o2 == 0 && on_segment(p1, p4, p2))
        || (o3 == 0 && on_segment(p3, p1, p4))
        || (o4 == 0 && on_segment(p3, p2, p4))
}

/// 0 when collinear, 1 clockwise, 2 counter-clockwise.
fn orientation(p: &Coordinate, q: &Coordinate, r: &Coordinate) -> i32 {
    let val = (q.y - p.y) * (r.x - q.x) - (q.x - p.x) * (r.y - q.y);
    if val.abs() < EPSILON {
        0
    } else if val > 0.0 {
        1
    } else {
        2
    }
}

/// Whether q lies within the bounding box of segment pr (assumes collinearity).
fn on_segment(p: &Coordinate, q: &Coordinate, r: &Coordinate) -> bool {
    q.x <= p.x.max(r.x) + EPSILON
        && q.x >= p.x.min(r.x) - EPSILON
        && q.y <= p.y.max(r.y) + EPSILON
        && q.y >= p.y.min(r.y) - EPSILON
}
