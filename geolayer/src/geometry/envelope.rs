use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

use super::Coordinate;

/// An axis-aligned bounding rectangle.
///
/// The empty envelope has inverted infinite bounds so that expanding it by
/// any envelope yields that envelope. All predicates treat edges as closed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Envelope {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Envelope {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Builds the envelope spanned by two opposite corners in any order.
    pub fn from_corners(a: &Coordinate, b: &Coordinate) -> Self {
        Envelope {
            min_x: a.x.min(b.x),
            min_y: a.y.min(b.y),
            max_x: a.x.max(b.x),
            max_y: a.y.max(b.y),
        }
    }

    pub fn empty() -> Self {
        Envelope {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn center(&self) -> Coordinate {
        Coordinate::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        !(self.max_x < other.min_x
            || self.min_x > other.max_x
            || self.max_y < other.min_y
            || self.min_y > other.max_y)
    }

    pub fn contains(&self, other: &Envelope) -> bool {
        self.min_x <= other.min_x
            && self.min_y <= other.min_y
            && self.max_x >= other.max_x
            && self.max_y >= other.max_y
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }

    pub fn area(&self) -> f64 {
        if self.is_empty() {
            0.0
        } else {
            self.width() * self.height()
        }
    }

    /// Area growth needed for this envelope to also cover `other`.
    pub fn enlargement(&self, other: &Envelope) -> f64 {
        self.merge(other).area() - self.area()
    }

    pub fn merge(&self, other: &Envelope) -> Envelope {
        Envelope {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    pub fn expand(&mut self, other: &Envelope) {
        self.min_x = self.min_x.min(other.min_x);
        self.min_y = self.min_y.min(other.min_y);
        self.max_x = self.max_x.max(other.max_x);
        self.max_y = self.max_y.max(other.max_y);
    }

    pub fn expand_to_include(&mut self, x: f64, y: f64) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    /// Minimum planar distance from a point to this envelope, 0 when inside.
    pub fn min_distance_to(&self, x: f64, y: f64) -> f64 {
        let closest_x = x.clamp(self.min_x, self.max_x);
        let closest_y = y.clamp(self.min_y, self.max_y);

        let dx = x - closest_x;
        let dy = y - closest_y;
        (dx * dx + dy * dy).sqrt()
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Envelope::empty()
    }
}

impl Display for Envelope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Envelope({}, {}, {}, {})",
            self.min_x, self.min_y, self.max_x, self.max_y
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_envelope_merges_to_other() {
        let mut env = Envelope::empty();
        assert!(env.is_empty());
        assert_eq!(env.area(), 0.0);
        env.expand(&Envelope::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(env, Envelope::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn test_intersects_is_edge_inclusive() {
        let a = Envelope::new(0.0, 0.0, 1.0, 1.0);
        let b = Envelope::new(1.0, 1.0, 2.0, 2.0);
        let c = Envelope::new(1.1, 0.0, 2.0, 1.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_contains() {
        let outer = Envelope::new(0.0, 0.0, 10.0, 10.0);
        assert!(outer.contains(&Envelope::new(0.0, 0.0, 10.0, 10.0)));
        assert!(outer.contains(&Envelope::new(2.0, 2.0, 3.0, 3.0)));
        assert!(!outer.contains(&Envelope::new(-1.0, 2.0, 3.0, 3.0)));
        assert!(outer.contains_point(10.0, 0.0));
    }

    #[test]
    fn test_enlargement() {
        let a = Envelope::new(0.0, 0.0, 2.0, 2.0);
        assert_eq!(a.enlargement(&Envelope::new(1.0, 1.0, 1.0, 1.0)), 0.0);
        assert_eq!(a.enlargement(&Envelope::new(0.0, 0.0, 4.0, 2.0)), 4.0);
    }

    #[test]
    fn test_min_distance() {
        let env = Envelope::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(env.min_distance_to(0.5, 0.5), 0.0);
        assert_eq!(env.min_distance_to(4.0, 1.0), 3.0);
        assert_eq!(env.min_distance_to(4.0, 5.0), 5.0);
    }

    #[test]
    fn test_from_corners_normalizes() {
        let env = Envelope::from_corners(&Coordinate::new(5.0, -1.0), &Coordinate::new(1.0, 3.0));
        assert_eq!(env, Envelope::new(1.0, -1.0, 5.0, 3.0));
        assert_eq!(env.center(), Coordinate::new(3.0, 1.0));
    }
}
