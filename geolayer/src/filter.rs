//! Two-phase search predicates.
//!
//! A [`SearchFilter`] first prunes index nodes by bounding box, then confirms
//! each candidate against its decoded geometry.

use std::f64::consts::FRAC_PI_2;

use crate::crs::Crs;
use crate::geometry::{haversine_km, Coordinate, Envelope, Geometry, EARTH_RADIUS_KM};

/// Property name for great-circle distances, in kilometres.
pub const ORTHODROMIC_DISTANCE: &str = "OrthodromicDistance";
/// Property name for planar distances, in coordinate units.
pub const PLANAR_DISTANCE: &str = "Distance";

/// How distances between coordinates are measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceModel {
    /// Euclidean distance in coordinate units.
    Planar,
    /// Haversine distance on a spherical earth, in kilometres.
    GreatCircle,
}

impl DistanceModel {
    /// Geographic (or unknown) reference systems measure great-circle
    /// distance; everything else is planar.
    pub fn for_crs(crs: Option<Crs>) -> DistanceModel {
        match crs {
            Some(crs) if !crs.is_geographic() => DistanceModel::Planar,
            _ => DistanceModel::GreatCircle,
        }
    }

    pub fn property_name(&self) -> &'static str {
        match self {
            DistanceModel::Planar => PLANAR_DISTANCE,
            DistanceModel::GreatCircle => ORTHODROMIC_DISTANCE,
        }
    }

    /// Distance from `point` to the nearest point of `geometry`.
    pub fn distance(&self, point: &Coordinate, geometry: &Geometry) -> f64 {
        match self {
            DistanceModel::Planar => geometry.distance_to(point),
            DistanceModel::GreatCircle => haversine_km(point, &geometry.closest_point(point)),
        }
    }

    /// A box guaranteed to contain every coordinate within `max_distance`
    /// of `point`.
    pub fn search_box(&self, point: &Coordinate, max_distance: f64) -> Envelope {
        match self {
            DistanceModel::Planar => Envelope::new(
                point.x - max_distance,
                point.y - max_distance,
                point.x + max_distance,
                point.y + max_distance,
            ),
            DistanceModel::GreatCircle => great_circle_box(point, max_distance),
        }
    }
}

fn great_circle_box(point: &Coordinate, max_distance_km: f64) -> Envelope {
    let angular = max_distance_km / EARTH_RADIUS_KM;
    let lat = point.y.to_radians();
    let min_lat = lat - angular;
    let max_lat = lat + angular;

    if min_lat <= -FRAC_PI_2 || max_lat >= FRAC_PI_2 {
        return Envelope::new(
            -180.0,
            min_lat.to_degrees().max(-90.0),
            180.0,
            max_lat.to_degrees().min(90.0),
        );
    }

    let ratio = angular.sin() / lat.cos();
    if ratio >= 1.0 {
        return Envelope::new(-180.0, min_lat.to_degrees(), 180.0, max_lat.to_degrees());
    }
    let delta_lon = ratio.asin().to_degrees();
    let min_lon = point.x - delta_lon;
    let max_lon = point.x + delta_lon;
    if min_lon < -180.0 || max_lon > 180.0 {
        // wraps the antimeridian
        return Envelope::new(-180.0, min_lat.to_degrees(), 180.0, max_lat.to_degrees());
    }
    Envelope::new(min_lon, min_lat.to_degrees(), max_lon, max_lat.to_degrees())
}

/// Outcome of confirming a candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchMatch {
    /// Distance from the query point, for nearest-neighbour searches.
    pub distance: Option<f64>,
}

/// A spatial predicate used by index searches.
///
/// All boundaries are inclusive: a geometry touching a query window
/// intersects it, and one lying on the edge of a containing area is within it.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchFilter {
    /// Every indexed geometry.
    MatchAll,
    /// Geometries lying entirely inside the given geometry.
    Within(Geometry),
    /// Geometries whose envelope lies inside the given envelope.
    WithinEnvelope(Envelope),
    /// Geometries sharing at least one point with the given geometry.
    Intersects(Geometry),
    /// Geometries sharing at least one point with the given window.
    IntersectsWindow(Envelope),
    /// Geometries within `max_distance` of `point`, each reported with its
    /// distance.
    NearestNeighbor {
        point: Coordinate,
        max_distance: f64,
        model: DistanceModel,
        search_box: Envelope,
    },
}

impl SearchFilter {
    pub fn within(boundary: Geometry) -> Self {
        SearchFilter::Within(boundary)
    }

    pub fn intersects(geometry: Geometry) -> Self {
        SearchFilter::Intersects(geometry)
    }

    pub fn within_envelope(envelope: Envelope) -> Self {
        SearchFilter::WithinEnvelope(envelope)
    }

    pub fn intersects_window(envelope: Envelope) -> Self {
        SearchFilter::IntersectsWindow(envelope)
    }

    pub fn nearest_neighbor(point: Coordinate, max_distance: f64, model: DistanceModel) -> Self {
        SearchFilter::NearestNeighbor {
            point,
            max_distance,
            search_box: model.search_box(&point, max_distance),
            model,
        }
    }

    /// Returns true when the subtree or entry bounded by `envelope` may hold
    /// a match.
    pub fn prune(&self, envelope: &Envelope) -> bool {
        match self {
            SearchFilter::MatchAll => true,
            SearchFilter::Within(boundary) => boundary.envelope().intersects(envelope),
            SearchFilter::WithinEnvelope(window) | SearchFilter::IntersectsWindow(window) => {
                window.intersects(envelope)
            }
            SearchFilter::Intersects(geometry) => geometry.envelope().intersects(envelope),
            SearchFilter::NearestNeighbor {
                point,
                max_distance,
                model,
                search_box,
            } => match model {
                DistanceModel::Planar => {
                    envelope.min_distance_to(point.x, point.y) <= *max_distance
                }
                DistanceModel::GreatCircle => search_box.intersects(envelope),
            },
        }
    }

    /// Exact test against a candidate's decoded geometry.
    pub fn confirm(&self, geometry: &Geometry) -> Option<SearchMatch> {
        let matched = match self {
            SearchFilter::MatchAll => true,
            SearchFilter::Within(boundary) => boundary.contains(geometry),
            SearchFilter::WithinEnvelope(window) => window.contains(&geometry.envelope()),
            SearchFilter::Intersects(other) => other.intersects(geometry),
            SearchFilter::IntersectsWindow(window) => {
                window.intersects(&geometry.envelope())
                    && Geometry::from_envelope(window).intersects(geometry)
            }
            SearchFilter::NearestNeighbor {
                point,
                max_distance,
                model,
                ..
            } => {
                let distance = model.distance(point, geometry);
                return (distance <= *max_distance).then_some(SearchMatch {
                    distance: Some(distance),
                });
            }
        };
        matched.then_some(SearchMatch { distance: None })
    }

    /// Name of the distance property attached to matches, if any.
    pub fn distance_property(&self) -> Option<&'static str> {
        match self {
            SearchFilter::NearestNeighbor { model, .. } => Some(model.property_name()),
            _ => None,
        }
    }
}
