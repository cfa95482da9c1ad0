//! Lazy, composable query pipelines over search results.
//!
//! Every stage except sorting is lazy: nothing is pulled from the index
//! until the pipeline is consumed, and consumption may stop at any point.
//! Sorting needs the whole candidate set, so a sort stage drains its
//! upstream completely on the first pull and only then emits anything.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::errors::GeoResult;
use crate::geometry::Geometry;
use crate::index::{SearchHit, SearchResults};
use crate::store::{compare_values, Record, Value};

type FlowIter = Box<dyn Iterator<Item = GeoResult<GeoPipeFlow>> + Send>;

/// One element travelling through a pipeline: the record, its decoded
/// geometry and any properties derived along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoPipeFlow {
    record: Record,
    geometry: Geometry,
    properties: BTreeMap<String, Value>,
}

impl GeoPipeFlow {
    pub fn new(record: Record, geometry: Geometry) -> Self {
        GeoPipeFlow {
            record,
            geometry,
            properties: BTreeMap::new(),
        }
    }

    pub fn record(&self) -> &Record {
        &self.record
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// A derived property, falling back to the record field of that name.
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties
            .get(name)
            .or_else(|| self.record.get(name))
    }

    pub fn set_property<V: Into<Value>>(&mut self, name: &str, value: V) {
        self.properties.insert(name.to_string(), value.into());
    }

    /// Derived properties only.
    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub fn into_record(self) -> Record {
        self.record
    }
}

/// A lazy single-pass sequence of [`GeoPipeFlow`]s.
///
/// ```rust,ignore
/// let nearest = layer
///     .pipeline(SearchFilter::nearest_neighbor(point, 10.0, DistanceModel::GreatCircle))?
///     .sort("OrthodromicDistance")
///     .limit(5)
///     .to_vec()?;
/// ```
pub struct GeoPipeline {
    source: FlowIter,
}

impl GeoPipeline {
    pub fn new<I>(source: I) -> Self
    where
        I: Iterator<Item = GeoResult<GeoPipeFlow>> + Send + 'static,
    {
        GeoPipeline {
            source: Box::new(source),
        }
    }

    /// Starts a pipeline from search results. Nearest-neighbour distances
    /// become a derived property named after the filter's distance model.
    pub fn from_search(results: SearchResults) -> Self {
        let distance_property = results.search_filter().distance_property();
        GeoPipeline::new(results.map(move |hit| {
            hit.map(|hit| {
                let SearchHit {
                    record,
                    geometry,
                    distance,
                } = hit;
                let mut flow = GeoPipeFlow::new(record, geometry);
                if let (Some(name), Some(distance)) = (distance_property, distance) {
                    flow.set_property(name, distance);
                }
                flow
            })
        }))
    }

    /// Sorts ascending by `property`. Elements lacking it go last; ties keep
    /// their discovery order. Drains the upstream on first pull.
    pub fn sort(self, property: &str) -> Self {
        self.sorted(property, false)
    }

    /// Sorts descending by `property`, elements lacking it still last.
    pub fn sort_descending(self, property: &str) -> Self {
        self.sorted(property, true)
    }

    fn sorted(self, property: &str, descending: bool) -> Self {
        GeoPipeline::new(SortStage {
            upstream: Some(self.source),
            property: property.to_string(),
            descending,
            sorted: Vec::new().into_iter(),
        })
    }

    pub fn limit(self, n: usize) -> Self {
        GeoPipeline::new(self.source.take(n))
    }

    /// Drops the first `n` successful elements; errors are never skipped.
    pub fn skip(self, n: usize) -> Self {
        let mut remaining = n;
        GeoPipeline::new(self.source.filter(move |item| {
            if item.is_ok() && remaining > 0 {
                remaining -= 1;
                false
            } else {
                true
            }
        }))
    }

    /// Keeps elements for which `predicate` holds; errors pass through.
    pub fn filter<F>(self, predicate: F) -> Self
    where
        F: Fn(&GeoPipeFlow) -> bool + Send + 'static,
    {
        GeoPipeline::new(
            self.source
                .filter(move |item| item.as_ref().map_or(true, &predicate)),
        )
    }

    /// Attaches the value computed by `f` as property `name`.
    pub fn derive<F>(self, name: &str, f: F) -> Self
    where
        F: Fn(&GeoPipeFlow) -> GeoResult<Value> + Send + 'static,
    {
        let name = name.to_string();
        GeoPipeline::new(self.source.map(move |item| {
            let mut flow = item?;
            let value = f(&flow)?;
            flow.set_property(&name, value);
            Ok(flow)
        }))
    }

    /// Copies every record field into the derived properties, without
    /// overwriting properties that are already set.
    pub fn copy_record_properties(self) -> Self {
        GeoPipeline::new(self.source.map(|item| {
            item.map(|mut flow| {
                let fields: Vec<(String, Value)> = flow
                    .record
                    .fields()
                    .map(|(name, value)| (name.clone(), value.clone()))
                    .collect();
                for (name, value) in fields {
                    flow.properties.entry(name).or_insert(value);
                }
                flow
            })
        }))
    }

    /// Adds `minX`, `minY`, `maxX` and `maxY` of each geometry's envelope.
    pub fn with_envelope_properties(self) -> Self {
        GeoPipeline::new(self.source.map(|item| {
            item.map(|mut flow| {
                let envelope = flow.geometry.envelope();
                flow.set_property("minX", envelope.min_x);
                flow.set_property("minY", envelope.min_y);
                flow.set_property("maxX", envelope.max_x);
                flow.set_property("maxY", envelope.max_y);
                flow
            })
        }))
    }

    /// Collects every element, stopping at the first error.
    pub fn to_vec(self) -> GeoResult<Vec<GeoPipeFlow>> {
        self.source.collect()
    }

    /// Records of every element, stopping at the first error.
    pub fn to_records(self) -> GeoResult<Vec<Record>> {
        self.source.map(|item| item.map(GeoPipeFlow::into_record)).collect()
    }

    /// Number of elements, stopping at the first error.
    pub fn count_matches(self) -> GeoResult<usize> {
        let mut count = 0;
        for item in self.source {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// The first element, pulling nothing beyond it.
    pub fn first_match(mut self) -> GeoResult<Option<GeoPipeFlow>> {
        self.source.next().transpose()
    }
}

impl Iterator for GeoPipeline {
    type Item = GeoResult<GeoPipeFlow>;

    fn next(&mut self) -> Option<Self::Item> {
        self.source.next()
    }
}

struct SortStage {
    upstream: Option<FlowIter>,
    property: String,
    descending: bool,
    sorted: std::vec::IntoIter<GeoPipeFlow>,
}

impl SortStage {
    fn compare(&self, a: &GeoPipeFlow, b: &GeoPipeFlow) -> Ordering {
        let a = a.property(&self.property).filter(|v| !v.is_null());
        let b = b.property(&self.property).filter(|v| !v.is_null());
        match (a, b) {
            (Some(a), Some(b)) if self.descending => compare_values(b, a),
            (Some(a), Some(b)) => compare_values(a, b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

impl Iterator for SortStage {
    type Item = GeoResult<GeoPipeFlow>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(upstream) = self.upstream.take() {
            let mut flows = Vec::new();
            for item in upstream {
                match item {
                    Ok(flow) => flows.push(flow),
                    Err(e) => return Some(Err(e)),
                }
            }
            flows.sort_by(|a, b| self.compare(a, b));
            self.sorted = flows.into_iter();
        }
        self.sorted.next().map(Ok)
    }
}
