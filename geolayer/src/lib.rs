//! # Geolayer - Geometry Layers with R-Tree Indexing
//!
//! Named collections ("layers") of geometries stored on records of a
//! transactional record store, each indexed by an R-Tree for bounding-box,
//! intersection and nearest-neighbour search.
//!
//! ## Features
//!
//! - **Pluggable Encoders**: point fields, WKT, WKB, flat properties or a linked record graph
//! - **R-Tree Index**: quadratic split, condensing removal and sort-tile-recursive bulk loading
//! - **Two-Phase Search**: envelope pruning followed by exact geometry confirmation
//! - **Lazy Pipelines**: sort, limit, skip and derived properties over search results
//! - **Snapshot Isolation**: readers never observe uncommitted or later writes
//! - **Persistent**: optional file-backed store with a validated header
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use geolayer::{Coordinate, Geometry, SpatialDatabase};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let db = SpatialDatabase::builder().open_or_create()?;
//! let roads = db.registry().create_wkt_layer("roads", "geometry", "wgs84")?;
//! roads.add_wkt("LINESTRING (4.89 52.37, 4.90 52.38)")?;
//!
//! let near = roads
//!     .within_distance(Coordinate::new(4.895, 52.375), 1.0)?
//!     .limit(10)
//!     .to_vec()?;
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod common;
pub mod config;
pub mod crs;
pub mod database;
pub mod encoder;
pub mod errors;
pub mod filter;
pub mod geometry;
pub mod index;
pub mod layer;
pub mod pipeline;
pub mod registry;
pub mod rtree;
pub mod store;

pub use bridge::{to_coordinate, to_geometry, CoordinateInput, TaggedGeometry};
pub use config::{GeoConfig, IndexConfig, StoreConfig};
pub use crs::{find_crs, hint_crs_name, select_crs, Crs, CARTESIAN, WGS84};
pub use database::{SpatialDatabase, SpatialDatabaseBuilder};
pub use encoder::{EncoderCatalog, GeometryEncoder};
pub use errors::{ErrorKind, GeoError, GeoResult};
pub use filter::{DistanceModel, SearchFilter};
pub use geometry::{Coordinate, Envelope, Geometry, GeometryKind, Polygon, Shape};
pub use index::{SearchHit, SearchResults, SpatialIndex};
pub use layer::Layer;
pub use pipeline::{GeoPipeFlow, GeoPipeline};
pub use registry::{layer_types, LayerRegistry, LayerType};
pub use rtree::{IntegrityReport, RTree, RTreeStats};
pub use store::{Record, RecordId, RecordStore, Snapshot, Transaction, Value};
