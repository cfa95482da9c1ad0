//! Configuration for index trees, the record store and the database as a whole.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::{ErrorKind, GeoError, GeoResult};

/// Default maximum number of entries per tree node.
pub const DEFAULT_MAX_ENTRIES: usize = 64;
/// Default minimum fill of a non-root tree node.
pub const DEFAULT_MIN_ENTRIES: usize = 25;
/// Default number of geometries committed per bulk-load batch.
pub const DEFAULT_BULK_BATCH_SIZE: usize = 1000;

/// Node capacity and bulk-load chunking for spatial index trees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    pub max_entries: usize,
    pub min_entries: usize,
    pub bulk_batch_size: usize,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            max_entries: DEFAULT_MAX_ENTRIES,
            min_entries: DEFAULT_MIN_ENTRIES,
            bulk_batch_size: DEFAULT_BULK_BATCH_SIZE,
        }
    }
}

impl IndexConfig {
    /// Checks the node capacity constraints.
    ///
    /// `min_entries` may not exceed half of `max_entries`, otherwise a split
    /// could not produce two valid halves.
    pub fn validate(&self) -> GeoResult<()> {
        if self.max_entries < 4 {
            return Err(GeoError::new(
                &format!("max_entries must be at least 4, got {}", self.max_entries),
                ErrorKind::ConfigurationError,
            ));
        }
        if self.min_entries < 1 || self.min_entries > self.max_entries / 2 {
            return Err(GeoError::new(
                &format!(
                    "min_entries must be between 1 and {}, got {}",
                    self.max_entries / 2,
                    self.min_entries
                ),
                ErrorKind::ConfigurationError,
            ));
        }
        if self.bulk_batch_size < 1 {
            return Err(GeoError::new(
                "bulk_batch_size must be at least 1",
                ErrorKind::ConfigurationError,
            ));
        }
        Ok(())
    }
}

/// Where the record store keeps its data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    /// Backing file; `None` keeps everything in memory.
    pub file_path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        StoreConfig { file_path: None }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        StoreConfig {
            file_path: Some(path.into()),
        }
    }
}

/// Complete database configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoConfig {
    pub store: StoreConfig,
    pub index: IndexConfig,
}

impl GeoConfig {
    pub fn validate(&self) -> GeoResult<()> {
        self.index.validate()
    }
}
