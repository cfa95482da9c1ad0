//! The two recognized coordinate reference systems and name resolution.

use crate::errors::{ErrorKind, GeoError, GeoResult};
use std::fmt::{Display, Formatter};

/// Name that leaves a layer's CRS unset.
pub const UNSET_CRS_NAME: &str = "";
/// Layer-creation name of the geographic CRS.
pub const WGS84_CRS_NAME: &str = "wgs84";

/// A coordinate reference system: code, short name and authority URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs {
    code: u32,
    name: &'static str,
    href: &'static str,
}

/// Geographic longitude/latitude on the WGS-84 ellipsoid.
pub const WGS84: Crs = Crs {
    code: 4326,
    name: "WGS-84",
    href: "http://spatialreference.org/ref/epsg/4326/",
};

/// Planar X/Y coordinates.
pub const CARTESIAN: Crs = Crs {
    code: 7203,
    name: "cartesian",
    href: "http://spatialreference.org/ref/sr-org/7203/",
};

impl Crs {
    pub fn code(&self) -> u32 {
        self.code
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn href(&self) -> &'static str {
        self.href
    }

    pub fn is_geographic(&self) -> bool {
        self.code == WGS84.code
    }

    /// Resolves a spatial reference identifier to one of the recognized systems.
    pub fn from_srid(srid: u32) -> GeoResult<Crs> {
        match srid {
            4326 => Ok(WGS84),
            7203 => Ok(CARTESIAN),
            other => Err(GeoError::new(
                &format!("Unsupported CRS code: {}", other),
                ErrorKind::UnsupportedCrs,
            )),
        }
    }
}

impl Display for Crs {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Resolves a CRS by its display name (`WGS-84` or `Cartesian`).
pub fn find_crs(name: &str) -> GeoResult<Crs> {
    match name {
        "WGS-84" => Ok(WGS84),
        "Cartesian" => Ok(CARTESIAN),
        other => Err(GeoError::new(
            &format!("Unsupported CRS: {}", other),
            ErrorKind::UnsupportedCrs,
        )),
    }
}

/// Selects the CRS for a new layer, case-insensitively.
///
/// The empty name leaves the CRS unset, `wgs84` selects [`WGS84`]; any
/// other name fails with `UnsupportedCrs`.
pub fn select_crs(name: &str) -> GeoResult<Option<Crs>> {
    let lower = name.to_lowercase();
    if lower == UNSET_CRS_NAME {
        Ok(None)
    } else if lower == WGS84_CRS_NAME {
        Ok(Some(WGS84))
    } else {
        Err(GeoError::new(
            &format!("Unsupported CRS name: {}", name),
            ErrorKind::UnsupportedCrs,
        ))
    }
}

/// Best-effort CRS default: an unset name becomes `wgs84` when the hint
/// text (typically a field name) mentions "lat". This is a guess from
/// naming, not a guarantee about the data.
pub fn hint_crs_name(name: &str, hint: &str) -> String {
    if name == UNSET_CRS_NAME && hint.to_lowercase().contains("lat") {
        WGS84_CRS_NAME.to_string()
    } else {
        name.to_string()
    }
}
