//! Coordinate reference system handling.
//!
//! Records always carry their corner coordinates as WGS84 longitude
//! and latitude, so uploads reproject the corners of every block from
//! the raster's CRS. The raster CRS is read from the dataset when it
//! carries an EPSG authority code, and must be supplied explicitly
//! otherwise.

use gdal::spatial_ref::{CoordTransform, SpatialRef};
use gdal::Dataset;
use gdal_sys::OSRAxisMappingStrategy;
use thiserror::Error;

use crate::Result;

/// EPSG code of the WGS84 geographic CRS.
pub const WGS84_EPSG: u32 = 4326;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CrsError {
    #[error("invalid CRS: {0:?} (expected an EPSG code like \"EPSG:4326\")")]
    Invalid(String),
    #[error("unable to determine the raster CRS; pass one explicitly")]
    Undetermined,
}

/// A coordinate reference system identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs(pub u32);

impl Crs {
    pub const WGS84: Crs = Crs(WGS84_EPSG);

    /// Parse a CRS from an `EPSG:<code>` string or a bare code.
    pub fn parse(s: &str) -> std::result::Result<Self, CrsError> {
        let code = match s.split_once(':') {
            Some((auth, code)) if auth.eq_ignore_ascii_case("epsg") => code,
            Some(_) => return Err(CrsError::Invalid(s.into())),
            None => s,
        };
        code.trim()
            .parse()
            .map(Crs)
            .map_err(|_| CrsError::Invalid(s.into()))
    }

    /// Check that the code resolves to a CRS known to GDAL.
    pub fn validate(self) -> std::result::Result<Self, CrsError> {
        SpatialRef::from_epsg(self.0)
            .map(|_| self)
            .map_err(|_| CrsError::Invalid(self.to_string()))
    }

    /// The GDAL spatial reference of this CRS, with axes mapped to
    /// traditional GIS order so coordinates are always `(lon, lat)`.
    pub fn spatial_ref(self) -> Result<SpatialRef> {
        let sref = SpatialRef::from_epsg(self.0)?;
        sref.set_axis_mapping_strategy(OSRAxisMappingStrategy::OAMS_TRADITIONAL_GIS_ORDER);
        Ok(sref)
    }

    /// The CRS of a raster dataset, if it carries an EPSG code.
    pub fn from_dataset(ds: &Dataset) -> std::result::Result<Self, CrsError> {
        if ds.projection().is_empty() {
            return Err(CrsError::Undetermined);
        }
        let sref = ds.spatial_ref().map_err(|_| CrsError::Undetermined)?;
        match (sref.auth_name(), sref.auth_code()) {
            (Ok(name), Ok(code)) if name == "EPSG" && code > 0 => Ok(Crs(code as u32)),
            _ => Err(CrsError::Undetermined),
        }
    }
}

impl std::str::FromStr for Crs {
    type Err = CrsError;
    fn from_str(s: &str) -> std::result::Result<Self, CrsError> {
        Crs::parse(s)
    }
}

impl std::fmt::Display for Crs {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

/// Construct a function reprojecting `(lon, lat)` style coordinates
/// from one CRS to another. Both ends use traditional GIS axis order,
/// so EPSG:4326 coordinates come out as `(lon, lat)` regardless of
/// the authority's axis definition.
pub fn corner_reprojector(from: Crs, to: Crs) -> Result<impl Fn(f64, f64) -> Result<(f64, f64)>> {
    use anyhow::Context;
    let from = from.spatial_ref()?;
    let to = to.spatial_ref()?;
    let transform =
        CoordTransform::new(&from, &to).with_context(|| "unable to build CRS transform")?;
    Ok(move |x, y| -> Result<(f64, f64)> {
        let mut x = [x];
        let mut y = [y];
        let mut z = [0.];
        transform.transform_coords(&mut x, &mut y, &mut z)?;
        Ok((x[0], y[0]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_forms() {
        assert_eq!(Crs::parse("EPSG:4326"), Ok(Crs::WGS84));
        assert_eq!(Crs::parse("epsg:3857"), Ok(Crs(3857)));
        assert_eq!(Crs::parse("32633"), Ok(Crs(32633)));
        assert!(Crs::parse("ESRI:102003").is_err());
        assert!(Crs::parse("not-a-crs").is_err());
        assert!(Crs::parse("EPSG:").is_err());
    }

    #[test]
    fn display() {
        assert_eq!(Crs(3857).to_string(), "EPSG:3857");
    }

    #[test]
    fn validate_known_and_unknown() {
        assert_eq!(Crs::WGS84.validate(), Ok(Crs::WGS84));
        assert_eq!(
            Crs(999999).validate(),
            Err(CrsError::Invalid("EPSG:999999".into()))
        );
    }

    #[test]
    fn reproject_web_mercator_origin() {
        let f = corner_reprojector(Crs(3857), Crs::WGS84).unwrap();
        let (lon, lat) = f(0., 0.).unwrap();
        assert!(lon.abs() < 1e-9);
        assert!(lat.abs() < 1e-9);
    }

    #[test]
    fn reproject_is_lon_lat_ordered() {
        // 10 degrees east on the equator in web mercator meters
        let f = corner_reprojector(Crs(3857), Crs::WGS84).unwrap();
        let (lon, lat) = f(1113194.9079327357, 0.).unwrap();
        assert!((lon - 10.).abs() < 1e-6);
        assert!(lat.abs() < 1e-6);
    }
}
