//! Read raster files as records suitable for bulk loading into
//! BigQuery.
//!
//! The core of the crate is a pipeline from the blocks of a raster
//! band to self-describing records: each record carries the world
//! coordinates of the block corners, the block dimensions, a JSON
//! attribute blob, and the pixel payload encoded little-endian. The
//! supporting modules provide the pieces of that pipeline:
//!
//! - [`geometry`] - pixel to world coordinate math from GDAL
//!   geotransforms.
//! - [`blocks`] - iteration over the native block windows of a band.
//! - [`record`] - encoding and decoding of the per-block records.
//! - [`quadbin`] - 64-bit spatial index cells over web mercator tiles.
//! - [`crs`] - EPSG code handling and corner reprojection (requires
//!   the `gdal` feature).
//! - [`reader`] - window readers over GDAL datasets (requires the
//!   `gdal` feature).
//! - [`inspect`] - summaries of raster files for display (requires
//!   the `gdal` feature).

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

pub mod blocks;
pub mod geometry;
pub mod quadbin;
pub mod record;

#[cfg(feature = "gdal")]
pub mod crs;
#[cfg(feature = "gdal")]
pub mod inspect;
#[cfg(feature = "gdal")]
pub mod reader;

pub mod prelude;
