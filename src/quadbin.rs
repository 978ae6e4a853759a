//! Quadbin spatial index cells.
//!
//! A quadbin cell is a 64-bit identifier of a web mercator tile. The
//! layout packs the tile coordinates bit-interleaved below a small
//! header:
//!
//! ```text
//! bit 63      0
//! bit 62..60  header (0b100)
//! bit 59..57  mode (1 = quadbin)
//! bit 56..52  resolution (0..=26)
//! bit 51..0   interleaved x/y, footer of ones below the used bits
//! ```
//!
//! Cells sort hierarchically: the cell of a tile is a prefix of the
//! cells of its children, which makes the index usable for range
//! scans in a warehouse.

use thiserror::Error;

/// Largest supported resolution (tile zoom).
pub const MAX_RESOLUTION: u8 = 26;

const HEADER: u64 = 0x4000_0000_0000_0000;
const MODE: u64 = 1 << 59;
const FOOTER: u64 = 0xF_FFFF_FFFF_FFFF;

#[derive(Debug, Error, PartialEq)]
pub enum QuadbinError {
    #[error("quadbin resolution {0} out of range (max {MAX_RESOLUTION})")]
    Resolution(u8),
    #[error("latitude {0} out of range")]
    Latitude(f64),
}

/// A quadbin cell identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cell(pub u64);

impl Cell {
    /// The resolution encoded in the cell.
    pub fn resolution(self) -> u8 {
        ((self.0 >> 52) & 0x1F) as u8
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A web mercator tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

// Spread the low 32 bits of v to the even bits of a u64.
fn interleave(v: u64) -> u64 {
    let v = (v | (v << 16)) & 0x0000_FFFF_0000_FFFF;
    let v = (v | (v << 8)) & 0x00FF_00FF_00FF_00FF;
    let v = (v | (v << 4)) & 0x0F0F_0F0F_0F0F_0F0F;
    let v = (v | (v << 2)) & 0x3333_3333_3333_3333;
    (v | (v << 1)) & 0x5555_5555_5555_5555
}

// Inverse of `interleave`: collect the even bits of v.
fn deinterleave(v: u64) -> u64 {
    let v = v & 0x5555_5555_5555_5555;
    let v = (v | (v >> 1)) & 0x3333_3333_3333_3333;
    let v = (v | (v >> 2)) & 0x0F0F_0F0F_0F0F_0F0F;
    let v = (v | (v >> 4)) & 0x00FF_00FF_00FF_00FF;
    let v = (v | (v >> 8)) & 0x0000_FFFF_0000_FFFF;
    (v | (v >> 16)) & 0x0000_0000_FFFF_FFFF
}

/// Encode a tile as a quadbin cell.
pub fn tile_to_cell(tile: Tile) -> Result<Cell, QuadbinError> {
    let Tile { x, y, z } = tile;
    if z > MAX_RESOLUTION {
        return Err(QuadbinError::Resolution(z));
    }
    let x = (x as u64) << (32 - z);
    let y = (y as u64) << (32 - z);
    let interleaved = interleave(x) | (interleave(y) << 1);
    Ok(Cell(
        HEADER | MODE | ((z as u64) << 52) | (interleaved >> 12) | (FOOTER >> (z as u64 * 2)),
    ))
}

/// Decode the tile of a quadbin cell.
pub fn cell_to_tile(cell: Cell) -> Tile {
    let z = cell.resolution();
    if z == 0 {
        return Tile { x: 0, y: 0, z };
    }
    let q = (cell.0 & FOOTER) << 12;
    Tile {
        x: (deinterleave(q) >> (32 - z)) as u32,
        y: (deinterleave(q >> 1) >> (32 - z)) as u32,
        z,
    }
}

/// The web mercator tile containing a WGS84 point.
///
/// Longitudes wrap around the antimeridian; latitudes beyond the web
/// mercator limits clamp to the first and last tile rows.
pub fn point_to_tile(lon: f64, lat: f64, z: u8) -> Result<Tile, QuadbinError> {
    if z > MAX_RESOLUTION {
        return Err(QuadbinError::Resolution(z));
    }
    if !lat.is_finite() {
        return Err(QuadbinError::Latitude(lat));
    }
    let z2 = (1u64 << z) as f64;
    let sinlat = (lat * std::f64::consts::PI / 180.).sin();
    let mut x = z2 * (lon / 360. + 0.5);
    let y = z2 * (0.5 - 0.25 * ((1. + sinlat) / (1. - sinlat)).ln() / std::f64::consts::PI);

    x %= z2;
    if x < 0. {
        x += z2;
    }
    let max = (1u64 << z) - 1;
    Ok(Tile {
        x: (x.floor() as u64).min(max) as u32,
        y: (y.floor().max(0.) as u64).min(max) as u32,
        z,
    })
}

/// The quadbin cell containing a WGS84 point at the given resolution.
pub fn point_to_cell(lon: f64, lat: f64, resolution: u8) -> Result<Cell, QuadbinError> {
    tile_to_cell(point_to_tile(lon, lat, resolution)?)
}

/// The ancestor of a cell at a coarser resolution.
pub fn cell_to_parent(cell: Cell, parent_resolution: u8) -> Result<Cell, QuadbinError> {
    if parent_resolution > cell.resolution() {
        return Err(QuadbinError::Resolution(parent_resolution));
    }
    let z = parent_resolution as u64;
    Ok(Cell(
        (cell.0 & !(0x1F << 52)) | (z << 52) | (FOOTER >> (z * 2)),
    ))
}

/// The largest resolution whose tiles span at least `span_deg`
/// degrees of longitude. Used to pick a default indexing resolution
/// covering a whole raster block with one cell.
pub fn resolution_for_lon_span(span_deg: f64) -> u8 {
    if !(span_deg > 0.) {
        return MAX_RESOLUTION;
    }
    let mut z = 0u8;
    while z < MAX_RESOLUTION && 360. / (1u64 << (z + 1)) as f64 >= span_deg {
        z += 1;
    }
    z
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference values computed with the quadbin cell layout above;
    // (-3.7038, 40.4168, 10) matches QUADBIN_FROMLONGLAT in BigQuery.
    #[test]
    fn known_cells() {
        assert_eq!(
            tile_to_cell(Tile { x: 0, y: 0, z: 0 }).unwrap(),
            Cell(5192650370358181887)
        );
        assert_eq!(
            tile_to_cell(Tile { x: 9, y: 8, z: 4 }).unwrap(),
            Cell(5209574053332910079)
        );
        assert_eq!(
            tile_to_cell(Tile { x: 1, y: 2, z: 3 }).unwrap(),
            Cell(5202361257054699519)
        );
        assert_eq!(
            point_to_cell(-3.7038, 40.4168, 10).unwrap(),
            Cell(5234261499580514303)
        );
        assert_eq!(
            point_to_cell(0., 0., 26).unwrap(),
            Cell(5308618060762972160)
        );
        assert_eq!(
            point_to_cell(-45., 45., 5).unwrap(),
            Cell(5211627941053595647)
        );
    }

    #[test]
    fn tile_round_trip() {
        for z in 0..=MAX_RESOLUTION {
            let side = 1u32 << z;
            for &(x, y) in &[(0, 0), (side - 1, side - 1), (side / 2, side / 3)] {
                let tile = Tile { x, y, z };
                assert_eq!(cell_to_tile(tile_to_cell(tile).unwrap()), tile);
            }
        }
    }

    #[test]
    fn resolution_field() {
        let cell = tile_to_cell(Tile { x: 3, y: 1, z: 7 }).unwrap();
        assert_eq!(cell.resolution(), 7);
    }

    #[test]
    fn parent_contains_child() {
        let tile = Tile {
            x: 1205,
            y: 840,
            z: 12,
        };
        let cell = tile_to_cell(tile).unwrap();
        let parent = cell_to_parent(cell, 11).unwrap();
        assert_eq!(
            cell_to_tile(parent),
            Tile {
                x: 602,
                y: 420,
                z: 11
            }
        );
        // same resolution is a no-op
        assert_eq!(cell_to_parent(cell, 12).unwrap(), cell);
        assert!(cell_to_parent(cell, 13).is_err());
    }

    #[test]
    fn point_clamps_at_poles() {
        let north = point_to_tile(0., 89.99999, 8).unwrap();
        assert_eq!(north.y, 0);
        let south = point_to_tile(0., -89.99999, 8).unwrap();
        assert_eq!(south.y, 255);
    }

    #[test]
    fn lon_wraps() {
        let a = point_to_tile(185., 10., 4).unwrap();
        let b = point_to_tile(-175., 10., 4).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn resolution_out_of_range() {
        assert_eq!(
            point_to_cell(0., 0., 27),
            Err(QuadbinError::Resolution(27))
        );
    }

    #[test]
    fn resolution_for_spans() {
        // whole world needs z = 0
        assert_eq!(resolution_for_lon_span(360.), 0);
        // half the world fits a z = 1 tile
        assert_eq!(resolution_for_lon_span(180.), 1);
        assert_eq!(resolution_for_lon_span(0.01), 15);
        assert_eq!(resolution_for_lon_span(0.), MAX_RESOLUTION);
    }
}
