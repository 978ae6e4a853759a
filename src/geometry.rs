//! Pixel to world coordinate math.
//!
//! A GDAL geotransform maps fractional pixel coordinates `(col, row)`
//! to world coordinates `(x, y)`; for geographic rasters `x` is the
//! longitude and `y` the latitude. This module wraps the 6-element
//! geotransform in an affine matrix and provides helpers to locate
//! the corners of a window within a raster.

use nalgebra::{Matrix3, Point2};

/// Raster dimensions as `(width, height)`.
pub type RasterDims = (usize, usize);
/// Raster offsets as `(col, row)`.
pub type RasterOffset = (isize, isize);

/// Affine transform from pixel coordinates to world coordinates.
pub type PixelTransform = Matrix3<f64>;

/// Construct the pixel to world transform from a geotransform in
/// GDAL order: `[x0, px_width, row_rot, y0, col_rot, px_height]`.
pub fn transform_from_gdal(t: &[f64; 6]) -> PixelTransform {
    Matrix3::new(
        t[1], t[2], t[0], //
        t[4], t[5], t[3], //
        0., 0., 1.,
    )
}

/// Recover the geotransform in GDAL order from a pixel transform.
pub fn transform_to_gdal(t: &PixelTransform) -> [f64; 6] {
    [
        t[(0, 2)],
        t[(0, 0)],
        t[(0, 1)],
        t[(1, 2)],
        t[(1, 0)],
        t[(1, 1)],
    ]
}

/// Read the pixel transform of a raster dataset.
#[cfg(feature = "gdal")]
pub fn transform_from_dataset(ds: &gdal::Dataset) -> crate::Result<PixelTransform> {
    Ok(transform_from_gdal(&ds.geo_transform()?))
}

/// Apply the transform to fractional pixel coordinates, yielding
/// world `(x, y)`.
pub fn apply(t: &PixelTransform, col: f64, row: f64) -> (f64, f64) {
    let pt = t.transform_point(&Point2::new(col, row));
    (pt.x, pt.y)
}

/// World coordinates of the four corners of a pixel window.
///
/// Each corner is `(lon, lat)` - i.e. `(x, y)` in the world CRS. The
/// names follow the raster layout: NW is the minimum pixel offset,
/// SE the maximum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corners {
    pub nw: (f64, f64),
    pub ne: (f64, f64),
    pub se: (f64, f64),
    pub sw: (f64, f64),
}

impl Corners {
    /// Compute the corners of the window starting at pixel
    /// `(col_off, row_off)` with the given size.
    pub fn of_window(
        t: &PixelTransform,
        col_off: usize,
        row_off: usize,
        width: usize,
        height: usize,
    ) -> Self {
        let (left, top) = (col_off as f64, row_off as f64);
        let (right, bot) = (left + width as f64, top + height as f64);
        Corners {
            nw: apply(t, left, top),
            ne: apply(t, right, top),
            se: apply(t, right, bot),
            sw: apply(t, left, bot),
        }
    }

    /// The center of the window, as the mean of the corners.
    pub fn center(&self) -> (f64, f64) {
        (
            (self.nw.0 + self.ne.0 + self.se.0 + self.sw.0) / 4.,
            (self.nw.1 + self.ne.1 + self.se.1 + self.sw.1) / 4.,
        )
    }

    /// The extent of the corners along the x axis.
    pub fn x_span(&self) -> f64 {
        let xs = [self.nw.0, self.ne.0, self.se.0, self.sw.0];
        let min = xs.iter().cloned().fold(f64::INFINITY, f64::min);
        let max = xs.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        max - min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // North-up raster at (10, 20) with 0.5 degree pixels.
    const GT: [f64; 6] = [10., 0.5, 0., 20., 0., -0.5];

    #[test]
    fn apply_origin_and_pixel() {
        let t = transform_from_gdal(&GT);
        assert_eq!(apply(&t, 0., 0.), (10., 20.));
        assert_eq!(apply(&t, 2., 4.), (11., 18.));
    }

    #[test]
    fn gdal_round_trip() {
        let t = transform_from_gdal(&GT);
        assert_eq!(transform_to_gdal(&t), GT);
    }

    #[test]
    fn corners_are_lon_lat() {
        let t = transform_from_gdal(&GT);
        let c = Corners::of_window(&t, 0, 0, 4, 2);
        // x (longitude) grows to the right, y (latitude) shrinks down
        assert_eq!(c.nw, (10., 20.));
        assert_eq!(c.ne, (12., 20.));
        assert_eq!(c.se, (12., 19.));
        assert_eq!(c.sw, (10., 19.));
    }

    #[test]
    fn corners_of_offset_window() {
        let t = transform_from_gdal(&GT);
        let c = Corners::of_window(&t, 2, 2, 2, 2);
        assert_eq!(c.nw, (11., 19.));
        assert_eq!(c.se, (12., 18.));
        assert_eq!(c.center(), (11.5, 18.5));
        assert_eq!(c.x_span(), 1.);
    }

    #[test]
    fn rotated_transform() {
        // 90 degree rotation: pixel x axis points down in world y
        let t = transform_from_gdal(&[0., 0., 1., 0., 1., 0.]);
        assert_eq!(apply(&t, 3., 7.), (7., 3.));
    }
}
