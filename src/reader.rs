//! Abstractions to read block windows from GDAL datasets.

use crate::blocks::BlockWindow;
use crate::geometry::{RasterDims, RasterOffset};
use crate::Result;
use anyhow::{format_err, Context};
use gdal::{
    raster::{GdalType, RasterBand},
    Dataset,
};
use ndarray::Array2;

/// Abstracts reading rectangular windows from a raster band.
pub trait WindowReader {
    /// Emulate [`RasterBand::read_into_slice`].
    fn read_into_slice<T>(&self, out: &mut [T], off: RasterOffset, size: RasterDims) -> Result<()>
    where
        T: GdalType + Copy + Default;

    /// Helper to read into an ndarray.
    fn read_as_array<T>(&self, off: RasterOffset, size: RasterDims) -> Result<Array2<T>>
    where
        T: GdalType + Copy + Default,
    {
        let mut buf = vec![T::default(); size.0 * size.1];
        self.read_into_slice(&mut buf[..], off, size)?;
        Ok(Array2::from_shape_vec((size.1, size.0), buf)?)
    }

    /// Helper to read the pixels of a block window.
    fn read_window<T>(&self, window: BlockWindow) -> Result<Array2<T>>
    where
        T: GdalType + Copy + Default,
    {
        self.read_as_array(
            (window.col_off as isize, window.row_off as isize),
            (window.width, window.height),
        )
    }
}

impl<'a> WindowReader for RasterBand<'a> {
    fn read_into_slice<T>(&self, out: &mut [T], off: RasterOffset, size: RasterDims) -> Result<()>
    where
        T: GdalType + Copy + Default,
    {
        Ok(self
            .read_into_slice(off, size, size, out, None)
            .with_context(|| {
                format_err!(
                    "reading window @ ({},{}) of dimension ({}x{})",
                    off.0,
                    off.1,
                    size.0,
                    size.1
                )
            })?)
    }
}

/// A `WindowReader` that is `Send`, but not `Sync`. Obtains a
/// `RasterBand` handle for each read.
pub struct DatasetReader(pub Dataset, pub isize);

impl WindowReader for DatasetReader {
    fn read_into_slice<T>(&self, out: &mut [T], off: RasterOffset, size: RasterDims) -> Result<()>
    where
        T: GdalType + Copy + Default,
    {
        let band = self.0.rasterband(self.1)?;
        WindowReader::read_into_slice(&band, out, off, size)
    }
}

/// A `WindowReader` that is both `Send` and `Sync`. Opens the
/// dataset for each read. `P` may be set to [ `Path` ] or a
/// `PathBuf` for a `Send + Sync` reader.
pub struct RasterPathReader<'a, P: ?Sized>(pub &'a P, pub isize);

use std::path::Path;
impl<'a, P> WindowReader for RasterPathReader<'a, P>
where
    P: AsRef<Path> + ?Sized,
{
    fn read_into_slice<T>(&self, out: &mut [T], off: RasterOffset, size: RasterDims) -> Result<()>
    where
        T: GdalType + Copy + Default,
    {
        DatasetReader(Dataset::open(self.0.as_ref())?, self.1).read_into_slice(out, off, size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockWindow;
    use gdal::raster::Buffer;
    use gdal::DriverManager;
    use tempdir::TempDir;

    const WIDTH: usize = 8;
    const HEIGHT: usize = 4;

    fn write_gradient(path: &std::path::Path) -> crate::Result<()> {
        let driver = DriverManager::get_driver_by_name("GTiff")?;
        let ds = driver.create_with_band_type::<u16, _>(
            path,
            WIDTH as isize,
            HEIGHT as isize,
            1,
        )?;
        let data: Vec<u16> = (0..WIDTH * HEIGHT).map(|i| i as u16).collect();
        let mut band = ds.rasterband(1)?;
        band.write((0, 0), (WIDTH, HEIGHT), &Buffer::new((WIDTH, HEIGHT), data))?;
        Ok(())
    }

    #[test]
    fn window_reads_match_layout() -> crate::Result<()> {
        let tmp = TempDir::new("rasterbq_reader").unwrap();
        let path = tmp.path().join("gradient.tif");
        write_gradient(&path)?;

        let reader = DatasetReader(Dataset::open(&path)?, 1);
        let full = reader.read_as_array::<u16>((0, 0), (WIDTH, HEIGHT))?;
        assert_eq!(full.dim(), (HEIGHT, WIDTH));
        assert_eq!(full[(0, 0)], 0);
        assert_eq!(full[(2, 3)], (2 * WIDTH + 3) as u16);

        let window = BlockWindow {
            row_off: 1,
            col_off: 2,
            width: 3,
            height: 2,
        };
        let sub = reader.read_window::<u16>(window)?;
        assert_eq!(sub.dim(), (2, 3));
        assert_eq!(sub[(0, 0)], (WIDTH + 2) as u16);
        assert_eq!(sub[(1, 2)], (2 * WIDTH + 4) as u16);

        // path-based reader sees the same pixels
        let by_path = RasterPathReader(&path, 1).read_window::<u16>(window)?;
        assert_eq!(by_path, sub);
        Ok(())
    }
}
