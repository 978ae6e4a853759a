//! Iterate the native block windows of a raster band.
//!
//! Raster formats store bands in rectangular blocks, and reading
//! along block boundaries avoids decompressing the same block twice.
//! [`BlockGrid`] enumerates the block windows of a band row-major,
//! clipping the windows on the right and bottom edges to the raster
//! bounds. Loading one window per record keeps the memory footprint
//! of an upload bounded by a single block.

/// A window aligned to the block layout of a band.
///
/// Offsets are in pixels from the raster origin; `width` and
/// `height` are the clipped dimensions, so edge windows may be
/// smaller than the block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    pub row_off: usize,
    pub col_off: usize,
    pub width: usize,
    pub height: usize,
}

/// The block layout of a raster band.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockGrid {
    width: usize,
    height: usize,
    block_width: usize,
    block_height: usize,
}

impl BlockGrid {
    /// Construct a grid from raster and block dimensions.
    ///
    /// # Panics
    ///
    /// Panics if any dimension is zero.
    pub fn new(width: usize, height: usize, block_width: usize, block_height: usize) -> Self {
        if width < 1 || height < 1 {
            panic!("raster dimensions must both be at least 1");
        }
        if block_width < 1 || block_height < 1 {
            panic!("block dimensions must both be at least 1");
        }
        BlockGrid {
            width,
            height,
            block_width,
            block_height,
        }
    }

    /// Construct the grid for a band of a dataset, reading the
    /// raster size and the band's native block size.
    #[cfg(feature = "gdal")]
    pub fn for_band(ds: &gdal::Dataset, band: isize) -> crate::Result<Self> {
        use anyhow::Context;
        let (width, height) = ds.raster_size();
        let band = ds
            .rasterband(band)
            .with_context(|| format!("unable to open rasterband {}", band))?;
        let (bw, bh) = band.block_size();
        Ok(BlockGrid::new(width, height, bw, bh))
    }

    pub fn width(&self) -> usize {
        self.width
    }
    pub fn height(&self) -> usize {
        self.height
    }
    pub fn block_width(&self) -> usize {
        self.block_width
    }
    pub fn block_height(&self) -> usize {
        self.block_height
    }

    /// Number of block columns.
    pub fn blocks_x(&self) -> usize {
        (self.width + self.block_width - 1) / self.block_width
    }

    /// Number of block rows.
    pub fn blocks_y(&self) -> usize {
        (self.height + self.block_height - 1) / self.block_height
    }

    /// Total number of windows in the grid.
    pub fn len(&self) -> usize {
        self.blocks_x() * self.blocks_y()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The clipped window of the block at grid position `(bx, by)`.
    pub fn window(&self, bx: usize, by: usize) -> BlockWindow {
        debug_assert!(bx < self.blocks_x() && by < self.blocks_y());
        let col_off = bx * self.block_width;
        let row_off = by * self.block_height;
        BlockWindow {
            row_off,
            col_off,
            width: self.block_width.min(self.width - col_off),
            height: self.block_height.min(self.height - row_off),
        }
    }

    /// Iterate the windows row-major.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = BlockWindow> + '_ {
        let bx = self.blocks_x();
        (0..self.len()).map(move |i| self.window(i % bx, i / bx))
    }
}
