//! The raster to table upload pipeline.
//!
//! Walks the native block windows of one band, turns each block into
//! a record, reprojects the record corners to WGS84 when the raster
//! CRS differs, and streams the rows to a sink in batches.

use anyhow::Context;
use gdal::raster::GdalType;
use gdal::Dataset;
use ndarray::Array2;

use rasterbq::blocks::BlockGrid;
use rasterbq::crs::{corner_reprojector, Crs};
use rasterbq::geometry::{transform_from_dataset, PixelTransform};
use rasterbq::quadbin;
use rasterbq::reader::WindowReader;
use rasterbq::record::{BandRecord, Pixel, PixelType};
use rasterbq::Result;

use crate::bigquery::RecordSink;
use crate::Tracker;

pub struct UploadOptions {
    /// Band to upload.
    pub band: isize,
    /// Number of records per sink batch.
    pub chunk_size: usize,
    /// Override for the raster CRS.
    pub input_crs: Option<Crs>,
    /// Attach a quadbin cell to every record.
    pub quadbin: bool,
    /// Quadbin resolution; picked from the block extent when unset.
    pub quadbin_resolution: Option<u8>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        UploadOptions {
            band: 1,
            chunk_size: 1000,
            input_crs: None,
            quadbin: false,
            quadbin_resolution: None,
        }
    }
}

/// Resolve the CRS to record for the upload.
///
/// An explicit CRS wins over the raster's own, with a warning when
/// the two disagree. Fails when neither is available.
fn resolve_crs(ds: &Dataset, opts: &UploadOptions) -> Result<Crs> {
    let raster_crs = Crs::from_dataset(ds);
    let crs = match (opts.input_crs, raster_crs) {
        (Some(input), Ok(raster)) => {
            if input != raster {
                eprintln!(
                    "Warning: input CRS ({}) != raster CRS ({}); using input CRS",
                    input, raster
                );
            }
            input
        }
        (Some(input), Err(_)) => input,
        (None, Ok(raster)) => raster,
        (None, Err(e)) => return Err(e.into()),
    };
    Ok(crs.validate()?)
}

/// Upload one band of a raster dataset, returning the number of
/// records written.
pub async fn upload_raster<S: RecordSink>(
    ds: &Dataset,
    opts: &UploadOptions,
    sink: &mut S,
) -> Result<usize> {
    let crs = resolve_crs(ds, opts)?;
    let band = ds
        .rasterband(opts.band)
        .with_context(|| format!("unable to open rasterband {}", opts.band))?;
    let ty = PixelType::from_band_type(band.band_type())?;
    let grid = BlockGrid::for_band(ds, opts.band)?;
    let transform = transform_from_dataset(ds)?;

    let reproject = if crs != Crs::WGS84 {
        Some(corner_reprojector(crs, Crs::WGS84)?)
    } else {
        None
    };
    let reproject = reproject
        .as_ref()
        .map(|f| f as &dyn Fn(f64, f64) -> Result<(f64, f64)>);

    match ty {
        PixelType::UInt8 => run_blocks::<u8, S>(&band, &grid, &transform, crs, opts, reproject, sink).await,
        PixelType::UInt16 => run_blocks::<u16, S>(&band, &grid, &transform, crs, opts, reproject, sink).await,
        PixelType::Int16 => run_blocks::<i16, S>(&band, &grid, &transform, crs, opts, reproject, sink).await,
        PixelType::UInt32 => run_blocks::<u32, S>(&band, &grid, &transform, crs, opts, reproject, sink).await,
        PixelType::Int32 => run_blocks::<i32, S>(&band, &grid, &transform, crs, opts, reproject, sink).await,
        PixelType::Float32 => run_blocks::<f32, S>(&band, &grid, &transform, crs, opts, reproject, sink).await,
        PixelType::Float64 => run_blocks::<f64, S>(&band, &grid, &transform, crs, opts, reproject, sink).await,
    }
}

async fn run_blocks<T, S>(
    band: &gdal::raster::RasterBand<'_>,
    grid: &BlockGrid,
    transform: &PixelTransform,
    crs: Crs,
    opts: &UploadOptions,
    reproject: Option<&dyn Fn(f64, f64) -> Result<(f64, f64)>>,
    sink: &mut S,
) -> Result<usize>
where
    T: Pixel + GdalType + Default,
    S: RecordSink,
{
    let crs_name = crs.to_string();
    let chunk_size = opts.chunk_size.max(1);
    let tracker = Tracker::new("blocks", grid.len());

    let mut resolution = opts.quadbin_resolution;
    let mut batch = Vec::with_capacity(chunk_size);
    let mut total = 0;

    for window in grid.iter() {
        let data: Array2<T> = band.read_window(window)?;
        let mut rec = BandRecord::from_array(
            &data,
            transform,
            window.row_off,
            window.col_off,
            &crs_name,
            opts.band,
        );
        if let Some(f) = reproject {
            rec.reproject_corners(f)?;
        }
        if opts.quadbin {
            let res = match resolution {
                Some(res) => res,
                None => {
                    // pick the coarsest cell no wider than a block
                    let res = quadbin::resolution_for_lon_span(rec.corners.x_span());
                    resolution = Some(res);
                    res
                }
            };
            let (lon, lat) = rec.corners.center();
            rec.quadbin = Some(quadbin::point_to_cell(lon, lat, res)?.0);
        }
        batch.push(rec.to_row()?);

        if batch.len() >= chunk_size {
            sink.write_batch(&batch).await?;
            tracker.increment_by(batch.len());
            total += batch.len();
            batch.clear();
        }
    }
    if !batch.is_empty() {
        sink.write_batch(&batch).await?;
        tracker.increment_by(batch.len());
        total += batch.len();
    }
    Ok(total)
}
