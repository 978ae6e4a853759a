//! Summaries of raster files for display.

use anyhow::Context;
use gdal::Dataset;
use serde_derive::Serialize;

use crate::crs::Crs;
use crate::record::PixelType;
use crate::Result;

/// Summary of one band of a raster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandInfo {
    pub band: isize,
    pub dtype: String,
    /// Uncompressed size of the band in megabytes.
    pub size_mb: f64,
    pub block_width: usize,
    pub block_height: usize,
    pub no_data_value: Option<f64>,
}

/// Summary of a raster file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RasterInfo {
    pub width: usize,
    pub height: usize,
    pub num_bands: isize,
    pub crs: Option<String>,
    pub gdal_transform: [f64; 6],
    pub bands: Vec<BandInfo>,
}

impl RasterInfo {
    /// Gather the summary of an open dataset.
    pub fn from_dataset(ds: &Dataset) -> Result<Self> {
        let (width, height) = ds.raster_size();
        let num_bands = ds.raster_count();
        let mut bands = Vec::with_capacity(num_bands as usize);
        for idx in 1..=num_bands {
            let band = ds
                .rasterband(idx)
                .with_context(|| format!("unable to open rasterband {}", idx))?;
            let ty = PixelType::from_band_type(band.band_type())?;
            let (bw, bh) = band.block_size();
            bands.push(BandInfo {
                band: idx,
                dtype: ty.dtype_name().into(),
                size_mb: (width * height * ty.size_bytes()) as f64 / 1024. / 1024.,
                block_width: bw,
                block_height: bh,
                no_data_value: band.no_data_value(),
            });
        }
        Ok(RasterInfo {
            width,
            height,
            num_bands,
            crs: Crs::from_dataset(ds).ok().map(|c| c.to_string()),
            gdal_transform: ds.geo_transform()?,
            bands,
        })
    }
}
