//! Per-block records for bulk loading.
//!
//! Each block of a raster band becomes one record: the world
//! coordinates of the four block corners, the block dimensions, a
//! JSON attribute blob describing the source raster, and the pixel
//! payload. Pixels are serialized little-endian regardless of host
//! order so consumers can decode the payload without a byte-order
//! probe, and the payload travels base64-encoded in row form.

use crate::geometry::{Corners, PixelTransform};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use ndarray::Array2;
use serde_derive::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("unknown pixel dtype: {0}")]
    UnknownDtype(String),
    #[error("pixel payload is {actual} bytes, expected {expected}")]
    PayloadLength { expected: usize, actual: usize },
    #[error("unsupported band data type: {0}")]
    UnsupportedBandType(String),
}

/// The pixel data types a record can carry, named after the numpy
/// dtypes the warehouse consumers expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelType {
    UInt8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl PixelType {
    /// The dtype name used in field names and attribute blobs.
    pub fn dtype_name(self) -> &'static str {
        match self {
            PixelType::UInt8 => "uint8",
            PixelType::UInt16 => "uint16",
            PixelType::Int16 => "int16",
            PixelType::UInt32 => "uint32",
            PixelType::Int32 => "int32",
            PixelType::Float32 => "float32",
            PixelType::Float64 => "float64",
        }
    }

    /// Parse a dtype name as produced by [`dtype_name`](Self::dtype_name).
    pub fn parse(name: &str) -> Result<Self, RecordError> {
        Ok(match name {
            "uint8" => PixelType::UInt8,
            "uint16" => PixelType::UInt16,
            "int16" => PixelType::Int16,
            "uint32" => PixelType::UInt32,
            "int32" => PixelType::Int32,
            "float32" => PixelType::Float32,
            "float64" => PixelType::Float64,
            other => return Err(RecordError::UnknownDtype(other.into())),
        })
    }

    /// Size of one pixel in bytes.
    pub fn size_bytes(self) -> usize {
        match self {
            PixelType::UInt8 => 1,
            PixelType::UInt16 | PixelType::Int16 => 2,
            PixelType::UInt32 | PixelType::Int32 | PixelType::Float32 => 4,
            PixelType::Float64 => 8,
        }
    }

    /// The pixel type of a GDAL band data type, if supported.
    #[cfg(feature = "gdal")]
    pub fn from_band_type(ty: gdal::raster::GdalDataType) -> Result<Self, RecordError> {
        use gdal::raster::GdalDataType::*;
        Ok(match ty {
            UInt8 => PixelType::UInt8,
            UInt16 => PixelType::UInt16,
            Int16 => PixelType::Int16,
            UInt32 => PixelType::UInt32,
            Int32 => PixelType::Int32,
            Float32 => PixelType::Float32,
            Float64 => PixelType::Float64,
            other => return Err(RecordError::UnsupportedBandType(format!("{:?}", other))),
        })
    }
}

impl std::fmt::Display for PixelType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.dtype_name())
    }
}

/// A pixel value that can be serialized into a record payload.
pub trait Pixel: Copy {
    const TYPE: PixelType;
    fn write_le(self, out: &mut Vec<u8>);
    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_pixel {
    ($ty:ty, $variant:ident) => {
        impl Pixel for $ty {
            const TYPE: PixelType = PixelType::$variant;
            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

impl_pixel!(u8, UInt8);
impl_pixel!(u16, UInt16);
impl_pixel!(i16, Int16);
impl_pixel!(u32, UInt32);
impl_pixel!(i32, Int32);
impl_pixel!(f32, Float32);
impl_pixel!(f64, Float64);

/// Decoded pixel payload of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum BandValues {
    UInt8(Array2<u8>),
    UInt16(Array2<u16>),
    Int16(Array2<i16>),
    UInt32(Array2<u32>),
    Int32(Array2<i32>),
    Float32(Array2<f32>),
    Float64(Array2<f64>),
}

/// Attributes describing the source of a record, carried as a JSON
/// string in the `attrs` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordAttrs {
    pub band: isize,
    pub value_field: String,
    pub dtype: String,
    pub crs: String,
    pub gdal_transform: [f64; 6],
    pub row_off: usize,
    pub col_off: usize,
}

/// One block of one band, ready to serialize as a table row.
#[derive(Debug, Clone, PartialEq)]
pub struct BandRecord {
    pub corners: Corners,
    pub block_width: usize,
    pub block_height: usize,
    pub attrs: RecordAttrs,
    /// Pixel payload, row-major, little-endian.
    pub values: Vec<u8>,
    /// Optional quadbin cell covering the block.
    pub quadbin: Option<u64>,
}

/// The name of the value column for a band of the given pixel type.
pub fn value_field(band: isize, ty: PixelType) -> String {
    format!("band_{}_{}", band, ty.dtype_name())
}

impl BandRecord {
    /// Build the record of one block window.
    ///
    /// The array is the window's pixels in `(row, col)` layout;
    /// `transform` is the pixel to world transform of the whole
    /// raster and `crs` the identifier of its coordinate system.
    pub fn from_array<T: Pixel>(
        values: &Array2<T>,
        transform: &PixelTransform,
        row_off: usize,
        col_off: usize,
        crs: &str,
        band: isize,
    ) -> Self {
        let (height, width) = values.dim();
        let mut payload = Vec::with_capacity(values.len() * T::TYPE.size_bytes());
        for &v in values.iter() {
            v.write_le(&mut payload);
        }
        BandRecord {
            corners: Corners::of_window(transform, col_off, row_off, width, height),
            block_width: width,
            block_height: height,
            attrs: RecordAttrs {
                band,
                value_field: value_field(band, T::TYPE),
                dtype: T::TYPE.dtype_name().into(),
                crs: crs.into(),
                gdal_transform: crate::geometry::transform_to_gdal(transform),
                row_off,
                col_off,
            },
            values: payload,
            quadbin: None,
        }
    }

    /// Map the four corners through a coordinate transformation,
    /// typically a reprojection to WGS84. The attribute blob keeps
    /// recording the source CRS.
    pub fn reproject_corners(
        &mut self,
        f: impl Fn(f64, f64) -> crate::Result<(f64, f64)>,
    ) -> crate::Result<()> {
        self.corners = Corners {
            nw: f(self.corners.nw.0, self.corners.nw.1)?,
            ne: f(self.corners.ne.0, self.corners.ne.1)?,
            se: f(self.corners.se.0, self.corners.se.1)?,
            sw: f(self.corners.sw.0, self.corners.sw.1)?,
        };
        Ok(())
    }

    /// The pixel type of the payload, parsed from the value field
    /// name.
    pub fn pixel_type(&self) -> Result<PixelType, RecordError> {
        let suffix = self
            .attrs
            .value_field
            .rsplit('_')
            .next()
            .unwrap_or_default();
        PixelType::parse(suffix)
    }

    /// Decode the payload into a typed array.
    pub fn decode_values(&self) -> Result<BandValues, RecordError> {
        let ty = self.pixel_type()?;
        let expected = self.block_width * self.block_height * ty.size_bytes();
        if self.values.len() != expected {
            return Err(RecordError::PayloadLength {
                expected,
                actual: self.values.len(),
            });
        }
        fn decode<T: Pixel>(rec: &BandRecord) -> Array2<T> {
            let size = T::TYPE.size_bytes();
            let values = rec.values.chunks_exact(size).map(T::read_le).collect();
            Array2::from_shape_vec((rec.block_height, rec.block_width), values)
                .expect("shape checked against payload length")
        }
        Ok(match ty {
            PixelType::UInt8 => BandValues::UInt8(decode(self)),
            PixelType::UInt16 => BandValues::UInt16(decode(self)),
            PixelType::Int16 => BandValues::Int16(decode(self)),
            PixelType::UInt32 => BandValues::UInt32(decode(self)),
            PixelType::Int32 => BandValues::Int32(decode(self)),
            PixelType::Float32 => BandValues::Float32(decode(self)),
            PixelType::Float64 => BandValues::Float64(decode(self)),
        })
    }

    /// Serialize the record as a table row.
    ///
    /// Corner coordinates become `lat_NW`/`lon_NW` pairs, the
    /// attribute blob a JSON string, and the payload a base64 string
    /// under the record's value field name. Quadbin cells are sent as
    /// decimal strings since their values exceed the integer range of
    /// an f64.
    pub fn to_row(&self) -> crate::Result<serde_json::Value> {
        let mut row = serde_json::Map::new();
        let mut corner = |name: &str, (lon, lat): (f64, f64)| {
            row.insert(format!("lat_{}", name), lat.into());
            row.insert(format!("lon_{}", name), lon.into());
        };
        corner("NW", self.corners.nw);
        corner("NE", self.corners.ne);
        corner("SE", self.corners.se);
        corner("SW", self.corners.sw);
        row.insert("block_height".into(), self.block_height.into());
        row.insert("block_width".into(), self.block_width.into());
        row.insert("attrs".into(), serde_json::to_string(&self.attrs)?.into());
        if let Some(cell) = self.quadbin {
            row.insert("quadbin".into(), cell.to_string().into());
        }
        row.insert(
            self.attrs.value_field.clone(),
            BASE64.encode(&self.values).into(),
        );
        Ok(serde_json::Value::Object(row))
    }

    /// Parse a record back out of a table row, the inverse of
    /// [`to_row`](Self::to_row).
    pub fn from_row(row: &serde_json::Value) -> crate::Result<Self> {
        use anyhow::{anyhow, Context};

        let get = |key: &str| {
            row.get(key)
                .ok_or_else(|| anyhow!("row is missing field {:?}", key))
        };
        let num = |key: &str| -> crate::Result<f64> {
            get(key)?
                .as_f64()
                .ok_or_else(|| anyhow!("field {:?} is not a number", key))
        };

        let attrs: RecordAttrs = serde_json::from_str(
            get("attrs")?
                .as_str()
                .ok_or_else(|| anyhow!("attrs is not a string"))?,
        )
        .context("unable to parse record attrs")?;

        let payload = BASE64
            .decode(
                get(&attrs.value_field)?
                    .as_str()
                    .ok_or_else(|| anyhow!("value field is not a string"))?,
            )
            .context("unable to decode pixel payload")?;

        let quadbin = match row.get("quadbin") {
            None | Some(serde_json::Value::Null) => None,
            Some(v) => Some(match v {
                serde_json::Value::String(s) => s.parse::<u64>()?,
                v => v
                    .as_u64()
                    .ok_or_else(|| anyhow!("quadbin is not an integer"))?,
            }),
        };

        Ok(BandRecord {
            corners: Corners {
                nw: (num("lon_NW")?, num("lat_NW")?),
                ne: (num("lon_NE")?, num("lat_NE")?),
                se: (num("lon_SE")?, num("lat_SE")?),
                sw: (num("lon_SW")?, num("lat_SW")?),
            },
            block_width: num("block_width")? as usize,
            block_height: num("block_height")? as usize,
            attrs,
            values: payload,
            quadbin,
        })
    }
}
