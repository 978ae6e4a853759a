pub use crate::{Error, Result};

pub use crate::blocks::*;
pub use crate::geometry::*;
pub use crate::record::*;

#[cfg(feature = "gdal")]
pub use crate::crs::*;
#[cfg(feature = "gdal")]
pub use crate::inspect::*;
#[cfg(feature = "gdal")]
pub use crate::reader::*;
