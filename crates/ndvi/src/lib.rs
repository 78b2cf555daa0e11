//! NDVI extraction and spatial averaging.
//!
//! [`NdviExtractor`] turns a downloaded granule into an [`NdviRaster`]:
//! physical NDVI values with NaN marking no-data, plus per-pixel WGS84
//! coordinates at pixel centers. [`aggregate`] masks rasters against a
//! bounding box and pools every valid in-box pixel into one mean.

pub mod aggregate;
pub mod extract;
pub mod raster;

pub use aggregate::{aggregate, AggregateResult, MeanAccumulator};
pub use extract::{NdviExtractor, ScaleFactor, Scaling};
pub use raster::NdviRaster;
