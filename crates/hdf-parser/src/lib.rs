//! Readers for satellite granule containers.
//!
//! A granule is a container of named subdatasets (bands). Readers list the
//! subdatasets and read one as raw stored integers together with its fill,
//! scale and offset attributes and, when the container carries it, an
//! affine geotransform with a CRS definition. Interpreting the values is left
//! to the caller.
//!
//! # Backends
//!
//! - `gdal` feature: [`GdalReader`], HDF4-EOS (and anything else GDAL opens)
//! - `netcdf` feature: [`NetCdfReader`], HDF5 / NetCDF-4
//! - always: [`MemoryReader`], synthetic granules keyed by file name

pub mod band;
pub mod error;
#[cfg(feature = "gdal")]
pub mod hdf4;
pub mod memory;
#[cfg(feature = "netcdf")]
pub mod native;

use std::sync::Arc;

pub use band::{
    BandAttributes, CrsDefinition, Georeference, GranuleContainer, GranuleReader, RawBand, SubdatasetInfo,
};
pub use error::{ParseError, ParseResult};
#[cfg(feature = "gdal")]
pub use hdf4::GdalReader;
pub use memory::{MemoryGranule, MemoryReader};
#[cfg(feature = "netcdf")]
pub use native::{silence_hdf5_errors, NetCdfReader};

/// The best file-backed reader compiled into this build.
///
/// GDAL is preferred since it reads HDF4-EOS, the format MODIS granules are
/// distributed in.
pub fn default_reader() -> ParseResult<Arc<dyn GranuleReader>> {
    #[cfg(feature = "gdal")]
    let reader: Option<Arc<dyn GranuleReader>> = Some(Arc::new(GdalReader::new()));

    #[cfg(all(feature = "netcdf", not(feature = "gdal")))]
    let reader: Option<Arc<dyn GranuleReader>> = Some(Arc::new(NetCdfReader::new()));

    #[cfg(not(any(feature = "gdal", feature = "netcdf")))]
    let reader: Option<Arc<dyn GranuleReader>> = None;

    reader.ok_or_else(|| ParseError::Unsupported("built without the `gdal` or `netcdf` feature".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(any(feature = "gdal", feature = "netcdf")))]
    fn test_default_reader_without_backends() {
        assert!(matches!(default_reader(), Err(ParseError::Unsupported(_))));
    }

    #[test]
    #[cfg(feature = "gdal")]
    fn test_default_reader_prefers_gdal() {
        assert_eq!(default_reader().unwrap().name(), "gdal");
    }
}
