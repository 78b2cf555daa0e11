//! HDF5 / NetCDF-4 granules read with the native netcdf library.
//!
//! Every two-dimensional variable in the root group or a first-level group
//! is a subdataset, named by its path (`Grid/NDVI`) and described by its
//! `long_name` attribute. No georeferencing is recovered; callers locate
//! pixels from the tile identity.

use std::path::Path;
use std::sync::Once;

use tracing::debug;

use crate::band::{BandAttributes, GranuleContainer, GranuleReader, RawBand, SubdatasetInfo};
use crate::error::{ParseError, ParseResult};

/// Silence HDF5's automatic error printing to stderr.
///
/// The HDF5 C library prints diagnostics even for errors the caller handles,
/// such as probing for an optional attribute. Safe to call repeatedly.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe and null handlers are a
        // documented way to disable error output.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(hdf5_metno_sys::h5e::H5E_DEFAULT, None, std::ptr::null_mut());
        }
    });
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NetCdfReader;

impl NetCdfReader {
    pub fn new() -> Self {
        Self
    }
}

impl GranuleReader for NetCdfReader {
    fn open(&self, path: &Path) -> ParseResult<Box<dyn GranuleContainer>> {
        silence_hdf5_errors();

        if !path.exists() {
            return Err(ParseError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )));
        }

        let file = netcdf::open(path).map_err(|e| ParseError::OpenFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Box::new(NetCdfGranule { file }))
    }

    fn name(&self) -> &'static str {
        "netcdf"
    }
}

struct NetCdfGranule {
    file: netcdf::File,
}

impl GranuleContainer for NetCdfGranule {
    fn subdatasets(&self) -> ParseResult<Vec<SubdatasetInfo>> {
        let mut found: Vec<SubdatasetInfo> = self
            .file
            .variables()
            .filter(|v| v.dimensions().len() == 2)
            .map(|v| describe(&v, v.name()))
            .collect();

        let groups = self.file.groups().map_err(|e| ParseError::OpenFailed {
            path: "groups".to_string(),
            reason: e.to_string(),
        })?;
        for group in groups {
            let group_name = group.name();
            found.extend(
                group
                    .variables()
                    .filter(|v| v.dimensions().len() == 2)
                    .map(|v| describe(&v, format!("{}/{}", group_name, v.name()))),
            );
        }

        Ok(found)
    }

    fn read_band(&self, subdataset: &SubdatasetInfo) -> ParseResult<RawBand> {
        let not_found = || ParseError::ReadFailed {
            name: subdataset.name.clone(),
            reason: "variable not found".to_string(),
        };

        match subdataset.name.split_once('/') {
            Some((group_name, var_name)) => {
                let group = self.file.group(group_name).ok().flatten().ok_or_else(not_found)?;
                let var = group.variable(var_name).ok_or_else(not_found)?;
                read_variable(&var, &subdataset.name)
            }
            None => {
                let var = self.file.variable(&subdataset.name).ok_or_else(not_found)?;
                read_variable(&var, &subdataset.name)
            }
        }
    }
}

fn read_variable(var: &netcdf::Variable, name: &str) -> ParseResult<RawBand> {
    let read_failed = |reason: String| ParseError::ReadFailed {
        name: name.to_string(),
        reason,
    };

    let dims = var.dimensions();
    if dims.len() != 2 {
        return Err(read_failed(format!("expected 2 dimensions, found {}", dims.len())));
    }
    let (height, width) = (dims[0].len(), dims[1].len());

    debug!(variable = %name, width, height, "Reading variable");

    let values: Vec<i32> = var.get_values(..).map_err(|e| read_failed(e.to_string()))?;

    Ok(RawBand {
        width,
        height,
        values,
        attributes: BandAttributes {
            fill_value: get_f64_attr(var, "_FillValue")?,
            scale_factor: get_f64_attr(var, "scale_factor")?,
            add_offset: get_f64_attr(var, "add_offset")?,
        },
        georef: None,
    })
}

fn describe(var: &netcdf::Variable, name: String) -> SubdatasetInfo {
    let long_name = get_string_attr(var, "long_name").unwrap_or_default();
    SubdatasetInfo::new(name, long_name)
}

/// Check for an attribute by name first; probing directly makes HDF5 noisy.
fn has_attr(var: &netcdf::Variable, name: &str) -> bool {
    var.attributes().any(|attr| attr.name() == name)
}

/// A numeric attribute; present but non-numeric is an error.
fn get_f64_attr(var: &netcdf::Variable, name: &str) -> ParseResult<Option<f64>> {
    if !has_attr(var, name) {
        return Ok(None);
    }
    let invalid = |reason: String| ParseError::InvalidAttribute {
        name: name.to_string(),
        reason,
    };
    let value = match var.attribute_value(name) {
        Some(Ok(value)) => value,
        Some(Err(e)) => return Err(invalid(e.to_string())),
        None => return Ok(None),
    };
    f64::try_from(value).map(Some).map_err(|e| invalid(e.to_string()))
}

fn get_string_attr(var: &netcdf::Variable, name: &str) -> Option<String> {
    if !has_attr(var, name) {
        return None;
    }
    match var.attribute_value(name)?.ok()? {
        netcdf::AttributeValue::Str(s) => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_is_idempotent() {
        silence_hdf5_errors();
        silence_hdf5_errors();
    }

    #[test]
    fn test_open_missing_file() {
        let result = NetCdfReader::new().open(Path::new("/nonexistent/granule.h5"));
        assert!(matches!(result, Err(ParseError::IoError(_))));
    }
}
