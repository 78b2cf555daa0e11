//! HDF4-EOS granules read through GDAL.
//!
//! GDAL exposes each HDF-EOS grid field as a subdataset listed in the
//! `SUBDATASETS` metadata domain:
//!
//! ```text
//! SUBDATASET_1_NAME=HDF4_EOS:EOS_GRID:"MOD13Q1...hdf":MODIS_Grid_16DAY_250m_500m_VI:250m 16 days NDVI
//! SUBDATASET_1_DESC=[4800x4800] 250m 16 days NDVI MODIS_Grid_16DAY_250m_500m_VI (16-bit integer)
//! ```
//!
//! Opening a subdataset yields a single-band raster with the grid's
//! geotransform and sinusoidal spatial reference.

use std::collections::BTreeMap;
use std::path::Path;

use gdal::raster::RasterBand;
use gdal::{Dataset, Metadata};
use tracing::debug;

use crate::band::{
    BandAttributes, CrsDefinition, Georeference, GranuleContainer, GranuleReader, RawBand, SubdatasetInfo,
};
use crate::error::{ParseError, ParseResult};

/// Reader for any container GDAL can open; built for HDF4-EOS.
#[derive(Debug, Default, Clone, Copy)]
pub struct GdalReader;

impl GdalReader {
    pub fn new() -> Self {
        Self
    }
}

impl GranuleReader for GdalReader {
    fn open(&self, path: &Path) -> ParseResult<Box<dyn GranuleContainer>> {
        if !path.exists() {
            return Err(ParseError::IoError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{} does not exist", path.display()),
            )));
        }

        let dataset = Dataset::open(path).map_err(|e| ParseError::OpenFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Box::new(GdalGranule { dataset }))
    }

    fn name(&self) -> &'static str {
        "gdal"
    }
}

struct GdalGranule {
    dataset: Dataset,
}

impl GranuleContainer for GdalGranule {
    fn subdatasets(&self) -> ParseResult<Vec<SubdatasetInfo>> {
        let entries = self.dataset.metadata_domain("SUBDATASETS").unwrap_or_default();
        Ok(parse_subdataset_metadata(&entries))
    }

    fn read_band(&self, subdataset: &SubdatasetInfo) -> ParseResult<RawBand> {
        let read_failed = |reason: String| ParseError::ReadFailed {
            name: subdataset.name.clone(),
            reason,
        };

        let dataset = Dataset::open(Path::new(&subdataset.name)).map_err(|e| read_failed(e.to_string()))?;
        let band = dataset.rasterband(1).map_err(|e| read_failed(e.to_string()))?;
        let (width, height) = band.size();

        debug!(subdataset = %subdataset.name, width, height, "Reading subdataset");

        let buffer = band
            .read_as::<i32>((0, 0), (width, height), (width, height), None)
            .map_err(|e| read_failed(e.to_string()))?;
        let (_, values) = buffer.into_shape_and_vec();

        Ok(RawBand {
            width,
            height,
            values,
            attributes: band_attributes(&band)?,
            georef: georeference(&dataset),
        })
    }
}

/// Pair up `SUBDATASET_n_NAME` / `SUBDATASET_n_DESC` entries, ordered by n.
fn parse_subdataset_metadata(entries: &[String]) -> Vec<SubdatasetInfo> {
    let mut by_index: BTreeMap<u32, (Option<String>, Option<String>)> = BTreeMap::new();

    for entry in entries {
        let Some((key, value)) = entry.split_once('=') else {
            continue;
        };
        let Some(rest) = key.strip_prefix("SUBDATASET_") else {
            continue;
        };
        let Some((index, field)) = rest.split_once('_') else {
            continue;
        };
        let Ok(index) = index.parse::<u32>() else {
            continue;
        };

        let slot = by_index.entry(index).or_default();
        match field {
            "NAME" => slot.0 = Some(value.to_string()),
            "DESC" => slot.1 = Some(value.to_string()),
            _ => {}
        }
    }

    by_index
        .into_values()
        .filter_map(|(name, desc)| Some(SubdatasetInfo::new(name?, desc.unwrap_or_default())))
        .collect()
}

/// Fill, scale and offset from the band, falling back to raw HDF attributes.
fn band_attributes(band: &RasterBand) -> ParseResult<BandAttributes> {
    Ok(BandAttributes {
        fill_value: match band.no_data_value() {
            Some(v) => Some(v),
            None => metadata_number(band, "_FillValue")?,
        },
        scale_factor: match band.scale() {
            Some(v) => Some(v),
            None => metadata_number(band, "scale_factor")?,
        },
        add_offset: match band.offset() {
            Some(v) => Some(v),
            None => metadata_number(band, "add_offset")?,
        },
    })
}

fn metadata_number(band: &RasterBand, name: &str) -> ParseResult<Option<f64>> {
    match band.metadata_item(name, "") {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ParseError::InvalidAttribute {
                name: name.to_string(),
                reason: format!("not numeric: {:?}", raw),
            }),
    }
}

fn georeference(dataset: &Dataset) -> Option<Georeference> {
    let geotransform = dataset.geo_transform().ok()?;
    let spatial_ref = dataset.spatial_ref().ok()?;

    let crs = match spatial_ref.to_proj4() {
        Ok(proj4) if !proj4.trim().is_empty() => CrsDefinition::Proj4(proj4),
        _ => CrsDefinition::Wkt(spatial_ref.to_wkt().ok()?),
    };

    Some(Georeference { geotransform, crs })
}
