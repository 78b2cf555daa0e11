//! NDVI band extraction.
//!
//! # Scaling
//!
//! Raw integers equal to the fill value become NaN before any arithmetic, so
//! a valid zero is never confused with missing data. Remaining values are
//! converted with the band's scale and offset:
//!
//! - scale attribute > 1: HDF4-EOS convention, `raw / scale + offset`
//! - scale attribute <= 1: `raw * scale + offset`
//! - no scale attribute: the product's nominal scale, multiplicative
//!
//! Values outside [-1, 1] are passed through.
//!
//! # Coordinates
//!
//! An embedded geotransform and CRS are used when the container has them;
//! otherwise the transform is rebuilt from the tile id and the fixed grid
//! constants. Either way every pixel gets WGS84 coordinates at its center.
//!
//! [`NdviExtractor::reduce`] masks and accumulates without building the
//! value and coordinate grids, which for a 4800 x 4800 granule would take
//! over 500 MB.

use std::sync::Arc;

use hdf_parser::{BandAttributes, GranuleReader, RawBand};
use modis_common::{BoundingBox, ExtractError, LocalGranuleFile, Product, TileId};
use projection::{tile_geotransform, AffineTransform, CrsTransformer};
use tracing::{debug, info, warn};

use crate::aggregate::MeanAccumulator;
use crate::raster::NdviRaster;

/// Fill, scale and offset resolved for one band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaling {
    pub fill: Option<f64>,
    pub factor: ScaleFactor,
    pub offset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScaleFactor {
    Multiply(f64),
    Divide(f64),
}

impl Scaling {
    /// Resolve from band attributes, falling back to the product's nominal
    /// values.
    pub fn resolve(attributes: &BandAttributes, product: &Product) -> Result<Self, ExtractError> {
        let factor = match (attributes.scale_factor, product.nominal_scale) {
            (Some(scale), _) => {
                if !scale.is_finite() || scale == 0.0 {
                    return Err(ExtractError::MalformedAttributes(format!(
                        "unusable scale_factor {}",
                        scale
                    )));
                }
                if scale.abs() > 1.0 {
                    ScaleFactor::Divide(scale)
                } else {
                    ScaleFactor::Multiply(scale)
                }
            }
            (None, Some(nominal)) if nominal.is_finite() && nominal != 0.0 => ScaleFactor::Multiply(nominal),
            _ => {
                return Err(ExtractError::MalformedAttributes(
                    "no scale_factor attribute and no nominal scale".to_string(),
                ))
            }
        };

        let offset = attributes.add_offset.or(product.nominal_offset).unwrap_or(0.0);
        if !offset.is_finite() {
            return Err(ExtractError::MalformedAttributes(format!("unusable add_offset {}", offset)));
        }

        let fill = attributes.fill_value.or(product.nominal_fill.map(f64::from));

        Ok(Self { fill, factor, offset })
    }

    /// Decode raw integers to physical values, NaN for fill.
    pub fn decode(&self, raw: &[i32]) -> Vec<f64> {
        raw.iter().map(|&v| self.decode_one(v)).collect()
    }

    #[inline]
    fn decode_one(&self, raw: i32) -> f64 {
        let raw = raw as f64;
        if self.fill == Some(raw) {
            return f64::NAN;
        }
        match self.factor {
            ScaleFactor::Multiply(s) => raw * s + self.offset,
            ScaleFactor::Divide(s) => raw / s + self.offset,
        }
    }
}

/// Where pixel coordinates came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GeorefSource {
    Embedded,
    TileGrid,
}

impl GeorefSource {
    fn as_str(&self) -> &'static str {
        match self {
            GeorefSource::Embedded => "embedded",
            GeorefSource::TileGrid => "tile_grid",
        }
    }
}

/// Pixel-center coordinates computed on demand.
struct PixelGeolocation {
    transform: AffineTransform,
    crs: CrsTransformer,
    source: GeorefSource,
}

impl PixelGeolocation {
    /// (lon, lat) of a pixel center, NaN when it has no geographic position.
    fn lon_lat(&self, col: usize, row: usize) -> (f64, f64) {
        let (x, y) = self.transform.pixel_center(col, row);
        self.crs.to_lon_lat(x, y).unwrap_or((f64::NAN, f64::NAN))
    }
}

/// The NDVI band of one granule with everything needed to interpret it.
struct OpenedBand {
    band: RawBand,
    scaling: Scaling,
    geolocation: PixelGeolocation,
}

/// Opens granules and extracts the product's NDVI band.
#[derive(Clone)]
pub struct NdviExtractor {
    reader: Arc<dyn GranuleReader>,
    product: Product,
}

impl NdviExtractor {
    pub fn new(reader: Arc<dyn GranuleReader>, product: Product) -> Self {
        Self { reader, product }
    }

    pub fn product(&self) -> &Product {
        &self.product
    }

    /// Extract the NDVI raster of a downloaded granule.
    pub fn extract(&self, granule: &LocalGranuleFile) -> Result<NdviRaster, ExtractError> {
        let OpenedBand {
            band,
            scaling,
            geolocation,
        } = self.open_band(granule)?;

        let values = scaling.decode(&band.values);
        let (longitudes, latitudes) = geolocation
            .crs
            .grid_lon_lat(&geolocation.transform, band.width, band.height);

        let raster = NdviRaster::new(band.width, band.height, values, latitudes, longitudes)?;

        info!(
            path = %granule.path().display(),
            tile = %granule.tile,
            width = raster.width(),
            height = raster.height(),
            valid_pixels = raster.valid_count(),
            fill = ?scaling.fill,
            scale = ?scaling.factor,
            offset = scaling.offset,
            georef = geolocation.source.as_str(),
            "Extracted NDVI raster"
        );

        Ok(raster)
    }

    /// Mask a granule against `bbox` and reduce it to an accumulator.
    ///
    /// Counts exactly what [`NdviExtractor::extract`] followed by
    /// [`MeanAccumulator::add_raster`] would, but decodes and georeferences
    /// one pixel at a time, so only the raw samples are held in memory.
    pub fn reduce(&self, granule: &LocalGranuleFile, bbox: &BoundingBox) -> Result<MeanAccumulator, ExtractError> {
        let OpenedBand {
            band,
            scaling,
            geolocation,
        } = self.open_band(granule)?;

        let mut acc = MeanAccumulator::new();
        for (index, &raw) in band.values.iter().enumerate() {
            let (lon, lat) = geolocation.lon_lat(index % band.width, index / band.width);
            acc.add_pixel(bbox, lon, lat, scaling.decode_one(raw));
        }

        info!(
            path = %granule.path().display(),
            tile = %granule.tile,
            width = band.width,
            height = band.height,
            valid_pixels = acc.valid_pixels(),
            in_box_pixels = acc.in_box_pixels(),
            fill = ?scaling.fill,
            scale = ?scaling.factor,
            offset = scaling.offset,
            georef = geolocation.source.as_str(),
            "Reduced NDVI granule"
        );

        Ok(acc)
    }

    fn open_band(&self, granule: &LocalGranuleFile) -> Result<OpenedBand, ExtractError> {
        let path = granule.path();
        let container = self.reader.open(path)?;

        let subdatasets = container.subdatasets()?;
        let subdataset = subdatasets
            .iter()
            .find(|s| s.matches(&self.product.band_pattern))
            .ok_or_else(|| ExtractError::SubdatasetNotFound {
                pattern: self.product.band_pattern.clone(),
                path: path.display().to_string(),
            })?;

        debug!(
            path = %path.display(),
            subdataset = %subdataset.name,
            reader = self.reader.name(),
            "Matched NDVI subdataset"
        );

        let band = container.read_band(subdataset)?;
        check_dimensions(&band)?;

        let scaling = Scaling::resolve(&band.attributes, &self.product)?;
        if scaling.fill.is_none() {
            warn!(path = %path.display(), "No fill value available; no pixel is masked as fill");
        }

        let geolocation = pixel_geolocation(&band, granule.tile)?;

        Ok(OpenedBand {
            band,
            scaling,
            geolocation,
        })
    }
}

fn check_dimensions(band: &RawBand) -> Result<(), ExtractError> {
    if band.width == 0 || band.height == 0 || band.values.len() != band.width * band.height {
        return Err(ExtractError::Unreadable(format!(
            "band {}x{} holds {} samples",
            band.width,
            band.height,
            band.values.len()
        )));
    }
    Ok(())
}

/// Embedded georeference when present, otherwise the tile's grid position.
fn pixel_geolocation(band: &RawBand, tile: TileId) -> Result<PixelGeolocation, ExtractError> {
    match &band.georef {
        Some(georef) => {
            let transform = AffineTransform::new(georef.geotransform);
            if !transform.is_valid() {
                return Err(ExtractError::MalformedAttributes(format!(
                    "degenerate geotransform {:?}",
                    georef.geotransform
                )));
            }
            let crs = CrsTransformer::from_definition(georef.crs.as_str())
                .map_err(|e| ExtractError::MalformedAttributes(e.to_string()))?;
            Ok(PixelGeolocation {
                transform,
                crs,
                source: GeorefSource::Embedded,
            })
        }
        None => Ok(PixelGeolocation {
            transform: tile_geotransform(tile, band.width, band.height),
            crs: CrsTransformer::modis_sinusoidal(),
            source: GeorefSource::TileGrid,
        }),
    }
}
