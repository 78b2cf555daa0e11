//! Decoded NDVI rasters.

use modis_common::ExtractError;

/// Physical NDVI values and pixel-center coordinates, row-major.
///
/// NaN in `values` is no-data. NaN coordinates mark pixels that have no
/// geographic location (off the projected globe).
#[derive(Debug, Clone, PartialEq)]
pub struct NdviRaster {
    width: usize,
    height: usize,
    values: Vec<f64>,
    latitudes: Vec<f64>,
    longitudes: Vec<f64>,
}

impl NdviRaster {
    pub fn new(
        width: usize,
        height: usize,
        values: Vec<f64>,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
    ) -> Result<Self, ExtractError> {
        let expected = width * height;
        if values.len() != expected || latitudes.len() != expected || longitudes.len() != expected {
            return Err(ExtractError::Unreadable(format!(
                "raster {}x{} expects {} samples, got values={} latitudes={} longitudes={}",
                width,
                height,
                expected,
                values.len(),
                latitudes.len(),
                longitudes.len()
            )));
        }

        Ok(Self {
            width,
            height,
            values,
            latitudes,
            longitudes,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn latitudes(&self) -> &[f64] {
        &self.latitudes
    }

    pub fn longitudes(&self) -> &[f64] {
        &self.longitudes
    }

    /// Value at (row, col); `None` for no-data or out of range.
    pub fn value(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let v = self.values[row * self.width + col];
        (!v.is_nan()).then_some(v)
    }

    /// (lon, lat) of a pixel center.
    pub fn location(&self, row: usize, col: usize) -> Option<(f64, f64)> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let i = row * self.width + col;
        Some((self.longitudes[i], self.latitudes[i]))
    }

    /// Number of pixels that are not no-data.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| !v.is_nan()).count()
    }

    /// (lon, lat, value) for every pixel.
    pub fn pixels(&self) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
        self.longitudes
            .iter()
            .zip(&self.latitudes)
            .zip(&self.values)
            .map(|((lon, lat), v)| (*lon, *lat, *v))
    }
}
