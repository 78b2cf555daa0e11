//! Bounding-box masking and pooled mean.

use modis_common::{BoundingBox, PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};

use crate::raster::NdviRaster;

/// Mean NDVI over a query box.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregateResult {
    /// `None` when no valid pixel fell inside the box. Never zero by default.
    pub mean_ndvi: Option<f64>,
    pub valid_pixels: usize,
    /// Set when at least one tile of the query failed.
    pub partial_coverage: bool,
}

impl AggregateResult {
    /// The mean, or `NoCoverage` for callers that need a number.
    pub fn require_value(&self) -> PipelineResult<f64> {
        self.mean_ndvi.ok_or(PipelineError::NoCoverage)
    }

    pub fn with_partial_coverage(mut self, partial: bool) -> Self {
        self.partial_coverage = partial;
        self
    }
}

/// Running sum and count of valid in-box pixels.
///
/// Accumulating rasters one at a time and merging accumulators gives the
/// same pooled mean as reducing all pixels together, without holding every
/// raster in memory.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeanAccumulator {
    sum: f64,
    count: usize,
    in_box: usize,
}

impl MeanAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every valid pixel whose center lies inside `bbox` (inclusive).
    pub fn add_raster(&mut self, raster: &NdviRaster, bbox: &BoundingBox) {
        for (lon, lat, value) in raster.pixels() {
            self.add_pixel(bbox, lon, lat, value);
        }
    }

    /// Add one pixel center and its value; NaN values count as in-box no-data.
    #[inline]
    pub fn add_pixel(&mut self, bbox: &BoundingBox, lon: f64, lat: f64, value: f64) {
        // NaN coordinates fail the containment test
        if !bbox.contains(lon, lat) {
            return;
        }
        self.in_box += 1;
        if value.is_nan() {
            return;
        }
        self.sum += value;
        self.count += 1;
    }

    pub fn merge(&mut self, other: &MeanAccumulator) {
        self.sum += other.sum;
        self.count += other.count;
        self.in_box += other.in_box;
    }

    /// Valid pixels accumulated so far.
    pub fn valid_pixels(&self) -> usize {
        self.count
    }

    /// Pixels inside the box, including no-data.
    pub fn in_box_pixels(&self) -> usize {
        self.in_box
    }

    pub fn finish(&self) -> AggregateResult {
        AggregateResult {
            mean_ndvi: (self.count > 0).then(|| self.sum / self.count as f64),
            valid_pixels: self.count,
            partial_coverage: false,
        }
    }
}

/// Pool the valid in-box pixels of all rasters into one mean.
pub fn aggregate(rasters: &[NdviRaster], bbox: &BoundingBox) -> AggregateResult {
    let mut acc = MeanAccumulator::new();
    for raster in rasters {
        acc.add_raster(raster, bbox);
    }
    acc.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(points: &[(f64, f64, f64)]) -> NdviRaster {
        NdviRaster::new(
            points.len(),
            1,
            points.iter().map(|p| p.2).collect(),
            points.iter().map(|p| p.1).collect(),
            points.iter().map(|p| p.0).collect(),
        )
        .unwrap()
    }

    fn bbox() -> BoundingBox {
        BoundingBox::new(77.0, 28.0, 78.0, 29.0).unwrap()
    }

    #[test]
    fn test_no_rasters() {
        let result = aggregate(&[], &bbox());
        assert_eq!(result.mean_ndvi, None);
        assert!(matches!(result.require_value(), Err(PipelineError::NoCoverage)));
    }

    #[test]
    fn test_off_globe_pixels_ignored() {
        let r = raster(&[(f64::NAN, f64::NAN, 0.9), (77.5, 28.5, 0.1)]);
        assert_eq!(aggregate(&[r], &bbox()).mean_ndvi, Some(0.1));
    }

    #[test]
    fn test_accumulator_merge_matches_pooled() {
        let a = raster(&[(77.1, 28.1, 0.2), (77.2, 28.2, 0.4)]);
        let b = raster(&[(77.3, 28.3, 0.6)]);

        let mut left = MeanAccumulator::new();
        left.add_raster(&a, &bbox());
        let mut right = MeanAccumulator::new();
        right.add_raster(&b, &bbox());
        left.merge(&right);

        assert_eq!(left.finish(), aggregate(&[a, b], &bbox()));
        assert_eq!(left.in_box_pixels(), 3);
    }

    #[test]
    fn test_serializes_missing_mean_as_null() {
        let json = serde_json::to_value(AggregateResult::default()).unwrap();
        assert!(json["mean_ndvi"].is_null());
    }
}
