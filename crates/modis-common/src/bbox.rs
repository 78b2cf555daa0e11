//! Geographic point and bounding box types.
//!
//! Coordinates are WGS84 degrees, longitude first wherever a pair is passed.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// A validated geographic coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Create a point, rejecting non-finite or out-of-range coordinates.
    pub fn new(latitude: f64, longitude: f64) -> PipelineResult<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(PipelineError::invalid_input(format!(
                "latitude {} outside [-90, 90]",
                latitude
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(PipelineError::invalid_input(format!(
                "longitude {} outside [-180, 180]",
                longitude
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// A geographic query region.
///
/// Invariant: `min_lon < max_lon` and `min_lat < max_lat`, enforced at
/// construction. Boxes crossing the antimeridian are not representable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> PipelineResult<Self> {
        // Validates ranges and finiteness of each corner
        GeoPoint::new(min_lat, min_lon)?;
        GeoPoint::new(max_lat, max_lon)?;

        if min_lon >= max_lon {
            return Err(PipelineError::invalid_input(format!(
                "min_lon ({}) must be less than max_lon ({})",
                min_lon, max_lon
            )));
        }
        if min_lat >= max_lat {
            return Err(PipelineError::invalid_input(format!(
                "min_lat ({}) must be less than max_lat ({})",
                min_lat, max_lat
            )));
        }

        Ok(Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        })
    }

    /// Parse "min_lon,min_lat,max_lon,max_lat".
    pub fn from_param(s: &str) -> PipelineResult<Self> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(PipelineError::invalid_input(format!(
                "Invalid bounding box '{}'. Expected 'min_lon,min_lat,max_lon,max_lat'",
                s
            )));
        }

        let mut values = [0.0f64; 4];
        for (slot, part) in values.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| {
                PipelineError::invalid_input(format!("Invalid number in bounding box: {}", part))
            })?;
        }

        Self::new(values[0], values[1], values[2], values[3])
    }

    /// Render in catalog query form: "min_lon,min_lat,max_lon,max_lat".
    pub fn to_param(&self) -> String {
        format!(
            "{},{},{},{}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }

    pub fn min_lon(&self) -> f64 {
        self.min_lon
    }

    pub fn min_lat(&self) -> f64 {
        self.min_lat
    }

    pub fn max_lon(&self) -> f64 {
        self.max_lon
    }

    pub fn max_lat(&self) -> f64 {
        self.max_lat
    }

    /// The four corners: SW, SE, NE, NW.
    pub fn corners(&self) -> [GeoPoint; 4] {
        [
            GeoPoint {
                latitude: self.min_lat,
                longitude: self.min_lon,
            },
            GeoPoint {
                latitude: self.min_lat,
                longitude: self.max_lon,
            },
            GeoPoint {
                latitude: self.max_lat,
                longitude: self.max_lon,
            },
            GeoPoint {
                latitude: self.max_lat,
                longitude: self.min_lon,
            },
        ]
    }

    /// Inclusive containment on both ends. NaN coordinates are never contained.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.min_lon && lon <= self.max_lon && lat >= self.min_lat && lat <= self.max_lat
    }
}

/// Deserialization goes through `new` so config files cannot bypass validation.
impl<'de> Deserialize<'de> for BoundingBox {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            min_lon: f64,
            min_lat: f64,
            max_lon: f64,
            max_lat: f64,
        }

        let raw = Raw::deserialize(deserializer)?;
        BoundingBox::new(raw.min_lon, raw.min_lat, raw.max_lon, raw.max_lat)
            .map_err(serde::de::Error::custom)
    }
}
