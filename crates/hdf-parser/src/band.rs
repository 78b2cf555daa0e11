//! Container-agnostic view of a granule's subdatasets.

use std::path::Path;

use crate::error::ParseResult;

/// A named subdataset inside a granule container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdatasetInfo {
    /// Backend-specific identifier used to open the subdataset
    pub name: String,
    /// Human-readable description, e.g. "[4800x4800] 250m 16 days NDVI ..."
    pub description: String,
}

impl SubdatasetInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Case-insensitive substring match against the description, then the name.
    pub fn matches(&self, pattern: &str) -> bool {
        let pattern = pattern.to_lowercase();
        self.description.to_lowercase().contains(&pattern) || self.name.to_lowercase().contains(&pattern)
    }
}

/// Scaling and fill metadata attached to a band, exactly as stored.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BandAttributes {
    pub fill_value: Option<f64>,
    pub scale_factor: Option<f64>,
    pub add_offset: Option<f64>,
}

/// CRS of a band's geotransform.
#[derive(Debug, Clone, PartialEq)]
pub enum CrsDefinition {
    Proj4(String),
    Wkt(String),
}

impl CrsDefinition {
    pub fn as_str(&self) -> &str {
        match self {
            CrsDefinition::Proj4(s) | CrsDefinition::Wkt(s) => s,
        }
    }
}

/// Embedded georeferencing: a GDAL-order affine transform plus its CRS.
#[derive(Debug, Clone, PartialEq)]
pub struct Georeference {
    pub geotransform: [f64; 6],
    pub crs: CrsDefinition,
}

/// Raw stored integers of one band, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBand {
    pub width: usize,
    pub height: usize,
    pub values: Vec<i32>,
    pub attributes: BandAttributes,
    pub georef: Option<Georeference>,
}

impl RawBand {
    pub fn new(width: usize, height: usize, values: Vec<i32>) -> Self {
        Self {
            width,
            height,
            values,
            attributes: BandAttributes::default(),
            georef: None,
        }
    }

    pub fn with_attributes(mut self, attributes: BandAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    pub fn with_georef(mut self, georef: Georeference) -> Self {
        self.georef = Some(georef);
        self
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Opens granule files.
pub trait GranuleReader: Send + Sync {
    /// Open a granule container at `path`.
    fn open(&self, path: &Path) -> ParseResult<Box<dyn GranuleContainer>>;

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

/// An opened granule.
pub trait GranuleContainer {
    /// All subdatasets, in container order.
    fn subdatasets(&self) -> ParseResult<Vec<SubdatasetInfo>>;

    /// Read one subdataset as raw integers.
    fn read_band(&self, subdataset: &SubdatasetInfo) -> ParseResult<RawBand>;
}
