//! In-memory granule reader.
//!
//! Granules are registered by file name; opening any path whose file name
//! is registered yields the stored subdatasets. Used for tests and for
//! pipelines that synthesize granules.

use std::collections::HashMap;
use std::path::Path;
use std::sync::RwLock;

use crate::band::{GranuleContainer, GranuleReader, RawBand, SubdatasetInfo};
use crate::error::{ParseError, ParseResult};

/// Subdatasets of one synthetic granule.
#[derive(Debug, Clone, Default)]
pub struct MemoryGranule {
    bands: Vec<(SubdatasetInfo, RawBand)>,
}

impl MemoryGranule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_band(mut self, name: &str, description: &str, band: RawBand) -> Self {
        self.bands.push((SubdatasetInfo::new(name, description), band));
        self
    }
}

impl GranuleContainer for MemoryGranule {
    fn subdatasets(&self) -> ParseResult<Vec<SubdatasetInfo>> {
        Ok(self.bands.iter().map(|(info, _)| info.clone()).collect())
    }

    fn read_band(&self, subdataset: &SubdatasetInfo) -> ParseResult<RawBand> {
        self.bands
            .iter()
            .find(|(info, _)| info.name == subdataset.name)
            .map(|(_, band)| band.clone())
            .ok_or_else(|| ParseError::ReadFailed {
                name: subdataset.name.clone(),
                reason: "no such subdataset".to_string(),
            })
    }
}

/// Reader backed by a map of file name to granule.
#[derive(Debug, Default)]
pub struct MemoryReader {
    granules: RwLock<HashMap<String, MemoryGranule>>,
}

impl MemoryReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the granule returned for `file_name`.
    pub fn insert(&self, file_name: impl Into<String>, granule: MemoryGranule) {
        if let Ok(mut granules) = self.granules.write() {
            granules.insert(file_name.into(), granule);
        }
    }

    pub fn len(&self) -> usize {
        self.granules.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GranuleReader for MemoryReader {
    fn open(&self, path: &Path) -> ParseResult<Box<dyn GranuleContainer>> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();

        let granules = self.granules.read().map_err(|_| ParseError::OpenFailed {
            path: path.display().to_string(),
            reason: "reader lock poisoned".to_string(),
        })?;

        granules
            .get(file_name)
            .cloned()
            .map(|g| Box::new(g) as Box<dyn GranuleContainer>)
            .ok_or_else(|| ParseError::OpenFailed {
                path: path.display().to_string(),
                reason: "not a recognised granule".to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
