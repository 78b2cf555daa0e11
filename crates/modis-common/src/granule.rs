//! Located and downloaded granules.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::tile::TileId;

/// A remote granule resolved for one tile and one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GranuleReference {
    pub tile: TileId,
    pub date: NaiveDate,
    pub remote_url: String,
    /// Deterministic in (product, date, tile); the download cache key.
    pub local_filename: String,
}

impl GranuleReference {
    /// Sort key giving ascending date, then ascending (h, v).
    pub fn order_key(&self) -> (NaiveDate, TileId) {
        (self.date, self.tile)
    }
}

/// A granule persisted in the local download directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalGranuleFile {
    pub path: PathBuf,
    pub tile: TileId,
    pub date: NaiveDate,
    /// False when an existing file was reused without a network call.
    pub downloaded: bool,
}

impl LocalGranuleFile {
    pub fn new(path: impl Into<PathBuf>, granule: &GranuleReference, downloaded: bool) -> Self {
        Self {
            path: path.into(),
            tile: granule.tile,
            date: granule.date,
            downloaded,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
