//! Common types shared across the MODIS NDVI acquisition and averaging crates.

pub mod bbox;
pub mod error;
pub mod granule;
pub mod product;
pub mod tile;
pub mod time;

pub use bbox::{BoundingBox, GeoPoint};
pub use error::{
    DownloadError, DownloadErrorKind, ExtractError, PipelineError, PipelineResult,
};
pub use granule::{GranuleReference, LocalGranuleFile};
pub use product::{GranuleName, Product};
pub use tile::TileId;
pub use time::{day_of_year, doy_string, DateSpec};
