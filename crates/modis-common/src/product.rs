//! Product description and granule naming.
//!
//! Granule names follow `<PRODUCT>.A<YYYY><DDD>.h<HH>v<VV>.<VERSION>.<ext>`.
//! Archive copies usually carry a production stamp before the extension
//! (`MOD13Q1.A2023209.h24v06.061.2023226000418.hdf`); the canonical local
//! name drops it so re-runs recognise cached files by name alone.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::tile::TileId;
use crate::time::doy_string;

/// A satellite vegetation-index product and its band conventions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Product {
    /// Catalog short name, e.g. "MOD13Q1"
    pub short_name: String,
    /// Collection version, e.g. "061"
    pub version: String,
    /// Granule file extension without the dot
    pub extension: String,
    /// Substring identifying the NDVI subdataset
    pub band_pattern: String,
    /// Documented scale used when the band carries no scale attribute
    pub nominal_scale: Option<f64>,
    /// Documented offset used when the band carries no offset attribute
    pub nominal_offset: Option<f64>,
    /// Documented fill value used when the band carries none
    pub nominal_fill: Option<i32>,
    /// Length of the compositing period in days (16 for MOD13Q1)
    pub composite_days: Option<u32>,
}

impl Default for Product {
    fn default() -> Self {
        Self::mod13q1()
    }
}

impl Product {
    /// Terra MODIS 16-day 250m vegetation indices, collection 6.1.
    pub fn mod13q1() -> Self {
        Self {
            short_name: "MOD13Q1".to_string(),
            version: "061".to_string(),
            extension: "hdf".to_string(),
            band_pattern: "250m 16 days NDVI".to_string(),
            nominal_scale: Some(0.0001),
            nominal_offset: Some(0.0),
            nominal_fill: Some(-3000),
            composite_days: Some(16),
        }
    }

    /// Canonical local filename for a (date, tile) granule.
    pub fn granule_filename(&self, date: NaiveDate, tile: TileId) -> String {
        GranuleName {
            product: self.short_name.clone(),
            date,
            tile,
            version: self.version.clone(),
        }
        .canonical_filename(&self.extension)
    }

    /// Whether a remote link points at a granule file of this product.
    pub fn matches_extension(&self, href: &str) -> bool {
        href.ends_with(&format!(".{}", self.extension))
    }
}

/// The identifying parts of a granule file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GranuleName {
    pub product: String,
    pub date: NaiveDate,
    pub tile: TileId,
    pub version: String,
}

impl GranuleName {
    /// Parse a granule file name (or the last path segment of a URL).
    pub fn parse(name: &str) -> PipelineResult<Self> {
        let file = name.rsplit('/').next().unwrap_or(name);
        let invalid = || PipelineError::invalid_input(format!("unrecognised granule name '{}'", file));

        let parts: Vec<&str> = file.split('.').collect();
        // product, AYYYYDDD, hHHvVV, version, [production stamp], extension
        if parts.len() < 5 {
            return Err(invalid());
        }

        let stamp = parts[1].strip_prefix('A').ok_or_else(invalid)?;
        if stamp.len() != 7 || !stamp.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year: i32 = stamp[..4].parse().map_err(|_| invalid())?;
        let doy: u32 = stamp[4..].parse().map_err(|_| invalid())?;
        let date = NaiveDate::from_yo_opt(year, doy).ok_or_else(invalid)?;

        let tile: TileId = parts[2].parse().map_err(|_| invalid())?;

        Ok(Self {
            product: parts[0].to_string(),
            date,
            tile,
            version: parts[3].to_string(),
        })
    }

    pub fn canonical_filename(&self, extension: &str) -> String {
        format!(
            "{}.A{}{}.{}.{}.{}",
            self.product,
            self.date.format("%Y"),
            doy_string(self.date),
            self.tile,
            self.version,
            extension
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_filename() {
        let product = Product::mod13q1();
        let date = NaiveDate::from_ymd_opt(2023, 7, 28).unwrap();
        let tile = TileId::new(24, 6).unwrap();
        assert_eq!(
            product.granule_filename(date, tile),
            "MOD13Q1.A2023209.h24v06.061.hdf"
        );
    }

    #[test]
    fn test_parse_archive_name_with_production_stamp() {
        let name = GranuleName::parse(
            "https://data.example.org/MOD13Q1.061/2023.07.28/MOD13Q1.A2023209.h24v06.061.2023226000418.hdf",
        )
        .unwrap();
        assert_eq!(name.product, "MOD13Q1");
        assert_eq!(name.date, NaiveDate::from_ymd_opt(2023, 7, 28).unwrap());
        assert_eq!(name.tile, TileId::new(24, 6).unwrap());
        assert_eq!(name.version, "061");
        assert_eq!(name.canonical_filename("hdf"), "MOD13Q1.A2023209.h24v06.061.hdf");
    }

    #[test]
    fn test_parse_rejects_other_files() {
        assert!(GranuleName::parse("MOD13Q1.A2023209.h24v06.061.2023226000418.hdf.xml").is_ok());
        assert!(GranuleName::parse("BROWSE.MOD13Q1.jpg").is_err());
        assert!(GranuleName::parse("MOD13Q1.A2023400.h24v06.061.hdf").is_err());
        assert!(GranuleName::parse("MOD13Q1.A2023209.h99v06.061.hdf").is_err());
    }

    #[test]
    fn test_matches_extension() {
        let product = Product::mod13q1();
        assert!(product.matches_extension("https://x/MOD13Q1.A2023209.h24v06.061.hdf"));
        assert!(!product.matches_extension("https://x/MOD13Q1.A2023209.h24v06.061.hdf.xml"));
    }
}
