//! Granule location strategies.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use modis_common::time::composite_start;
use modis_common::{doy_string, BoundingBox, DateSpec, GranuleReference, PipelineError, PipelineResult, Product, TileId};
use tracing::debug;

/// LP DAAC archive layout. `{filename}` is the canonical granule name.
pub const DEFAULT_URL_TEMPLATE: &str =
    "https://e4ftl01.cr.usgs.gov/MOLT/{product}.{version}/{year}.{month}.{day}/{filename}";

/// Resolves which remote granules cover a tile over a date or date range.
#[async_trait]
pub trait GranuleLocator: Send + Sync {
    /// Granules for one tile, ascending by date. An empty result is a gap,
    /// not an error.
    async fn locate(&self, tile: TileId, dates: &DateSpec, bbox: &BoundingBox) -> PipelineResult<Vec<GranuleReference>>;

    /// Granules for every tile, ascending by date then (h, v), without
    /// duplicate file names.
    async fn locate_all(
        &self,
        tiles: &BTreeSet<TileId>,
        dates: &DateSpec,
        bbox: &BoundingBox,
    ) -> PipelineResult<Vec<GranuleReference>> {
        let mut all = Vec::new();
        for tile in tiles {
            all.extend(self.locate(*tile, dates, bbox).await?);
        }
        Ok(sort_and_dedup(all))
    }

    /// Whether [`GranuleLocator::locate_all`] decides tile membership itself
    /// rather than returning granules for exactly the tiles it was given.
    fn assigns_tiles(&self) -> bool {
        false
    }

    /// Strategy name for logs.
    fn name(&self) -> &'static str;
}

/// Ascending (date, tile), dropping repeated local file names.
pub(crate) fn sort_and_dedup(mut granules: Vec<GranuleReference>) -> Vec<GranuleReference> {
    granules.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
    let mut seen = BTreeSet::new();
    granules.retain(|g| seen.insert(g.local_filename.clone()));
    granules
}

/// Dates to request for a query, ascending.
///
/// With a composite period each date snaps to the first day of its period
/// and duplicates collapse; without one every calendar day is kept.
pub fn expand_dates(dates: &DateSpec, composite_days: Option<u32>) -> Vec<NaiveDate> {
    let days = dates.days();
    match composite_days {
        Some(period) if period > 1 => {
            let snapped: BTreeSet<NaiveDate> = days.into_iter().map(|d| composite_start(d, period)).collect();
            snapped.into_iter().collect()
        }
        _ => days,
    }
}

/// Builds granule URLs from a path template.
///
/// Placeholders: `{product}`, `{version}`, `{year}`, `{doy}`, `{month}`,
/// `{day}`, `{tile}`, `{ext}` and `{filename}`. Existence is not checked
/// here; a missing file surfaces as the download's NotFound.
#[derive(Debug, Clone)]
pub struct TemplateLocator {
    template: String,
    product: Product,
}

impl TemplateLocator {
    pub fn new(template: impl Into<String>, product: Product) -> PipelineResult<Self> {
        let template = template.into();
        if !template.contains("{tile}") && !template.contains("{filename}") {
            return Err(PipelineError::invalid_input(format!(
                "URL template '{}' names neither {{tile}} nor {{filename}}",
                template
            )));
        }
        Ok(Self { template, product })
    }

    /// The reference for one (date, tile).
    pub fn reference(&self, date: NaiveDate, tile: TileId) -> GranuleReference {
        let filename = self.product.granule_filename(date, tile);
        let url = self
            .template
            .replace("{product}", &self.product.short_name)
            .replace("{version}", &self.product.version)
            .replace("{year}", &format!("{:04}", date.year()))
            .replace("{doy}", &doy_string(date))
            .replace("{month}", &format!("{:02}", date.month()))
            .replace("{day}", &format!("{:02}", date.day()))
            .replace("{tile}", &tile.to_string())
            .replace("{ext}", &self.product.extension)
            .replace("{filename}", &filename);

        GranuleReference {
            tile,
            date,
            remote_url: url,
            local_filename: filename,
        }
    }
}

#[async_trait]
impl GranuleLocator for TemplateLocator {
    async fn locate(&self, tile: TileId, dates: &DateSpec, _bbox: &BoundingBox) -> PipelineResult<Vec<GranuleReference>> {
        let granules: Vec<GranuleReference> = expand_dates(dates, self.product.composite_days)
            .into_iter()
            .map(|date| self.reference(date, tile))
            .collect();

        debug!(tile = %tile, count = granules.len(), "Template granules");
        Ok(granules)
    }

    fn name(&self) -> &'static str {
        "template"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_reference_default_template() {
        let locator = TemplateLocator::new(DEFAULT_URL_TEMPLATE, Product::default()).unwrap();
        let granule = locator.reference(date(2023, 7, 28), TileId::new(24, 6).unwrap());

        assert_eq!(granule.local_filename, "MOD13Q1.A2023209.h24v06.061.hdf");
        assert_eq!(
            granule.remote_url,
            "https://e4ftl01.cr.usgs.gov/MOLT/MOD13Q1.061/2023.07.28/MOD13Q1.A2023209.h24v06.061.hdf"
        );
    }

    #[test]
    fn test_reference_leap_day() {
        let locator = TemplateLocator::new("https://h/{year}/{doy}/{tile}.{ext}", Product::default()).unwrap();
        let granule = locator.reference(date(2024, 2, 29), TileId::new(3, 11).unwrap());
        assert_eq!(granule.remote_url, "https://h/2024/060/h03v11.hdf");
    }

    #[test]
    fn test_template_without_tile_rejected() {
        assert!(TemplateLocator::new("https://h/{year}", Product::default()).is_err());
    }

    #[test]
    fn test_expand_dates_snaps_to_composite() {
        let single = DateSpec::Single(date(2023, 8, 1));
        assert_eq!(expand_dates(&single, Some(16)), vec![date(2023, 7, 28)]);

        let range = DateSpec::range(date(2023, 7, 20), date(2023, 8, 20)).unwrap();
        assert_eq!(
            expand_dates(&range, Some(16)),
            vec![date(2023, 7, 12), date(2023, 7, 28), date(2023, 8, 13)]
        );
    }

    #[test]
    fn test_expand_dates_daily() {
        let range = DateSpec::range(date(2023, 12, 30), date(2024, 1, 1)).unwrap();
        assert_eq!(expand_dates(&range, None).len(), 3);
    }
}
