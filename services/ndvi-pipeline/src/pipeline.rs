//! Mean NDVI over a bounding box: resolve tiles, locate granules, fetch,
//! extract and pool.
//!
//! Granules are processed with bounded, order-preserving concurrency.
//! Decoding and masking run on the blocking pool and each granule reduces
//! pixel by pixel to a [`MeanAccumulator`] there, so only its raw samples
//! are ever held.
//!
//! The tiles a query reports are the catalog's when the locator assigns
//! them, and the local grid's otherwise. Gaps are counted per (tile,
//! composite date) over those tiles.
//!
//! Failures of individual granules are collected rather than propagated;
//! the query fails only when nothing succeeded, with the first failure in
//! (date, tile) order.

use std::collections::BTreeSet;
use std::sync::Arc;

use acquisition::{
    expand_dates, CatalogClient, GranuleFetcher, GranuleLocator, HttpDownloader, Retrying, SearchLocator,
    TemplateLocator,
};
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use hdf_parser::GranuleReader;
use metrics::counter;
use modis_common::{BoundingBox, DateSpec, GranuleReference, LocalGranuleFile, PipelineError, PipelineResult, TileId};
use ndvi::{AggregateResult, MeanAccumulator, NdviExtractor};
use projection::{resolve_tiles, TileIndexing};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::{LocatorStrategy, PipelineConfig};

/// Stage at which a granule failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Download,
    Extract,
}

impl FailureStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureStage::Download => "download",
            FailureStage::Extract => "extract",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GranuleStatus {
    Processed {
        /// False when the cached file was reused
        downloaded: bool,
        valid_pixels: usize,
        in_box_pixels: usize,
    },
    Failed {
        stage: FailureStage,
        error: String,
    },
}

/// What happened to one located granule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GranuleOutcome {
    pub tile: TileId,
    pub date: NaiveDate,
    pub local_filename: String,
    #[serde(flatten)]
    pub status: GranuleStatus,
}

impl GranuleOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, GranuleStatus::Failed { .. })
    }
}

/// A (tile, composite date) for which no granule was located, or the whole
/// query when `tile` is `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CoverageGap {
    pub tile: Option<TileId>,
    pub date: NaiveDate,
}

/// Result of one query with its provenance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NdviReport {
    pub result: AggregateResult,
    /// Tiles the query covers: the catalog's assignment when the locator
    /// makes one, otherwise the tiles resolved from the bounding box
    pub tiles: Vec<TileId>,
    /// One entry per located granule, in (date, tile) order
    pub granules: Vec<GranuleOutcome>,
    pub gaps: Vec<CoverageGap>,
    pub partial_coverage: bool,
}

impl NdviReport {
    /// The mean, or `NoCoverage` when no valid pixel was found.
    pub fn require_value(&self) -> PipelineResult<f64> {
        self.result.require_value()
    }
}

/// Per-granule result carried out of the processing stream.
struct GranuleRun {
    granule: GranuleReference,
    result: Result<(LocalGranuleFile, MeanAccumulator), (FailureStage, PipelineError)>,
}

/// The assembled pipeline.
pub struct NdviPipeline {
    locator: Arc<dyn GranuleLocator>,
    fetcher: Arc<dyn GranuleFetcher>,
    extractor: NdviExtractor,
    indexing: TileIndexing,
    max_concurrent: usize,
}

impl NdviPipeline {
    pub fn new(
        locator: Arc<dyn GranuleLocator>,
        fetcher: Arc<dyn GranuleFetcher>,
        extractor: NdviExtractor,
        indexing: TileIndexing,
        max_concurrent: usize,
    ) -> Self {
        Self {
            locator,
            fetcher,
            extractor,
            indexing,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Wire up locator, downloader and extractor from configuration.
    pub fn from_config(config: &PipelineConfig, reader: Arc<dyn GranuleReader>) -> PipelineResult<Self> {
        let product = config.product.clone();

        let locator: Arc<dyn GranuleLocator> = match config.locator.strategy {
            LocatorStrategy::Search => {
                let client = CatalogClient::new(config.locator.catalog.clone(), product.clone())?;
                Arc::new(Retrying::new(SearchLocator::new(client), config.locator.retry))
            }
            LocatorStrategy::Template => {
                let locator = TemplateLocator::new(config.locator.url_template.as_str(), product.clone())?;
                Arc::new(Retrying::new(locator, config.locator.retry))
            }
        };

        let downloader = HttpDownloader::new(config.download.client.clone())?;
        let fetcher: Arc<dyn GranuleFetcher> = Arc::new(Retrying::new(downloader, config.download.retry));

        info!(
            strategy = locator.name(),
            product = %product.short_name,
            version = %product.version,
            output_dir = %config.download.client.output_dir.display(),
            authenticated = config.download.client.token.is_some(),
            reader = reader.name(),
            "NDVI pipeline configured"
        );

        Ok(Self::new(
            locator,
            fetcher,
            NdviExtractor::new(reader, product),
            config.grid.indexing,
            config.pipeline.max_concurrent,
        ))
    }

    /// Mean NDVI of every valid pixel inside `bbox` across all granules
    /// located for `dates`.
    #[instrument(skip(self, bbox, dates), fields(bbox = %bbox.to_param(), start = %dates.start(), end = %dates.end()))]
    pub async fn compute_mean_ndvi(&self, bbox: &BoundingBox, dates: &DateSpec) -> PipelineResult<NdviReport> {
        let resolved = resolve_tiles(bbox, self.indexing)?;
        info!(tiles = ?resolved, indexing = ?self.indexing, "Resolved tiles");

        let granules = self.locator.locate_all(&resolved, dates, bbox).await?;
        info!(count = granules.len(), strategy = self.locator.name(), "Located granules");

        let tiles = self.covered_tiles(bbox, resolved, &granules);
        let expected = expand_dates(dates, self.extractor.product().composite_days);
        let gaps = coverage_gaps(&tiles, &expected, &granules, dates.start());
        for gap in &gaps {
            warn!(tile = ?gap.tile, date = %gap.date, "No granule located");
        }

        let runs: Vec<GranuleRun> = stream::iter(granules.into_iter().map(|g| self.process(g, *bbox)))
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let mut acc = MeanAccumulator::new();
        let mut outcomes = Vec::with_capacity(runs.len());
        let mut first_error: Option<PipelineError> = None;
        let mut failures = 0usize;

        for run in runs {
            let status = match run.result {
                Ok((local, granule_acc)) => {
                    acc.merge(&granule_acc);
                    GranuleStatus::Processed {
                        downloaded: local.downloaded,
                        valid_pixels: granule_acc.valid_pixels(),
                        in_box_pixels: granule_acc.in_box_pixels(),
                    }
                }
                Err((stage, error)) => {
                    failures += 1;
                    counter!("ndvi_tile_failures_total", "stage" => stage.as_str()).increment(1);
                    warn!(
                        tile = %run.granule.tile,
                        date = %run.granule.date,
                        stage = stage.as_str(),
                        error = %error,
                        "Granule failed"
                    );
                    let message = error.to_string();
                    first_error.get_or_insert(error);
                    GranuleStatus::Failed { stage, error: message }
                }
            };
            outcomes.push(GranuleOutcome {
                tile: run.granule.tile,
                date: run.granule.date,
                local_filename: run.granule.local_filename,
                status,
            });
        }

        if failures > 0 && failures == outcomes.len() {
            if let Some(error) = first_error {
                return Err(error);
            }
        }

        let partial_coverage = failures > 0;
        let result = acc.finish().with_partial_coverage(partial_coverage);

        info!(
            mean_ndvi = ?result.mean_ndvi,
            valid_pixels = result.valid_pixels,
            granules = outcomes.len(),
            failures,
            gaps = gaps.len(),
            partial_coverage,
            "Computed mean NDVI"
        );

        Ok(NdviReport {
            result,
            tiles: tiles.into_iter().collect(),
            granules: outcomes,
            gaps,
            partial_coverage,
        })
    }

    /// Tiles to report and check for gaps.
    ///
    /// A locator that assigns tiles is trusted over the local grid; any
    /// disagreement between the two is logged.
    fn covered_tiles(
        &self,
        bbox: &BoundingBox,
        resolved: BTreeSet<TileId>,
        granules: &[GranuleReference],
    ) -> BTreeSet<TileId> {
        if self.locator.assigns_tiles() {
            let located: BTreeSet<TileId> = granules.iter().map(|g| g.tile).collect();
            if located.is_empty() {
                return resolved;
            }
            if located != resolved {
                warn!(
                    resolved = ?resolved,
                    located = ?located,
                    indexing = ?self.indexing,
                    "Catalog tiles differ from the local grid; using the catalog's"
                );
            }
            return located;
        }

        if self.indexing == TileIndexing::Documented {
            if let Ok(sinusoidal) = resolve_tiles(bbox, TileIndexing::Sinusoidal) {
                if sinusoidal != resolved {
                    warn!(
                        documented = ?resolved,
                        sinusoidal = ?sinusoidal,
                        "Documented tile indexing disagrees with the sinusoidal grid"
                    );
                }
            }
        }
        resolved
    }

    /// Fetch one granule, then decode and mask it on the blocking pool.
    async fn process(&self, granule: GranuleReference, bbox: BoundingBox) -> GranuleRun {
        let local = match self.fetcher.fetch(&granule).await {
            Ok(local) => local,
            Err(e) => {
                return GranuleRun {
                    granule,
                    result: Err((FailureStage::Download, e.into())),
                }
            }
        };

        let extractor = self.extractor.clone();
        let task_local = local.clone();
        let extracted = tokio::task::spawn_blocking(move || extractor.reduce(&task_local, &bbox)).await;

        let result = match extracted {
            Ok(Ok(acc)) => {
                debug!(
                    file = %granule.local_filename,
                    valid_pixels = acc.valid_pixels(),
                    in_box_pixels = acc.in_box_pixels(),
                    "Granule reduced"
                );
                Ok((local, acc))
            }
            Ok(Err(e)) => Err((FailureStage::Extract, e.into())),
            Err(e) => Err((
                FailureStage::Extract,
                PipelineError::Internal(format!("extraction task failed: {}", e)),
            )),
        };

        GranuleRun { granule, result }
    }
}

/// Every (date, tile) with no located granule, in (date, tile) order; one
/// query-wide gap when nothing was located at all.
fn coverage_gaps(
    tiles: &BTreeSet<TileId>,
    expected: &[NaiveDate],
    granules: &[GranuleReference],
    start: NaiveDate,
) -> Vec<CoverageGap> {
    if granules.is_empty() {
        return vec![CoverageGap { tile: None, date: start }];
    }
    let covered: BTreeSet<(NaiveDate, TileId)> = granules.iter().map(|g| (g.date, g.tile)).collect();
    expected
        .iter()
        .flat_map(|date| tiles.iter().map(move |tile| (*date, *tile)))
        .filter(|key| !covered.contains(key))
        .map(|(date, tile)| CoverageGap { tile: Some(tile), date })
        .collect()
}
