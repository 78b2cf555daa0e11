//! Catalog search (CMR granule search API).
//!
//! ```text
//! GET {url}?short_name=MOD13Q1&version=061
//!          &temporal=2023-08-01T00:00:00Z,2023-08-02T23:59:59Z
//!          &bounding_box=77,28,78,29&page_size=2000
//! ```
//!
//! The response is JSON with `feed.entry[].links[].href`. Only `https://`
//! links ending in the product's extension are granules; each is mapped to
//! a tile and date through its file name.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use modis_common::{
    BoundingBox, DateSpec, GranuleName, GranuleReference, PipelineError, PipelineResult, Product, TileId,
};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::locator::{sort_and_dedup, GranuleLocator};

/// Longest response body excerpt kept in error messages.
const BODY_EXCERPT_LEN: usize = 512;

/// Catalog endpoint settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_catalog_url")]
    pub url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_catalog_url() -> String {
    "https://cmr.earthdata.nasa.gov/search/granules.json".to_string()
}

fn default_page_size() -> u32 {
    2000
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            url: default_catalog_url(),
            page_size: default_page_size(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    feed: Feed,
}

#[derive(Debug, Default, Deserialize)]
struct Feed {
    #[serde(default)]
    entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    #[serde(default)]
    href: String,
}

/// HTTP client for the granule catalog.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    client: Client,
    config: CatalogConfig,
    product: Product,
}

impl CatalogClient {
    pub fn new(config: CatalogConfig, product: Product) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(30)))
            .build()
            .map_err(|e| PipelineError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config, product })
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// All granules the catalog returns for a date range and box, ascending
    /// by (date, tile), without duplicate file names.
    #[instrument(skip(self, bbox), fields(bbox = %bbox.to_param()))]
    pub async fn search(&self, dates: &DateSpec, bbox: &BoundingBox) -> PipelineResult<Vec<GranuleReference>> {
        let result = self.query(dates, bbox).await;
        let outcome = if result.is_ok() { "ok" } else { "error" };
        counter!("ndvi_catalog_queries_total", "outcome" => outcome).increment(1);
        result
    }

    async fn query(&self, dates: &DateSpec, bbox: &BoundingBox) -> PipelineResult<Vec<GranuleReference>> {
        let temporal = dates.to_temporal_param();
        let bounding_box = bbox.to_param();
        let page_size = self.config.page_size.to_string();
        let params = [
            ("short_name", self.product.short_name.as_str()),
            ("version", self.product.version.as_str()),
            ("temporal", temporal.as_str()),
            ("bounding_box", bounding_box.as_str()),
            ("page_size", page_size.as_str()),
        ];

        debug!(url = %self.config.url, ?params, "Querying catalog");

        let response = self
            .client
            .get(&self.config.url)
            .query(&params)
            .send()
            .await
            .map_err(|e| PipelineError::catalog(format!("catalog request failed: {}", e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PipelineError::catalog(format!("catalog response unreadable: {}", e)))?;

        if !status.is_success() {
            return Err(PipelineError::catalog(format!(
                "catalog returned HTTP {}: {}",
                status.as_u16(),
                excerpt(&body)
            )));
        }

        let parsed: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| PipelineError::catalog(format!("malformed catalog response: {}", e)))?;

        let granules = self.granules_from(parsed);
        info!(count = granules.len(), "Catalog query returned granules");
        Ok(granules)
    }

    fn granules_from(&self, response: SearchResponse) -> Vec<GranuleReference> {
        let mut granules = Vec::new();

        let hrefs = response
            .feed
            .entry
            .into_iter()
            .flat_map(|entry| entry.links)
            .map(|link| link.href)
            .filter(|href| href.starts_with("https://") && self.product.matches_extension(href));

        for href in hrefs {
            match GranuleName::parse(&href) {
                Ok(name) => granules.push(GranuleReference {
                    tile: name.tile,
                    date: name.date,
                    local_filename: name.canonical_filename(&self.product.extension),
                    remote_url: href,
                }),
                Err(e) => warn!(href = %href, error = %e, "Skipping link with unrecognised granule name"),
            }
        }

        sort_and_dedup(granules)
    }
}

/// Search-based locator. Spatial matching is the catalog's job: results are
/// assigned to tiles by granule name.
#[derive(Debug, Clone)]
pub struct SearchLocator {
    client: CatalogClient,
}

impl SearchLocator {
    pub fn new(client: CatalogClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GranuleLocator for SearchLocator {
    async fn locate(&self, tile: TileId, dates: &DateSpec, bbox: &BoundingBox) -> PipelineResult<Vec<GranuleReference>> {
        let mut granules = self.client.search(dates, bbox).await?;
        granules.retain(|g| g.tile == tile);
        Ok(granules)
    }

    /// One query covers every tile.
    async fn locate_all(
        &self,
        _tiles: &BTreeSet<TileId>,
        dates: &DateSpec,
        bbox: &BoundingBox,
    ) -> PipelineResult<Vec<GranuleReference>> {
        self.client.search(dates, bbox).await
    }

    /// The catalog's spatial search picks the tiles.
    fn assigns_tiles(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "search"
    }
}

/// At most [`BODY_EXCERPT_LEN`] bytes, cut on a char boundary.
pub(crate) fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT_LEN {
        return body.to_string();
    }
    let mut end = BODY_EXCERPT_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
