//! Configuration loader for the NDVI pipeline.
//!
//! A single YAML file with sections:
//! - `product`: granule naming and band conventions
//! - `grid`: tile indexing approximation
//! - `locator`: search or template strategy and their endpoints
//! - `download`: cache directory, timeouts, bearer token, retry policy
//! - `pipeline`: concurrency and granule reader backend
//!
//! Every section defaults to MOD13Q1 v061, so an empty file is valid.
//! Supports environment variable substitution using ${VAR} and
//! ${VAR:-default} syntax.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use acquisition::{CatalogConfig, DownloadConfig, RetryPolicy, TemplateLocator, DEFAULT_URL_TEMPLATE};
use anyhow::{Context, Result};
use hdf_parser::GranuleReader;
use modis_common::{PipelineError, PipelineResult, Product};
use projection::TileIndexing;
use serde::{Deserialize, Serialize};

// ============================================================================
// Configuration sections
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub product: Product,
    pub grid: GridConfig,
    pub locator: LocatorConfig,
    pub download: DownloadSection,
    pub pipeline: RunConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub indexing: TileIndexing,
}

/// How granules are located.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    /// Ask the catalog
    #[default]
    Search,
    /// Build URLs from `url_template`
    Template,
}

impl std::str::FromStr for LocatorStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "search" => Ok(LocatorStrategy::Search),
            "template" => Ok(LocatorStrategy::Template),
            other => Err(format!("unknown locator strategy '{}' (expected search or template)", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    pub strategy: LocatorStrategy,
    pub catalog: CatalogConfig,
    pub url_template: String,
    pub retry: RetryPolicy,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            strategy: LocatorStrategy::default(),
            catalog: CatalogConfig::default(),
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DownloadSection {
    #[serde(flatten)]
    pub client: DownloadConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Granule container backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderBackend {
    /// Best backend compiled in
    #[default]
    Auto,
    Gdal,
    Netcdf,
}

impl ReaderBackend {
    pub fn build(&self) -> PipelineResult<Arc<dyn GranuleReader>> {
        let unavailable = |feature: &str| {
            PipelineError::Internal(format!("reader backend '{}' needs the `{}` feature", feature, feature))
        };

        match self {
            ReaderBackend::Auto => hdf_parser::default_reader().map_err(|e| PipelineError::Internal(e.to_string())),
            #[cfg(feature = "gdal")]
            ReaderBackend::Gdal => Ok(Arc::new(hdf_parser::GdalReader::new())),
            #[cfg(not(feature = "gdal"))]
            ReaderBackend::Gdal => Err(unavailable("gdal")),
            #[cfg(feature = "netcdf")]
            ReaderBackend::Netcdf => Ok(Arc::new(hdf_parser::NetCdfReader::new())),
            #[cfg(not(feature = "netcdf"))]
            ReaderBackend::Netcdf => Err(unavailable("netcdf")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Granules fetched and reduced at once. A 4800 x 4800 granule holds
    /// about 100 MB of raw samples while it is being reduced.
    pub max_concurrent: usize,
    pub reader: ReaderBackend,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            reader: ReaderBackend::default(),
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

impl PipelineConfig {
    /// Load, expand environment variables, parse and validate a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read pipeline config from {:?}", path.as_ref()))?;

        Self::from_yaml_str(&content).with_context(|| format!("Invalid pipeline config {:?}", path.as_ref()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content)?;

        let mut config: PipelineConfig = if expanded.trim().is_empty() {
            PipelineConfig::default()
        } else {
            serde_yaml::from_str(&expanded).with_context(|| "Failed to parse pipeline config YAML")?
        };

        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// An empty token (typically an unset `${VAR:-}`) means no token.
    fn normalize(&mut self) {
        if self.download.client.token.as_deref().map(str::trim) == Some("") {
            self.download.client.token = None;
        }
    }

    pub fn validate(&self) -> Result<()> {
        let product = &self.product;
        anyhow::ensure!(!product.short_name.is_empty(), "product.short_name cannot be empty");
        anyhow::ensure!(!product.version.is_empty(), "product.version cannot be empty");
        anyhow::ensure!(!product.extension.is_empty(), "product.extension cannot be empty");
        anyhow::ensure!(!product.band_pattern.is_empty(), "product.band_pattern cannot be empty");
        if let Some(days) = product.composite_days {
            anyhow::ensure!(days > 0, "product.composite_days must be positive");
        }

        anyhow::ensure!(self.pipeline.max_concurrent > 0, "pipeline.max_concurrent must be at least 1");
        anyhow::ensure!(self.download.client.chunk_size > 0, "download.chunk_size must be positive");
        anyhow::ensure!(
            self.download.client.request_timeout_secs > 0,
            "download.request_timeout_secs must be positive"
        );

        match self.locator.strategy {
            LocatorStrategy::Search => {
                anyhow::ensure!(!self.locator.catalog.url.is_empty(), "locator.catalog.url cannot be empty");
                anyhow::ensure!(self.locator.catalog.page_size > 0, "locator.catalog.page_size must be positive");
            }
            LocatorStrategy::Template => {
                TemplateLocator::new(self.locator.url_template.as_str(), product.clone())
                    .map_err(|e| anyhow::anyhow!("locator.url_template: {}", e))?;
            }
        }

        Ok(())
    }
}

// ============================================================================
// Environment variable expansion
// ============================================================================

/// Expand `${VAR}` and `${VAR:-default}` references.
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut var_expr = String::new();
            let mut depth = 1;

            while depth > 0 {
                match chars.next() {
                    Some('{') => {
                        depth += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        depth -= 1;
                        if depth > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve `VAR` or `VAR:-default`. Set-but-empty takes the default.
fn resolve_var_expr(expr: &str) -> Result<String> {
    match expr.split_once(":-") {
        Some((name, default)) => match std::env::var(name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        },
        None => std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr)),
    }
}
