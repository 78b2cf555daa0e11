//! Granule acquisition: find the remote files for tiles and dates, then
//! fetch them into a local cache directory.
//!
//! - [`TemplateLocator`] builds URLs deterministically from a path template.
//! - [`SearchLocator`] asks a CMR-style catalog and maps results to tiles by
//!   granule name.
//! - [`HttpDownloader`] streams authenticated GETs to disk, keyed by the
//!   canonical file name, with single-flight per file name.
//! - [`Retrying`] adds bounded exponential backoff around either.

pub mod catalog;
pub mod download;
pub mod locator;
pub mod retry;

pub use catalog::{CatalogClient, CatalogConfig, SearchLocator};
pub use download::{DownloadConfig, GranuleFetcher, HttpDownloader};
pub use locator::{expand_dates, GranuleLocator, TemplateLocator, DEFAULT_URL_TEMPLATE};
pub use retry::{RetryPolicy, Retrying};
