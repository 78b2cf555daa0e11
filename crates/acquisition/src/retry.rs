//! Bounded exponential backoff around locators and fetchers.
//!
//! Only transient failures are retried: catalog errors for locators and
//! network errors for fetchers. Auth, NotFound, HTTP status and storage
//! failures return immediately.

use std::collections::BTreeSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use modis_common::{
    BoundingBox, DateSpec, DownloadError, DownloadErrorKind, GranuleReference, LocalGranuleFile, PipelineError,
    PipelineResult, TileId,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::download::GranuleFetcher;
use crate::locator::GranuleLocator;

/// Retry settings. The default performs no retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    #[serde(default)]
    pub max_retries: u32,
    /// First backoff delay, doubling each retry
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_initial_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    120_000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self::default()
    }

    /// Run `op` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, E, F, Fut>(&self, what: &str, retryable: impl Fn(&E) -> bool, mut op: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_delay = Duration::from_millis(self.max_delay_ms);
        let mut delay = Duration::from_millis(self.initial_delay_ms).min(max_delay);
        let mut retry_count = 0;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if retry_count < self.max_retries && retryable(&e) => {
                    retry_count += 1;
                    warn!(
                        operation = what,
                        error = %e,
                        retry = retry_count,
                        max_retries = self.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, max_delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Wraps a locator or fetcher with a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct Retrying<T> {
    inner: T,
    policy: RetryPolicy,
}

impl<T> Retrying<T> {
    pub fn new(inner: T, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }
}

fn catalog_retryable(e: &PipelineError) -> bool {
    matches!(e, PipelineError::Catalog(_))
}

fn download_retryable(e: &DownloadError) -> bool {
    e.kind == DownloadErrorKind::Network
}

#[async_trait]
impl<T: GranuleLocator> GranuleLocator for Retrying<T> {
    async fn locate(&self, tile: TileId, dates: &DateSpec, bbox: &BoundingBox) -> PipelineResult<Vec<GranuleReference>> {
        self.policy
            .run("locate", catalog_retryable, move || self.inner.locate(tile, dates, bbox))
            .await
    }

    async fn locate_all(
        &self,
        tiles: &BTreeSet<TileId>,
        dates: &DateSpec,
        bbox: &BoundingBox,
    ) -> PipelineResult<Vec<GranuleReference>> {
        self.policy
            .run("locate_all", catalog_retryable, move || self.inner.locate_all(tiles, dates, bbox))
            .await
    }

    fn assigns_tiles(&self) -> bool {
        self.inner.assigns_tiles()
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}

#[async_trait]
impl<T: GranuleFetcher> GranuleFetcher for Retrying<T> {
    async fn fetch(&self, granule: &GranuleReference) -> Result<LocalGranuleFile, DownloadError> {
        self.policy
            .run("fetch", download_retryable, move || self.inner.fetch(granule))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            initial_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<u32, DownloadError> = fast(3)
            .run("test", download_retryable, move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 {
                    Err(DownloadError::network("u", "reset"))
                } else {
                    Ok(n)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), DownloadError> = fast(2)
            .run("test", download_retryable, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DownloadError::network("u", "reset"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_errors_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<(), DownloadError> = fast(5)
            .run("test", download_retryable, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(DownloadError::from_status("u", 404, "missing"))
            })
            .await;

        assert_eq!(result.unwrap_err().kind, DownloadErrorKind::NotFound);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_default_policy_single_attempt() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: PipelineResult<()> = RetryPolicy::none()
            .run("test", catalog_retryable, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(PipelineError::catalog("down"))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_invalid_input_not_retryable() {
        assert!(!catalog_retryable(&PipelineError::invalid_input("bad bbox")));
        assert!(catalog_retryable(&PipelineError::catalog("503")));
    }
}
