//! Authenticated granule downloads into a local cache directory.
//!
//! Key features:
//! - Cache keyed purely by file name: an existing file is returned without
//!   any network call
//! - Streamed bodies written through a fixed-size buffer
//! - Temporary `.<filename>.<uuid>.partial` file renamed into place only on
//!   success, deleted on failure
//! - Single flight per file name
//!
//! No retries happen here; wrap the downloader in [`crate::Retrying`] for
//! that.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use metrics::counter;
use modis_common::{DownloadError, GranuleReference, LocalGranuleFile, PipelineError, PipelineResult};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::catalog::excerpt;

/// Fetches a located granule into local storage.
#[async_trait]
pub trait GranuleFetcher: Send + Sync {
    async fn fetch(&self, granule: &GranuleReference) -> Result<LocalGranuleFile, DownloadError>;
}

/// Configuration for the downloader.
#[derive(Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Directory holding completed granules
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Whole-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Write buffer size for streamed bodies (64KB default)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Bearer token sent with every granule request
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("modis_downloads")
}

fn default_request_timeout_secs() -> u64 {
    600
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_chunk_size() -> usize {
    64 * 1024
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            chunk_size: default_chunk_size(),
            token: None,
        }
    }
}

impl std::fmt::Debug for DownloadConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadConfig")
            .field("output_dir", &self.output_dir)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("chunk_size", &self.chunk_size)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// HTTP downloader with a file-name keyed cache.
pub struct HttpDownloader {
    client: Client,
    config: DownloadConfig,
    in_flight: InFlightMap,
}

impl HttpDownloader {
    pub fn new(config: DownloadConfig) -> PipelineResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| PipelineError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config,
            in_flight: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Final path for a granule's file name.
    pub fn local_path(&self, local_filename: &str) -> PathBuf {
        self.config.output_dir.join(local_filename)
    }

    /// The lock guarding one file name, registered until the last holder
    /// drops it.
    fn lock_for<'a>(&'a self, local_filename: &'a str) -> InFlight<'a> {
        let mut in_flight = lock_map(&self.in_flight);
        let lock = in_flight
            .entry(local_filename.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        InFlight {
            map: &self.in_flight,
            filename: local_filename,
            lock,
        }
    }

    async fn fetch_inner(&self, granule: &GranuleReference) -> Result<LocalGranuleFile, DownloadError> {
        let url = granule.remote_url.as_str();
        let filename = granule.local_filename.as_str();

        if filename.is_empty() || filename.contains('/') || filename.contains('\\') || filename.starts_with('.') {
            return Err(DownloadError::storage(url, format!("invalid local file name '{}'", filename)));
        }

        let final_path = self.local_path(filename);
        if final_path.exists() {
            return Ok(self.cache_hit(final_path, granule));
        }

        let entry = self.lock_for(filename);
        let _guard = entry.lock.lock().await;

        // Another task may have finished this file while we waited
        if final_path.exists() {
            return Ok(self.cache_hit(final_path, granule));
        }

        fs::create_dir_all(&self.config.output_dir)
            .await
            .map_err(|e| DownloadError::storage(url, format!("cannot create {}: {}", self.config.output_dir.display(), e)))?;

        info!(url = %url, filename = %filename, "Starting download");

        let bytes = self.download_to(url, filename, &final_path).await?;

        counter!("ndvi_granule_downloads_total", "outcome" => "downloaded").increment(1);
        counter!("ndvi_granule_bytes_total").increment(bytes);
        info!(path = %final_path.display(), bytes, "Download completed");

        Ok(LocalGranuleFile::new(final_path, granule, true))
    }

    fn cache_hit(&self, path: PathBuf, granule: &GranuleReference) -> LocalGranuleFile {
        info!(path = %path.display(), "File already exists, skipping download");
        counter!("ndvi_granule_downloads_total", "outcome" => "cached").increment(1);
        LocalGranuleFile::new(path, granule, false)
    }

    /// GET into a temporary file, then rename into place.
    async fn download_to(&self, url: &str, filename: &str, final_path: &Path) -> Result<u64, DownloadError> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::network(url, format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            let err = DownloadError::from_status(url, status.as_u16(), excerpt(&body));
            warn!(url = %url, status = status.as_u16(), kind = %err.kind, body = %err.detail, "Download rejected");
            return Err(err);
        }

        let temp_path = self
            .config
            .output_dir
            .join(format!(".{}.{}.partial", filename, Uuid::new_v4()));

        let written = match self.stream_to_file(url, response, &temp_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                fs::remove_file(&temp_path).await.ok();
                return Err(e);
            }
        };

        if let Err(e) = fs::rename(&temp_path, final_path).await {
            fs::remove_file(&temp_path).await.ok();
            return Err(DownloadError::storage(
                url,
                format!("cannot move download into {}: {}", final_path.display(), e),
            ));
        }

        Ok(written)
    }

    /// Stream the response body through a fixed-size buffer.
    async fn stream_to_file(&self, url: &str, response: Response, path: &Path) -> Result<u64, DownloadError> {
        let expected = response.content_length();
        let storage = |e: std::io::Error| DownloadError::storage(url, format!("{}: {}", path.display(), e));

        let file = File::create(path).await.map_err(storage)?;
        let mut writer = BufWriter::with_capacity(self.config.chunk_size.max(1), file);

        let mut stream = response.bytes_stream();
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| DownloadError::network(url, format!("Error reading response chunk: {}", e)))?;
            writer.write_all(&chunk).await.map_err(storage)?;
            written += chunk.len() as u64;
        }

        writer.flush().await.map_err(storage)?;
        writer.into_inner().sync_all().await.map_err(storage)?;

        if let Some(expected) = expected {
            if written != expected {
                return Err(DownloadError::network(
                    url,
                    format!("Download size mismatch: expected {} bytes, got {}", expected, written),
                ));
            }
        }

        debug!(path = %path.display(), bytes = written, "Body written");
        Ok(written)
    }
}

type InFlightMap = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

fn lock_map(map: &InFlightMap) -> std::sync::MutexGuard<'_, HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
    match map.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// A registered per-file lock. Dropping the last holder removes the entry.
struct InFlight<'a> {
    map: &'a InFlightMap,
    filename: &'a str,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut in_flight = lock_map(self.map);
        // One reference in the map, one here: nobody else is waiting
        if Arc::strong_count(&self.lock) <= 2 {
            in_flight.remove(self.filename);
        }
    }
}

#[async_trait]
impl GranuleFetcher for HttpDownloader {
    #[instrument(skip(self, granule), fields(file = %granule.local_filename))]
    async fn fetch(&self, granule: &GranuleReference) -> Result<LocalGranuleFile, DownloadError> {
        let result = self.fetch_inner(granule).await;
        if let Err(e) = &result {
            counter!("ndvi_granule_downloads_total", "outcome" => "failed").increment(1);
            warn!(error = %e, "Granule download failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let config = DownloadConfig {
            token: Some("secret-token".to_string()),
            ..DownloadConfig::default()
        };
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_token_never_serialized() {
        let config = DownloadConfig {
            token: Some("secret-token".to_string()),
            ..DownloadConfig::default()
        };
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(!yaml.contains("secret-token"));
    }

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config: DownloadConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.chunk_size, 64 * 1024);
        assert_eq!(config.request_timeout_secs, 600);
        assert!(config.token.is_none());
    }

    fn registered(downloader: &HttpDownloader) -> usize {
        lock_map(&downloader.in_flight).len()
    }

    #[test]
    fn test_same_lock_per_filename() {
        let downloader = HttpDownloader::new(DownloadConfig::default()).unwrap();
        let a = downloader.lock_for("a.hdf");
        let b = downloader.lock_for("a.hdf");
        let c = downloader.lock_for("c.hdf");
        assert!(Arc::ptr_eq(&a.lock, &b.lock));
        assert!(!Arc::ptr_eq(&a.lock, &c.lock));
    }

    #[test]
    fn test_lock_entry_kept_while_shared() {
        let downloader = HttpDownloader::new(DownloadConfig::default()).unwrap();
        let first = downloader.lock_for("a.hdf");
        let second = downloader.lock_for("a.hdf");

        drop(first);
        assert_eq!(registered(&downloader), 1);

        drop(second);
        assert_eq!(registered(&downloader), 0);
    }

    #[tokio::test]
    async fn test_lock_entries_released_after_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = HttpDownloader::new(DownloadConfig {
            output_dir: dir.path().to_path_buf(),
            connect_timeout_secs: 2,
            ..DownloadConfig::default()
        })
        .unwrap();

        for name in ["a.hdf", "b.hdf", "c.hdf"] {
            let granule = GranuleReference {
                tile: modis_common::TileId::new(24, 6).unwrap(),
                date: chrono::NaiveDate::from_ymd_opt(2023, 7, 28).unwrap(),
                remote_url: test_utils::refused_url(name),
                local_filename: name.to_string(),
            };
            assert!(downloader.fetch(&granule).await.is_err());
        }

        assert_eq!(registered(&downloader), 0);
    }

    #[tokio::test]
    async fn test_rejects_path_like_filenames() {
        let downloader = HttpDownloader::new(DownloadConfig::default()).unwrap();
        let granule = GranuleReference {
            tile: modis_common::TileId::new(24, 6).unwrap(),
            date: chrono::NaiveDate::from_ymd_opt(2023, 7, 28).unwrap(),
            remote_url: "https://example.com/x.hdf".to_string(),
            local_filename: "../x.hdf".to_string(),
        };
        let err = downloader.fetch(&granule).await.unwrap_err();
        assert_eq!(err.kind, modis_common::DownloadErrorKind::Storage);
    }
}
