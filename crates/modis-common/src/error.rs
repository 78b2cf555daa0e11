//! Error taxonomy for the NDVI pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias using PipelineError.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Primary error type for pipeline operations.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    // === Input Errors ===
    /// Malformed bounding box, date, or a coordinate outside the tile grid.
    /// Always fatal; raised before any network call.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // === Remote Errors ===
    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error(transparent)]
    Download(#[from] DownloadError),

    // === Data Errors ===
    #[error(transparent)]
    Extract(#[from] ExtractError),

    /// Aggregation found zero valid pixels inside the query box.
    #[error("No valid NDVI pixels cover the requested area")]
    NoCoverage,

    // === Infrastructure Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn catalog(msg: impl Into<String>) -> Self {
        Self::Catalog(msg.into())
    }

    /// Whether a caller-directed retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Catalog(_) => true,
            PipelineError::Download(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Reason a granule download failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DownloadErrorKind {
    /// Connection failure, timeout, or a broken response stream.
    Network,
    /// 401 / 403 from the granule host.
    Auth,
    /// 404 / 410: no file at the located path.
    NotFound,
    /// Any other non-200 status.
    ServerError,
    /// Local disk failure while persisting the granule.
    Storage,
}

impl DownloadErrorKind {
    /// Classify a non-200 HTTP status.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => DownloadErrorKind::Auth,
            404 | 410 => DownloadErrorKind::NotFound,
            _ => DownloadErrorKind::ServerError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadErrorKind::Network => "network",
            DownloadErrorKind::Auth => "auth",
            DownloadErrorKind::NotFound => "not_found",
            DownloadErrorKind::ServerError => "server_error",
            DownloadErrorKind::Storage => "storage",
        }
    }
}

impl fmt::Display for DownloadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed granule download, with enough context to diagnose it.
#[derive(Debug, Clone, Error)]
#[error("Download failed ({kind}) for {url}{}: {detail}", status_suffix(.status))]
pub struct DownloadError {
    pub kind: DownloadErrorKind,
    pub url: String,
    /// HTTP status, when the server answered.
    pub status: Option<u16>,
    /// Error message or a truncated body excerpt.
    pub detail: String,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" [HTTP {}]", s)).unwrap_or_default()
}

impl DownloadError {
    pub fn new(kind: DownloadErrorKind, url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            url: url.into(),
            status: None,
            detail: detail.into(),
        }
    }

    pub fn network(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(DownloadErrorKind::Network, url, detail)
    }

    pub fn storage(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(DownloadErrorKind::Storage, url, detail)
    }

    /// Build from a non-200 response status and body excerpt.
    pub fn from_status(url: impl Into<String>, status: u16, body_excerpt: impl Into<String>) -> Self {
        Self {
            kind: DownloadErrorKind::from_status(status),
            url: url.into(),
            status: Some(status),
            detail: body_excerpt.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == DownloadErrorKind::Network
    }
}

/// Errors while turning a local granule into an NDVI raster.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    #[error("No subdataset matching '{pattern}' in {path}")]
    SubdatasetNotFound { pattern: String, path: String },

    #[error("Malformed band attributes: {0}")]
    MalformedAttributes(String),

    /// The container could not be opened or decoded at all.
    #[error("Unreadable granule: {0}")]
    Unreadable(String),
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Catalog(format!("JSON error: {}", err))
    }
}
