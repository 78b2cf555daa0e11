//! Error types for granule parsing operations.

use modis_common::ExtractError;
use thiserror::Error;

/// Result type for granule parser operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Error types for granule parsing.
#[derive(Error, Debug)]
pub enum ParseError {
    /// File I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// The file could not be opened as a granule container
    #[error("Cannot open granule {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    /// A subdataset could not be read
    #[error("Cannot read subdataset {name}: {reason}")]
    ReadFailed { name: String, reason: String },

    /// An attribute exists but has an unusable value
    #[error("Invalid attribute {name}: {reason}")]
    InvalidAttribute { name: String, reason: String },

    /// No reader backend was compiled in
    #[error("No granule reader available: {0}")]
    Unsupported(String),
}

impl From<ParseError> for ExtractError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::InvalidAttribute { .. } => ExtractError::MalformedAttributes(err.to_string()),
            _ => ExtractError::Unreadable(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_errors_are_malformed() {
        let err: ExtractError = ParseError::InvalidAttribute {
            name: "scale_factor".to_string(),
            reason: "not numeric".to_string(),
        }
        .into();
        assert!(matches!(err, ExtractError::MalformedAttributes(_)));
    }

    #[test]
    fn test_open_errors_are_unreadable() {
        let err: ExtractError = ParseError::OpenFailed {
            path: "/data/x.hdf".to_string(),
            reason: "truncated".to_string(),
        }
        .into();
        assert!(matches!(err, ExtractError::Unreadable(ref m) if m.contains("truncated")));
    }
}
