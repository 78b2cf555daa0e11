//! Error types for projection operations.

use modis_common::{ExtractError, PipelineError};
use thiserror::Error;

/// Result type for projection operations.
pub type ProjectionResult<T> = Result<T, ProjectionError>;

#[derive(Error, Debug, Clone)]
pub enum ProjectionError {
    /// A coordinate maps outside the 36x18 tile grid.
    #[error("coordinate ({lon}, {lat}) maps to h={h}, v={v}, outside the tile grid")]
    OutOfGrid { lon: f64, lat: f64, h: i64, v: i64 },

    /// A CRS definition that cannot be parsed or is not supported.
    #[error("unsupported CRS definition: {0}")]
    UnsupportedCrs(String),

    /// A point that the transform could not map.
    #[error("transform failed: {0}")]
    TransformFailed(String),
}

impl From<ProjectionError> for PipelineError {
    fn from(err: ProjectionError) -> Self {
        match err {
            ProjectionError::OutOfGrid { .. } => PipelineError::InvalidInput(err.to_string()),
            ProjectionError::UnsupportedCrs(_) | ProjectionError::TransformFailed(_) => {
                PipelineError::Extract(ExtractError::MalformedAttributes(err.to_string()))
            }
        }
    }
}
