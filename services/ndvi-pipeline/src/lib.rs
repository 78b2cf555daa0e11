//! NDVI pipeline service.
//!
//! Computes the mean NDVI over a bounding box and date range:
//! tiles are resolved from the box, granules are located (catalog search or
//! URL template), downloaded into a local cache, decoded, masked against the
//! box and pooled into a single mean.
//!
//! The binary wraps [`NdviPipeline`] in a CLI; the library is usable by any
//! embedding application.

pub mod config;
pub mod pipeline;

pub use config::{LocatorStrategy, PipelineConfig, ReaderBackend};
pub use pipeline::{CoverageGap, FailureStage, GranuleOutcome, GranuleStatus, NdviPipeline, NdviReport};
