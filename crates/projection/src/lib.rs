//! Coordinate reference system transformations for the MODIS sinusoidal grid.
//!
//! The sinusoidal projection and the tile grid are implemented directly; any
//! other CRS a granule declares is handled through proj4rs.

pub mod error;
pub mod grid;
pub mod sinusoidal;
pub mod transform;

pub use error::{ProjectionError, ProjectionResult};
pub use grid::{point_to_tile, resolve_tiles, tile_geotransform, TileIndexing};
pub use sinusoidal::Sinusoidal;
pub use transform::{AffineTransform, CrsTransformer};
