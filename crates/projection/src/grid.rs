//! The MODIS global tile grid: 36 x 18 tiles of 1111950 m in sinusoidal space.
//!
//! Two ways of turning a coordinate into a tile index:
//!
//! - `Sinusoidal` (default): the product's own forward projection,
//!   x = λ·R·cos φ and y = φ·R. Points taken from a real tile map back to it.
//! - `Documented`: the approximation published with the product's tile
//!   calculator, x = λ·R and y = ln(tan((90 + φ)·π/360))·R. It drifts by up
//!   to a tile at mid latitudes (the center of h24v06 lands in h25v06) and
//!   leaves the grid above ~66°.
//!
//! Pixel georeferencing always uses the exact grid constants.

use std::collections::BTreeSet;
use std::f64::consts::PI;

use modis_common::tile::{GRID_COLUMNS, GRID_ROWS};
use modis_common::{BoundingBox, GeoPoint, TileId};
use serde::{Deserialize, Serialize};

use crate::error::{ProjectionError, ProjectionResult};
use crate::sinusoidal::{Sinusoidal, MODIS_SPHERE_RADIUS};
use crate::transform::AffineTransform;

/// Western edge of the grid used for tile indexing (meters).
pub const GRID_X_MIN: f64 = -20015109.0;
/// Northern edge of the grid used for tile indexing (meters).
pub const GRID_Y_MAX: f64 = 10007555.0;
/// Tile width and height used for tile indexing (meters).
pub const TILE_SIZE: f64 = 1111950.0;

/// Exact western edge: -π·R.
pub const GRID_X_MIN_EXACT: f64 = -20015109.354;
/// Exact northern edge: π·R/2.
pub const GRID_Y_MAX_EXACT: f64 = 10007554.677;
/// Exact tile size: 2·π·R / 36.
pub const TILE_SIZE_EXACT: f64 = 1111950.5196666666;

/// Samples per tile edge for the 250 m products.
pub const TILE_PIXELS_250M: usize = 4800;

/// Planar approximation used to turn a coordinate into a tile index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileIndexing {
    /// x = λ·R, y = ln(tan((90 + φ)·π/360))·R
    Documented,
    /// x = λ·R·cos φ, y = φ·R
    #[default]
    Sinusoidal,
}

impl TileIndexing {
    /// Project a point into the planar space used for indexing.
    pub fn project(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        match self {
            TileIndexing::Documented => {
                let x = lon_deg.to_radians() * MODIS_SPHERE_RADIUS;
                let y = ((90.0 + lat_deg) * PI / 360.0).tan().ln() * MODIS_SPHERE_RADIUS;
                (x, y)
            }
            TileIndexing::Sinusoidal => Sinusoidal::modis().forward(lon_deg, lat_deg),
        }
    }

    /// Inverse of [`TileIndexing::project`], ignoring grid limits.
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            TileIndexing::Documented => {
                let lon = (x / MODIS_SPHERE_RADIUS).to_degrees();
                let lat = (y / MODIS_SPHERE_RADIUS).exp().atan() * 360.0 / PI - 90.0;
                (lon, lat)
            }
            TileIndexing::Sinusoidal => {
                let lat = y / MODIS_SPHERE_RADIUS;
                let lon = x / (MODIS_SPHERE_RADIUS * lat.cos());
                (lon.to_degrees(), lat.to_degrees())
            }
        }
    }

    /// Planar corners of a tile: (x_left, y_top, x_right, y_bottom).
    pub fn tile_planar_bounds(&self, tile: TileId) -> (f64, f64, f64, f64) {
        let (x_min, y_max, size) = self.constants();
        let left = x_min + tile.h() as f64 * size;
        let top = y_max - tile.v() as f64 * size;
        (left, top, left + size, top - size)
    }

    fn constants(&self) -> (f64, f64, f64) {
        match self {
            TileIndexing::Documented => (GRID_X_MIN, GRID_Y_MAX, TILE_SIZE),
            TileIndexing::Sinusoidal => (GRID_X_MIN_EXACT, GRID_Y_MAX_EXACT, TILE_SIZE_EXACT),
        }
    }
}

/// Map a geographic point to the tile containing it.
///
/// ```text
/// h = floor((x - xmin) / T)
/// v = floor((ymax - y) / T)
/// ```
///
/// Results outside 0..=35 / 0..=17 are errors, never clamped.
pub fn point_to_tile(point: &GeoPoint, indexing: TileIndexing) -> ProjectionResult<TileId> {
    let (x, y) = indexing.project(point.longitude(), point.latitude());
    let (x_min, y_max, size) = indexing.constants();

    let h = grid_index((x - x_min) / size, GRID_COLUMNS);
    let v = grid_index((y_max - y) / size, GRID_ROWS);

    TileId::new(h, v).map_err(|_| ProjectionError::OutOfGrid {
        lon: point.longitude(),
        lat: point.latitude(),
        h,
        v,
    })
}

/// Floor a fractional tile index. Points lying on the grid's outer edge
/// (within rounding of the grid constants) belong to the border tile.
fn grid_index(fraction: f64, count: u8) -> i64 {
    const EDGE_TOLERANCE: f64 = 1e-6;

    if !fraction.is_finite() {
        return if fraction > 0.0 { i64::MAX } else { i64::MIN };
    }
    let count = count as f64;
    if fraction >= count && fraction - count < EDGE_TOLERANCE {
        return count as i64 - 1;
    }
    if fraction < 0.0 && fraction > -EDGE_TOLERANCE {
        return 0;
    }
    fraction.floor() as i64
}

/// Tiles touched by a bounding box, sampled at its four corners.
///
/// This under-counts boxes whose edges bow across a tile boundary between
/// corners; the result is never empty.
pub fn resolve_tiles(bbox: &BoundingBox, indexing: TileIndexing) -> ProjectionResult<BTreeSet<TileId>> {
    bbox.corners()
        .iter()
        .map(|corner| point_to_tile(corner, indexing))
        .collect()
}

/// Pixel-to-sinusoidal affine transform of a tile with `width` x `height`
/// samples, edge-aligned (pixel (0, 0) starts at the tile's top-left corner).
pub fn tile_geotransform(tile: TileId, width: usize, height: usize) -> AffineTransform {
    let pixel_width = TILE_SIZE_EXACT / width as f64;
    let pixel_height = TILE_SIZE_EXACT / height as f64;
    let left = GRID_X_MIN_EXACT + tile.h() as f64 * TILE_SIZE_EXACT;
    let top = GRID_Y_MAX_EXACT - tile.v() as f64 * TILE_SIZE_EXACT;
    AffineTransform::new([left, pixel_width, 0.0, top, 0.0, -pixel_height])
}
