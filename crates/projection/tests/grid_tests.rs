//! Tests for tile resolution over the MODIS grid.

use modis_common::{BoundingBox, GeoPoint, TileId};
use projection::{point_to_tile, resolve_tiles, tile_geotransform, CrsTransformer, TileIndexing};
use test_utils::{assert_approx_eq, assert_coords_approx_eq, fixtures};

fn bbox(b: (f64, f64, f64, f64)) -> BoundingBox {
    BoundingBox::new(b.0, b.1, b.2, b.3).unwrap()
}

fn tile(h: i64, v: i64) -> TileId {
    TileId::new(h, v).unwrap()
}

// ============================================================================
// Point-to-tile tests
// ============================================================================

/// Geographic points spread over the real tile: pixel centers of its
/// 4800 x 4800 grid, including the outermost rows and columns.
fn real_tile_points(target: TileId) -> Vec<(f64, f64)> {
    let gt = tile_geotransform(target, 4800, 4800);
    let crs = CrsTransformer::modis_sinusoidal();
    let samples = [0usize, 1, 1200, 2400, 3600, 4798, 4799];

    let mut points = Vec::new();
    for row in samples {
        for col in samples {
            let (x, y) = gt.pixel_center(col, row);
            points.push(crs.to_lon_lat(x, y).unwrap());
        }
    }
    points
}

#[test]
fn test_interior_points_map_back_to_their_tile() {
    let target = tile(24, 6);

    for (lon, lat) in real_tile_points(target) {
        let point = GeoPoint::new(lat, lon).unwrap();
        let resolved = point_to_tile(&point, TileIndexing::default()).unwrap();
        assert_eq!(resolved, target, "({}, {}) resolved to {}", lon, lat, resolved);
    }
}

#[test]
fn test_default_indexing_is_sinusoidal() {
    assert_eq!(TileIndexing::default(), TileIndexing::Sinusoidal);
}

#[test]
fn test_documented_indexing_drifts_from_real_grid() {
    let gt = tile_geotransform(tile(24, 6), 4800, 4800);
    let (x, y) = gt.pixel_center(2400, 2400);
    let (lon, lat) = CrsTransformer::modis_sinusoidal().to_lon_lat(x, y).unwrap();
    assert_coords_approx_eq!((lon, lat), (71.72, 25.0), 0.01);

    let center = GeoPoint::new(lat, lon).unwrap();
    assert_eq!(point_to_tile(&center, TileIndexing::Sinusoidal).unwrap(), tile(24, 6));
    assert_eq!(point_to_tile(&center, TileIndexing::Documented).unwrap(), tile(25, 6));
}

#[test]
fn test_documented_interior_points_stay_in_documented_tile() {
    let target = tile(24, 6);
    let indexing = TileIndexing::Documented;
    let (left, top, right, bottom) = indexing.tile_planar_bounds(target);
    let nudge = 1.0;

    for fx in [0.0, 0.5, 1.0] {
        for fy in [0.0, 0.5, 1.0] {
            let x = (left + nudge) + fx * (right - left - 2.0 * nudge);
            let y = (top - nudge) - fy * (top - bottom - 2.0 * nudge);
            let (lon, lat) = indexing.unproject(x, y);
            let point = GeoPoint::new(lat, lon).unwrap();
            assert_eq!(point_to_tile(&point, indexing).unwrap(), target);
        }
    }
}

#[test]
fn test_indexing_roundtrip() {
    for indexing in [TileIndexing::Documented, TileIndexing::Sinusoidal] {
        let (x, y) = indexing.project(77.5, 28.5);
        let (lon, lat) = indexing.unproject(x, y);
        assert_coords_approx_eq!((lon, lat), (77.5, 28.5), 1e-9);
    }
}

#[test]
fn test_antimeridian_stays_on_grid() {
    for indexing in [TileIndexing::Documented, TileIndexing::Sinusoidal] {
        let east = point_to_tile(&GeoPoint::new(0.0, 180.0).unwrap(), indexing).unwrap();
        let west = point_to_tile(&GeoPoint::new(0.0, -180.0).unwrap(), indexing).unwrap();
        assert_eq!(east.h(), 35);
        assert_eq!(west.h(), 0);
    }
}

// ============================================================================
// Bounding box tests
// ============================================================================

#[test]
fn test_small_box_single_tile() {
    let tiles = resolve_tiles(&bbox(fixtures::bbox::DELHI), TileIndexing::Documented).unwrap();
    assert_eq!(tiles.len(), 1);
    assert!(tiles.contains(&tile(25, 6)));
}

#[test]
fn test_box_straddling_boundary_returns_union() {
    let tiles = resolve_tiles(&bbox(fixtures::bbox::H25_H26_BOUNDARY), TileIndexing::Documented).unwrap();
    let tiles: Vec<TileId> = tiles.into_iter().collect();
    assert_eq!(tiles, vec![tile(25, 6), tile(26, 6)]);
}

#[test]
fn test_box_straddling_real_boundary() {
    let tiles = resolve_tiles(&bbox(fixtures::bbox::H24_H25_BOUNDARY), TileIndexing::default()).unwrap();
    let tiles: Vec<TileId> = tiles.into_iter().collect();
    assert_eq!(tiles, vec![tile(24, 6), tile(25, 6)]);
}

#[test]
fn test_delhi_in_real_h24v06() {
    let tiles = resolve_tiles(&bbox(fixtures::bbox::DELHI), TileIndexing::default()).unwrap();
    assert_eq!(tiles.into_iter().collect::<Vec<_>>(), vec![tile(24, 6)]);
}

#[test]
fn test_box_above_documented_range_fails() {
    let result = resolve_tiles(&bbox((10.0, 60.0, 11.0, 75.0)), TileIndexing::Documented);
    assert!(result.is_err());

    // The sinusoidal forward covers every latitude
    assert!(resolve_tiles(&bbox((10.0, 60.0, 11.0, 75.0)), TileIndexing::Sinusoidal).is_ok());
}

// ============================================================================
// Pixel georeferencing tests
// ============================================================================

#[test]
fn test_h18v09_corner_is_projection_origin() {
    let gt = tile_geotransform(tile(18, 9), 2, 2);
    let (x, y) = gt.apply(0.0, 0.0);
    assert_approx_eq!(x, 0.0, 0.01);
    assert_approx_eq!(y, 0.0, 0.01);

    let (lon, lat) = CrsTransformer::modis_sinusoidal().to_lon_lat(x, y).unwrap();
    assert_coords_approx_eq!((lon, lat), (0.0, 0.0), 1e-6);
}

#[test]
fn test_pixel_centers_fall_inside_tile() {
    let target = tile(24, 6);
    let gt = tile_geotransform(target, 4, 4);
    let (lons, lats) = CrsTransformer::modis_sinusoidal().grid_lon_lat(&gt, 4, 4);

    for (lon, lat) in lons.iter().zip(&lats) {
        let point = GeoPoint::new(*lat, *lon).unwrap();
        assert_eq!(point_to_tile(&point, TileIndexing::Sinusoidal).unwrap(), target);
    }
}
