//! Tests for NDVI extraction through the in-memory reader.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use hdf_parser::{BandAttributes, CrsDefinition, Georeference, MemoryGranule, MemoryReader, RawBand};
use modis_common::{BoundingBox, ExtractError, LocalGranuleFile, Product, TileId};
use ndvi::{aggregate, NdviExtractor};
use test_utils::{assert_approx_eq, constant_ndvi_band, gradient_ndvi_band, with_fill_every, NDVI_FILL};

const NDVI_DESC: &str = "[4800x4800] 250m 16 days NDVI MODIS_Grid_16DAY_250m_500m_VI (16-bit integer)";

fn attributes(scale: f64) -> BandAttributes {
    BandAttributes {
        fill_value: Some(NDVI_FILL as f64),
        scale_factor: Some(scale),
        add_offset: Some(0.0),
    }
}

fn local_file(name: &str, h: i64, v: i64) -> LocalGranuleFile {
    LocalGranuleFile {
        path: PathBuf::from("/data/granules").join(name),
        tile: TileId::new(h, v).unwrap(),
        date: NaiveDate::from_ymd_opt(2023, 7, 28).unwrap(),
        downloaded: true,
    }
}

fn extractor_with(name: &str, granule: MemoryGranule) -> NdviExtractor {
    let reader = MemoryReader::new();
    reader.insert(name, granule);
    NdviExtractor::new(Arc::new(reader), Product::default())
}

// ============================================================================
// Band selection and decoding
// ============================================================================

#[test]
fn test_fill_value_becomes_no_data() {
    let band = RawBand::new(3, 1, vec![-3000, 5000, 7500]).with_attributes(attributes(0.0001));
    let extractor = extractor_with(
        "a.hdf",
        MemoryGranule::new().with_band("ndvi", NDVI_DESC, band),
    );

    let raster = extractor.extract(&local_file("a.hdf", 25, 6)).unwrap();
    let values = raster.values();
    assert!(values[0].is_nan());
    assert_eq!(values[1], 0.5);
    assert_eq!(values[2], 0.75);
    assert_eq!(raster.valid_count(), 2);
}

#[test]
fn test_ndvi_band_chosen_over_evi() {
    let extractor = extractor_with(
        "a.hdf",
        MemoryGranule::new()
            .with_band("evi", "[2x2] 250m 16 days EVI", RawBand::new(2, 2, vec![9999; 4]).with_attributes(attributes(10000.0)))
            .with_band("ndvi", NDVI_DESC, RawBand::new(2, 2, constant_ndvi_band(2, 2, 4200)).with_attributes(attributes(10000.0))),
    );

    let raster = extractor.extract(&local_file("a.hdf", 25, 6)).unwrap();
    assert!(raster.values().iter().all(|v| *v == 0.42));
}

#[test]
fn test_missing_subdataset() {
    let extractor = extractor_with(
        "a.hdf",
        MemoryGranule::new().with_band("evi", "250m 16 days EVI", RawBand::new(1, 1, vec![0])),
    );

    let result = extractor.extract(&local_file("a.hdf", 25, 6));
    match result {
        Err(ExtractError::SubdatasetNotFound { pattern, path }) => {
            assert_eq!(pattern, "250m 16 days NDVI");
            assert!(path.ends_with("a.hdf"));
        }
        other => panic!("expected SubdatasetNotFound, got {:?}", other),
    }
}

#[test]
fn test_unreadable_container() {
    let extractor = NdviExtractor::new(Arc::new(MemoryReader::new()), Product::default());
    let result = extractor.extract(&local_file("missing.hdf", 25, 6));
    assert!(matches!(result, Err(ExtractError::Unreadable(_))));
}

#[test]
fn test_band_size_mismatch() {
    let band = RawBand::new(3, 3, vec![0; 4]).with_attributes(attributes(10000.0));
    let extractor = extractor_with("a.hdf", MemoryGranule::new().with_band("ndvi", NDVI_DESC, band));
    assert!(matches!(
        extractor.extract(&local_file("a.hdf", 25, 6)),
        Err(ExtractError::Unreadable(_))
    ));
}

// ============================================================================
// Coordinates
// ============================================================================

#[test]
fn test_embedded_geographic_georef() {
    let band = RawBand::new(2, 2, constant_ndvi_band(2, 2, 5000))
        .with_attributes(attributes(10000.0))
        .with_georef(Georeference {
            geotransform: [77.0, 0.1, 0.0, 29.0, 0.0, -0.1],
            crs: CrsDefinition::Proj4("+proj=longlat +datum=WGS84 +no_defs".to_string()),
        });
    let extractor = extractor_with("a.hdf", MemoryGranule::new().with_band("ndvi", NDVI_DESC, band));

    let raster = extractor.extract(&local_file("a.hdf", 25, 6)).unwrap();
    let (lon, lat) = raster.location(0, 0).unwrap();
    assert_approx_eq!(lon, 77.05, 1e-12);
    assert_approx_eq!(lat, 28.95, 1e-12);
    let (lon, lat) = raster.location(1, 1).unwrap();
    assert_approx_eq!(lon, 77.15, 1e-12);
    assert_approx_eq!(lat, 28.85, 1e-12);
}

#[test]
fn test_embedded_unsupported_crs() {
    let band = RawBand::new(1, 1, vec![0])
        .with_attributes(attributes(10000.0))
        .with_georef(Georeference {
            geotransform: [0.0, 1.0, 0.0, 0.0, 0.0, -1.0],
            crs: CrsDefinition::Wkt("LOCAL_CS[\"engineering\"]".to_string()),
        });
    let extractor = extractor_with("a.hdf", MemoryGranule::new().with_band("ndvi", NDVI_DESC, band));
    assert!(matches!(
        extractor.extract(&local_file("a.hdf", 25, 6)),
        Err(ExtractError::MalformedAttributes(_))
    ));
}

#[test]
fn test_tile_grid_reconstruction() {
    // h25v06 spans x in [7783653, 8895604] and y in [2223901, 3335852]
    let band = RawBand::new(4, 4, gradient_ndvi_band(4, 4)).with_attributes(attributes(10000.0));
    let extractor = extractor_with("a.hdf", MemoryGranule::new().with_band("ndvi", NDVI_DESC, band));

    let raster = extractor.extract(&local_file("a.hdf", 25, 6)).unwrap();
    let (top_lon, top_lat) = raster.location(0, 0).unwrap();
    let (bottom_lon, bottom_lat) = raster.location(3, 3).unwrap();

    assert!(top_lat > bottom_lat);
    assert!(bottom_lon > top_lon);
    assert!((20.0..30.0).contains(&top_lat) && (20.0..30.0).contains(&bottom_lat));
    assert!((70.0..100.0).contains(&top_lon) && (70.0..100.0).contains(&bottom_lon));

    // First pixel center row: y = top - ph/2
    let expected_lat = (3335851.559 - 1111950.5196666666 / 8.0) / 6371007.181_f64;
    assert_approx_eq!(top_lat, expected_lat.to_degrees(), 1e-6);
}

#[test]
fn test_edge_tile_has_off_globe_pixels() {
    // h00v08's western half lies outside the projected globe
    let band = RawBand::new(4, 4, constant_ndvi_band(4, 4, 5000)).with_attributes(attributes(10000.0));
    let extractor = extractor_with("edge.hdf", MemoryGranule::new().with_band("ndvi", NDVI_DESC, band));

    let raster = extractor.extract(&local_file("edge.hdf", 0, 8)).unwrap();
    assert!(raster.longitudes().iter().any(|v| v.is_nan()));

    let world = BoundingBox::new(-180.0, -90.0, 180.0, 90.0).unwrap();
    let result = aggregate(&[raster.clone()], &world);
    assert!(result.valid_pixels < raster.len());
}

// ============================================================================
// Extract then aggregate
// ============================================================================

#[test]
fn test_extract_and_aggregate_whole_tile() {
    let raw = with_fill_every(gradient_ndvi_band(8, 8), 3);
    let expected = test_utils::expected_mean(&raw).unwrap();
    let band = RawBand::new(8, 8, raw).with_attributes(attributes(10000.0));
    let extractor = extractor_with("a.hdf", MemoryGranule::new().with_band("ndvi", NDVI_DESC, band));

    let raster = extractor.extract(&local_file("a.hdf", 25, 6)).unwrap();
    let tile_box = BoundingBox::new(60.0, 19.0, 100.0, 31.0).unwrap();
    let result = aggregate(&[raster], &tile_box);

    assert_approx_eq!(result.mean_ndvi.unwrap(), expected, 1e-12);
}

#[test]
fn test_reduce_matches_extract_then_aggregate() {
    let raw = with_fill_every(gradient_ndvi_band(8, 8), 4);
    let band = RawBand::new(8, 8, raw).with_attributes(attributes(10000.0));
    let extractor = extractor_with("a.hdf", MemoryGranule::new().with_band("ndvi", NDVI_DESC, band));
    let granule = local_file("a.hdf", 25, 6);

    // Cuts through the tile so only some pixels are in the box
    let partial = BoundingBox::new(82.0, 22.0, 95.0, 27.0).unwrap();
    let reduced = extractor.reduce(&granule, &partial).unwrap();
    let raster = extractor.extract(&granule).unwrap();

    assert_eq!(reduced.finish(), aggregate(&[raster], &partial));
    assert!(reduced.in_box_pixels() > 0 && reduced.in_box_pixels() < 64);
}

#[test]
fn test_reduce_skips_off_globe_pixels() {
    let band = RawBand::new(4, 4, constant_ndvi_band(4, 4, 5000)).with_attributes(attributes(10000.0));
    let extractor = extractor_with("edge.hdf", MemoryGranule::new().with_band("ndvi", NDVI_DESC, band));
    let granule = local_file("edge.hdf", 0, 8);

    let world = BoundingBox::new(-180.0, -90.0, 180.0, 90.0).unwrap();
    let reduced = extractor.reduce(&granule, &world).unwrap();
    let raster = extractor.extract(&granule).unwrap();

    assert_eq!(reduced.finish(), aggregate(&[raster], &world));
    assert!(reduced.valid_pixels() < 16);
}

#[test]
fn test_reduce_reports_band_errors() {
    let extractor = extractor_with(
        "a.hdf",
        MemoryGranule::new().with_band("evi", "[4800x4800] 250m 16 days EVI", RawBand::new(1, 1, vec![0])),
    );
    let bbox = BoundingBox::new(70.0, 20.0, 80.0, 30.0).unwrap();
    assert!(matches!(
        extractor.reduce(&local_file("a.hdf", 25, 6), &bbox),
        Err(ExtractError::SubdatasetNotFound { .. })
    ));
}
