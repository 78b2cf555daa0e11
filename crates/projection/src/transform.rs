//! Pixel georeferencing and CRS-to-WGS84 transformation.
//!
//! Axis order is longitude/x first, latitude/y second, everywhere.

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::error::{ProjectionError, ProjectionResult};
use crate::sinusoidal::Sinusoidal;

const WGS84_PROJ4: &str = "+proj=longlat +datum=WGS84 +no_defs";

/// GDAL-style affine transform from (column, row) to projected (x, y).
///
/// ```text
/// x = c0 + col·c1 + row·c2
/// y = c3 + col·c4 + row·c5
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform([f64; 6]);

impl AffineTransform {
    pub fn new(coefficients: [f64; 6]) -> Self {
        Self(coefficients)
    }

    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    /// Projected coordinate of a pixel's top-left edge.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let c = &self.0;
        (
            c[0] + col * c[1] + row * c[2],
            c[3] + col * c[4] + row * c[5],
        )
    }

    /// Projected coordinate of a pixel's center.
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.apply(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Whether the transform is usable (finite and non-degenerate).
    pub fn is_valid(&self) -> bool {
        let c = &self.0;
        c.iter().all(|v| v.is_finite()) && (c[1] * c[5] - c[2] * c[4]).abs() > 0.0
    }
}

/// Source CRS of a raster, resolved into a transform to WGS84 lon/lat.
pub enum CrsTransformer {
    /// Already geographic degrees.
    Geographic,
    /// Spherical sinusoidal, inverted directly.
    Sinusoidal(Sinusoidal),
    /// Anything else proj4rs understands.
    Proj4 { source: Box<Proj>, target: Box<Proj> },
}

impl std::fmt::Debug for CrsTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CrsTransformer::Geographic => write!(f, "Geographic"),
            CrsTransformer::Sinusoidal(s) => write!(f, "Sinusoidal({:?})", s),
            CrsTransformer::Proj4 { .. } => write!(f, "Proj4"),
        }
    }
}

impl CrsTransformer {
    /// The MODIS sinusoidal grid.
    pub fn modis_sinusoidal() -> Self {
        CrsTransformer::Sinusoidal(Sinusoidal::modis())
    }

    /// Build from a proj4 string or a WKT definition.
    pub fn from_definition(definition: &str) -> ProjectionResult<Self> {
        let trimmed = definition.trim();
        if trimmed.is_empty() {
            return Err(ProjectionError::UnsupportedCrs("empty definition".to_string()));
        }
        if trimmed.starts_with('+') {
            Self::from_proj4(trimmed)
        } else {
            Self::from_wkt(trimmed)
        }
    }

    /// Build from a proj4 string.
    pub fn from_proj4(definition: &str) -> ProjectionResult<Self> {
        let params = Proj4Params::parse(definition);

        match params.get("proj") {
            Some("longlat") | Some("latlong") => return Ok(CrsTransformer::Geographic),
            Some("sinu") => {
                if let Some(radius) = params.sphere_radius() {
                    return Ok(CrsTransformer::Sinusoidal(Sinusoidal {
                        radius,
                        central_meridian: params.number("lon_0").unwrap_or(0.0),
                        false_easting: params.number("x_0").unwrap_or(0.0),
                        false_northing: params.number("y_0").unwrap_or(0.0),
                    }));
                }
            }
            _ => {}
        }

        let source = Proj::from_proj_string(definition)
            .map_err(|e| ProjectionError::UnsupportedCrs(format!("{}: {:?}", definition, e)))?;
        let target = Proj::from_proj_string(WGS84_PROJ4)
            .map_err(|e| ProjectionError::UnsupportedCrs(format!("WGS84: {:?}", e)))?;

        Ok(CrsTransformer::Proj4 {
            source: Box::new(source),
            target: Box::new(target),
        })
    }

    /// Build from WKT. Only geographic and sinusoidal systems are recognised;
    /// readers that can export proj4 should prefer it.
    pub fn from_wkt(wkt: &str) -> ProjectionResult<Self> {
        let upper = wkt.to_ascii_uppercase();
        let projected = upper.starts_with("PROJCS") || upper.starts_with("PROJCRS");

        if !projected {
            if upper.starts_with("GEOGCS") || upper.starts_with("GEOGCRS") {
                return Ok(CrsTransformer::Geographic);
            }
            return Err(ProjectionError::UnsupportedCrs(truncate(wkt)));
        }

        if !upper.contains("SINUSOIDAL") {
            return Err(ProjectionError::UnsupportedCrs(truncate(wkt)));
        }

        let radius = wkt_semi_major(wkt)
            .ok_or_else(|| ProjectionError::UnsupportedCrs(format!("no spheroid in {}", truncate(wkt))))?;

        Ok(CrsTransformer::Sinusoidal(Sinusoidal {
            radius,
            central_meridian: wkt_parameter(
                wkt,
                &["longitude_of_center", "central_meridian", "longitude of natural origin"],
            )
            .unwrap_or(0.0),
            false_easting: wkt_parameter(wkt, &["false_easting"]).unwrap_or(0.0),
            false_northing: wkt_parameter(wkt, &["false_northing"]).unwrap_or(0.0),
        }))
    }

    /// Transform a projected coordinate to (lon, lat) degrees.
    ///
    /// Returns `None` when the point has no geographic counterpart.
    pub fn to_lon_lat(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        match self {
            CrsTransformer::Geographic => Some((x, y)),
            CrsTransformer::Sinusoidal(proj) => proj.inverse(x, y),
            CrsTransformer::Proj4 { source, target } => {
                let mut point = (x, y, 0.0);
                transform(source, target, &mut point).ok()?;
                let (lon, lat) = (point.0.to_degrees(), point.1.to_degrees());
                (lon.is_finite() && lat.is_finite()).then_some((lon, lat))
            }
        }
    }

    /// Pixel-center longitudes and latitudes for a whole grid, row-major.
    ///
    /// Pixels without a geographic counterpart get NaN coordinates.
    pub fn grid_lon_lat(
        &self,
        transform: &AffineTransform,
        width: usize,
        height: usize,
    ) -> (Vec<f64>, Vec<f64>) {
        let mut lons = Vec::with_capacity(width * height);
        let mut lats = Vec::with_capacity(width * height);

        for row in 0..height {
            for col in 0..width {
                let (x, y) = transform.pixel_center(col, row);
                let (lon, lat) = self.to_lon_lat(x, y).unwrap_or((f64::NAN, f64::NAN));
                lons.push(lon);
                lats.push(lat);
            }
        }

        (lons, lats)
    }
}

/// "+key=value" pairs of a proj4 string.
struct Proj4Params<'a>(Vec<(&'a str, Option<&'a str>)>);

impl<'a> Proj4Params<'a> {
    fn parse(definition: &'a str) -> Self {
        Self(
            definition
                .split_whitespace()
                .filter_map(|token| token.strip_prefix('+'))
                .map(|token| match token.split_once('=') {
                    Some((k, v)) => (k, Some(v)),
                    None => (token, None),
                })
                .collect(),
        )
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.0.iter().find(|(k, _)| *k == key).and_then(|(_, v)| *v)
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.get(key)?.parse().ok()
    }

    /// Radius when the definition describes a sphere.
    fn sphere_radius(&self) -> Option<f64> {
        if let Some(r) = self.number("R") {
            return Some(r);
        }
        let a = self.number("a")?;
        match self.number("b") {
            Some(b) if (a - b).abs() > 1e-6 => None,
            _ => Some(a),
        }
    }
}

/// First number following a case-insensitive quoted parameter name.
fn wkt_parameter(wkt: &str, names: &[&str]) -> Option<f64> {
    let lower = wkt.to_ascii_lowercase();
    names.iter().find_map(|name| {
        let needle = format!("\"{}\"", name);
        let start = lower.find(&needle)? + needle.len();
        first_number(&wkt[start..])
    })
}

/// Semi-major axis from a SPHEROID[...] or ELLIPSOID[...] node.
fn wkt_semi_major(wkt: &str) -> Option<f64> {
    let upper = wkt.to_ascii_uppercase();
    let node = upper.find("SPHEROID[").or_else(|| upper.find("ELLIPSOID["))?;
    let after_name = wkt[node..].find(',')? + node + 1;
    first_number(&wkt[after_name..])
}

fn first_number(s: &str) -> Option<f64> {
    let s = s.trim_start_matches(|c: char| c == ',' || c.is_whitespace());
    let end = s
        .find(|c: char| c == ',' || c == ']' || c.is_whitespace())
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

fn truncate(s: &str) -> String {
    s.chars().take(80).collect()
}
