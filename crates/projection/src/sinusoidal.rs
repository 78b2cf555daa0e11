//! Sinusoidal (Sanson-Flamsteed) projection on a sphere.
//!
//! The MODIS land grid uses this equal-area projection on a sphere of radius
//! 6371007.181 m, central meridian 0, no false easting or northing:
//!
//! - x = (λ - λ0) · R · cos φ
//! - y = φ · R
//!
//! The inverse is undefined where cos φ = 0 and produces longitudes outside
//! [-180, 180] for planar points beyond the projected globe outline, which
//! MODIS edge tiles contain.

/// Radius of the MODIS reference sphere in meters.
pub const MODIS_SPHERE_RADIUS: f64 = 6371007.181;

/// Sinusoidal projection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sinusoidal {
    /// Sphere radius (meters)
    pub radius: f64,
    /// Central meridian (degrees)
    pub central_meridian: f64,
    /// False easting (meters)
    pub false_easting: f64,
    /// False northing (meters)
    pub false_northing: f64,
}

impl Default for Sinusoidal {
    fn default() -> Self {
        Self::modis()
    }
}

impl Sinusoidal {
    /// The MODIS land grid projection.
    pub fn modis() -> Self {
        Self {
            radius: MODIS_SPHERE_RADIUS,
            central_meridian: 0.0,
            false_easting: 0.0,
            false_northing: 0.0,
        }
    }

    /// Project geographic degrees to planar meters.
    pub fn forward(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let lat = lat_deg.to_radians();
        let dlon = (lon_deg - self.central_meridian).to_radians();
        let x = dlon * self.radius * lat.cos() + self.false_easting;
        let y = lat * self.radius + self.false_northing;
        (x, y)
    }

    /// Unproject planar meters to geographic degrees (lon, lat).
    ///
    /// Returns `None` for points outside the projected globe.
    pub fn inverse(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let lat = (y - self.false_northing) / self.radius;
        if !lat.is_finite() || lat.abs() > std::f64::consts::FRAC_PI_2 {
            return None;
        }

        let cos_lat = lat.cos();
        if cos_lat.abs() < 1e-12 {
            // At the poles every x maps to the same point
            return Some((self.central_meridian, lat.to_degrees()));
        }

        let lon = self.central_meridian + ((x - self.false_easting) / (self.radius * cos_lat)).to_degrees();
        if !(-180.0..=180.0).contains(&lon) {
            return None;
        }

        Some((lon, lat.to_degrees()))
    }
}
