//! Shared test utilities for the modis-ndvi workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Test data path helpers and skip macros for optional granules
//! - Synthetic NDVI band generators
//! - Catalog response and geometry fixtures
//! - Loopback HTTP servers for catalog and granule host tests
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Depends on no workspace crate, so any crate can take it as a dev-dependency.

pub mod fixtures;
pub mod generators;
pub mod paths;
pub mod server;

pub use fixtures::*;
pub use generators::*;
pub use paths::*;
pub use server::{refused_url, FakeServer};

/// Skip a test if the required file is not found.
///
/// Real MODIS granules are large and not checked in; tests that need one
/// print a skip message and return early when it is absent.
///
/// ```ignore
/// use test_utils::require_test_file;
///
/// #[test]
/// fn test_real_granule() {
///     let path = require_test_file!("MOD13Q1.A2023209.h24v06.061.2023226000000.hdf");
/// }
/// ```
#[macro_export]
macro_rules! require_test_file {
    ($name:expr) => {{
        match $crate::find_test_file($name) {
            Some(path) => path,
            None => {
                eprintln!(
                    "SKIPPED: Test file '{}' not found. Download test data or set TEST_DATA_DIR.",
                    $name
                );
                return;
            }
        }
    }};
}

/// Approximate floating-point equality.
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(0.4200001_f64, 0.42_f64, 1e-6); // passes
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if !(diff <= epsilon) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Approximate equality of (lon, lat) pairs.
#[macro_export]
macro_rules! assert_coords_approx_eq {
    (($x1:expr, $y1:expr), ($x2:expr, $y2:expr), $epsilon:expr) => {{
        $crate::assert_approx_eq!($x1, $x2, $epsilon);
        $crate::assert_approx_eq!($y1, $y2, $epsilon);
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(0.0, 0.0, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_rejects_nan() {
        assert_approx_eq!(f64::NAN, 1.0, 0.001);
    }

    #[test]
    fn test_assert_coords_approx_eq_passes() {
        assert_coords_approx_eq!((77.0001, 28.5001), (77.0, 28.5), 0.001);
    }
}
