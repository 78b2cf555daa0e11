//! Synthetic MODIS-like NDVI bands.
//!
//! Values are raw stored integers (scaled by 10000) in row-major order,
//! the way an HDF-EOS band hands them to a reader.

/// Nominal MOD13Q1 fill value.
pub const NDVI_FILL: i32 = -3000;

/// A band where every sample has the same raw value.
pub fn constant_ndvi_band(width: usize, height: usize, raw: i32) -> Vec<i32> {
    vec![raw; width * height]
}

/// A band that ramps from 0.0 in the first column to 0.9 in the last.
///
/// ```
/// use test_utils::gradient_ndvi_band;
///
/// let band = gradient_ndvi_band(10, 2);
/// assert_eq!(band[0], 0);
/// assert_eq!(band[9], 9000);
/// assert_eq!(band[10], 0); // second row restarts
/// ```
pub fn gradient_ndvi_band(width: usize, height: usize) -> Vec<i32> {
    let step = if width > 1 { 9000 / (width as i32 - 1) } else { 0 };
    let mut data = Vec::with_capacity(width * height);
    for _row in 0..height {
        for col in 0..width {
            data.push(col as i32 * step);
        }
    }
    data
}

/// Replace every `every`-th sample (starting at index 0) with the fill value.
pub fn with_fill_every(mut band: Vec<i32>, every: usize) -> Vec<i32> {
    if every == 0 {
        return band;
    }
    for value in band.iter_mut().step_by(every) {
        *value = NDVI_FILL;
    }
    band
}

/// Mean of the non-fill samples of a raw band, scaled to NDVI.
pub fn expected_mean(band: &[i32]) -> Option<f64> {
    let valid: Vec<f64> = band
        .iter()
        .filter(|v| **v != NDVI_FILL)
        .map(|v| *v as f64 / 10000.0)
        .collect();
    if valid.is_empty() {
        None
    } else {
        Some(valid.iter().sum::<f64>() / valid.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_band() {
        let band = constant_ndvi_band(3, 2, 4200);
        assert_eq!(band.len(), 6);
        assert!(band.iter().all(|v| *v == 4200));
    }

    #[test]
    fn test_fill_every() {
        let band = with_fill_every(constant_ndvi_band(4, 1, 5000), 2);
        assert_eq!(band, vec![NDVI_FILL, 5000, NDVI_FILL, 5000]);
        assert_eq!(expected_mean(&band), Some(0.5));
    }

    #[test]
    fn test_expected_mean_all_fill() {
        assert_eq!(expected_mean(&constant_ndvi_band(2, 2, NDVI_FILL)), None);
    }
}
