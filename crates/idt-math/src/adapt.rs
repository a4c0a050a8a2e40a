//! Chromatic Adaptation Transforms (CAT).
//!
//! When the capture illuminant differs from the ACES reference white, the
//! estimated XYZ values have to be adapted before they can be encoded as
//! AP0 RGB. This module provides the Bradford transform used throughout the
//! solvers, plus the standard white points they adapt between.
//!
//! # Usage
//!
//! ```rust
//! use idt_math::{adapt_matrix, BRADFORD, D65, ACES_WHITE};
//!
//! let d65_to_aces = adapt_matrix(BRADFORD, D65, ACES_WHITE);
//! let adapted = d65_to_aces * D65;
//! assert!((adapted.x - ACES_WHITE.x).abs() < 1e-3);
//! ```

use crate::{Mat3, Vec3};

/// CIE Standard Illuminant D65 (daylight, ~6500K).
pub const D65: Vec3 = Vec3::new(0.95047, 1.0, 1.08883);

/// CIE Standard Illuminant D50 (horizon light, ~5000K).
pub const D50: Vec3 = Vec3::new(0.96422, 1.0, 0.82521);

/// CIE Standard Illuminant A (tungsten, ~2856K).
pub const A: Vec3 = Vec3::new(1.09850, 1.0, 0.35585);

/// ACES reference white point in XYZ (derived from the AP0 white
/// chromaticity (0.32168, 0.33767), normalized to Y = 1).
pub const ACES_WHITE: Vec3 =
    Vec3::new(0.952646074569846, 1.0, 1.00882518435159);

/// Bradford chromatic adaptation matrix.
///
/// Transforms XYZ to a "sharpened" cone response space.
///
/// # Reference
///
/// Lam, K.M. (1985). Metamerism and Colour Constancy.
pub const BRADFORD: Mat3 = Mat3::from_rows([
    [0.8951, 0.2664, -0.1614],
    [-0.7502, 1.7135, 0.0367],
    [0.0389, -0.0685, 1.0296],
]);

/// Computes a chromatic adaptation matrix between two white points.
///
/// The resulting matrix transforms XYZ values from the source illuminant
/// to the destination illuminant:
/// `CAT = B⁻¹ · diag(B·wd / B·ws) · B`.
///
/// # Arguments
///
/// * `method` - The cone response matrix to use (normally [`BRADFORD`])
/// * `src_white` - Source white point in XYZ
/// * `dst_white` - Destination white point in XYZ
pub fn adapt_matrix(method: Mat3, src_white: Vec3, dst_white: Vec3) -> Mat3 {
    let method_inv = method.inverse().unwrap_or(Mat3::IDENTITY);

    // Transform white points to cone space
    let src_cone = method * src_white;
    let dst_cone = method * dst_white;

    let scale = Mat3::diagonal(
        dst_cone.x / src_cone.x,
        dst_cone.y / src_cone.y,
        dst_cone.z / src_cone.z,
    );

    // Combine: M^-1 * S * M
    method_inv * scale * method
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapt_maps_source_white_to_destination() {
        let cat = adapt_matrix(BRADFORD, D65, ACES_WHITE);
        let result = cat * D65;
        assert!((result.x - ACES_WHITE.x).abs() < 1e-9);
        assert!((result.y - ACES_WHITE.y).abs() < 1e-9);
        assert!((result.z - ACES_WHITE.z).abs() < 1e-9);
    }

    #[test]
    fn test_adapt_identity() {
        let same = adapt_matrix(BRADFORD, D65, D65);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((same.m[i][j] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_adapt_roundtrip() {
        let fwd = adapt_matrix(BRADFORD, D65, D50);
        let back = adapt_matrix(BRADFORD, D50, D65);
        let roundtrip = back * fwd;

        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!(
                    (roundtrip.m[i][j] - expected).abs() < 1e-9,
                    "roundtrip[{}][{}] = {}",
                    i,
                    j,
                    roundtrip.m[i][j]
                );
            }
        }
    }

    #[test]
    fn test_illuminants_are_y_normalized() {
        assert_eq!(D65.y, 1.0);
        assert_eq!(D50.y, 1.0);
        assert_eq!(A.y, 1.0);
        assert_eq!(ACES_WHITE.y, 1.0);
    }
}
