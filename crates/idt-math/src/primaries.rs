//! Color primaries and RGB/XYZ matrix generation.
//!
//! A set of primaries is four xy chromaticity pairs (R, G, B, white point).
//! [`rgb_to_xyz_matrix`] turns them into the 3x3 matrix that carries RGB
//! into XYZ with the white point mapping to (1,1,1) in RGB.

use crate::{Mat3, Vec3};

/// Chromaticity coordinates of three primaries and a white point,
/// as xy pairs in [R, G, B, W] order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Chromaticities {
    /// Red primary xy.
    pub r: (f64, f64),
    /// Green primary xy.
    pub g: (f64, f64),
    /// Blue primary xy.
    pub b: (f64, f64),
    /// White point xy.
    pub w: (f64, f64),
}

/// ACES AP0 primaries (SMPTE ST 2065-1).
pub const ACES_AP0: Chromaticities = Chromaticities {
    r: (0.7347, 0.2653),
    g: (0.0, 1.0),
    b: (0.0001, -0.077),
    w: (0.32168, 0.33767),
};

/// Converts xy chromaticity to XYZ with Y = 1.
#[inline]
pub fn xy_to_xyz(x: f64, y: f64) -> Vec3 {
    Vec3::new(x / y, 1.0, (1.0 - x - y) / y)
}

/// Computes the RGB-to-XYZ matrix for the given primaries.
///
/// The columns are the primaries' XYZ coordinates, each scaled so the
/// white point maps to RGB (1, 1, 1).
///
/// # Example
///
/// ```rust
/// use idt_math::{rgb_to_xyz_matrix, xy_to_xyz, Vec3, ACES_AP0};
///
/// let m = rgb_to_xyz_matrix(&ACES_AP0);
/// let white = m * Vec3::ONE;
/// let expected = xy_to_xyz(0.32168, 0.33767);
/// assert!((white.x - expected.x).abs() < 1e-9);
/// ```
pub fn rgb_to_xyz_matrix(primaries: &Chromaticities) -> Mat3 {
    let r_xyz = xy_to_xyz(primaries.r.0, primaries.r.1);
    let g_xyz = xy_to_xyz(primaries.g.0, primaries.g.1);
    let b_xyz = xy_to_xyz(primaries.b.0, primaries.b.1);
    let mut w_xyz = xy_to_xyz(primaries.w.0, primaries.w.1);

    // Build matrix from primaries as columns
    let m = Mat3::from_col_vecs(r_xyz, g_xyz, b_xyz);

    w_xyz = w_xyz / w_xyz.y;

    // Solve for per-channel gains: M * S = W
    let m_inv = m.inverse().unwrap_or(Mat3::IDENTITY);
    let s = m_inv * w_xyz;

    Mat3::from_col_vecs(r_xyz * s.x, g_xyz * s.y, b_xyz * s.z)
}
