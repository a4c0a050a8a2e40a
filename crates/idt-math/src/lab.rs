//! CIE L\*a\*b\* conversion.
//!
//! The spectral IDT fit minimizes residuals in L\*a\*b\* because it is
//! approximately perceptually uniform, so errors in dark and bright patches
//! are weighted comparably.

use crate::Vec3;

// CIE standard constants: epsilon = (6/29)^3, kappa = (29/3)^3 / 27.
const EPSILON: f64 = 216.0 / 24389.0;
const KAPPA: f64 = 24389.0 / 27.0;

#[inline]
fn lab_f(t: f64) -> f64 {
    if t > EPSILON {
        t.cbrt()
    } else {
        (KAPPA * t + 16.0) / 116.0
    }
}

/// Converts XYZ to L\*a\*b\* relative to the given reference white.
///
/// # Example
///
/// ```rust
/// use idt_math::{xyz_to_lab, Vec3, ACES_WHITE};
///
/// // The reference white itself maps to L* = 100, a* = b* = 0.
/// let lab = xyz_to_lab(ACES_WHITE, ACES_WHITE);
/// assert!((lab.x - 100.0).abs() < 1e-9);
/// assert!(lab.y.abs() < 1e-9);
/// assert!(lab.z.abs() < 1e-9);
/// ```
pub fn xyz_to_lab(xyz: Vec3, white: Vec3) -> Vec3 {
    let fx = lab_f(xyz.x / white.x);
    let fy = lab_f(xyz.y / white.y);
    let fz = lab_f(xyz.z / white.z);

    Vec3::new(
        116.0 * fy - 16.0,
        500.0 * (fx - fy),
        200.0 * (fy - fz),
    )
}
