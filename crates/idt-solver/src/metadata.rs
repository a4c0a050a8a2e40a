//! DNG metadata-based input transform solver.
//!
//! When no spectral data is available for a camera, its DNG calibration
//! tags still describe two XYZ-to-camera matrices measured under two known
//! illuminants. This solver recovers the capture illuminant by iterating
//! in mired space, interpolates between the calibration matrices, and
//! assembles the chromatic adaptation and input device transforms.

use idt_math::{
    adapt_matrix, clamp, rgb_to_xyz_matrix, uv_to_xyz, xyz_to_uv, Mat3,
    Vec3, ACES_AP0, ACES_WHITE, BRADFORD, D65,
};

use crate::{SolverError, SolverResult};

/// One DNG calibration: an illuminant tag and the matrices measured
/// under it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Calibration {
    /// EXIF light-source tag of the calibration illuminant.
    pub illuminant: u16,
    /// XYZ-to-camera-RGB color matrix.
    pub xyz_to_rgb: Mat3,
    /// Per-unit camera calibration matrix. Stored but not currently used
    /// in the computation.
    pub camera_calibration: Mat3,
}

/// The DNG metadata snapshot the solver works from.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Baseline exposure in stops.
    pub baseline_exposure: f64,
    /// Neutral RGB (reciprocal as-shot multipliers), if known.
    pub neutral_rgb: Option<Vec3>,
    /// The two calibration records.
    pub calibration: [Calibration; 2],
}

/// Computes CAT and IDT matrices from a borrowed [`Metadata`] snapshot.
pub struct MetadataSolver<'a> {
    metadata: &'a Metadata,
}

/// Converts correlated color temperature (Kelvin) to mired.
#[inline]
pub fn cct_to_mired(cct: f64) -> f64 {
    1.0e6 / cct
}

/// Converts mired to correlated color temperature (Kelvin).
#[inline]
pub fn mired_to_cct(mired: f64) -> f64 {
    1.0e6 / mired
}

/// Maps an EXIF light-source tag to a correlated color temperature.
///
/// Tags of 32768 and above encode the temperature directly (tag - 32768);
/// the remaining standard tags map through a fixed table, defaulting to
/// 5500 K for unknown values.
pub fn light_source_to_cct(tag: u16) -> f64 {
    if tag >= 32768 {
        return f64::from(tag) - 32768.0;
    }

    match tag {
        0 | 1 | 20 => 5500.0,
        2 => 3500.0,
        3 => 3400.0,
        10 => 5550.0,
        17 => 2856.0,
        18 => 4874.0,
        19 => 6774.0,
        21 => 6500.0,
        22 => 7500.0,
        _ => 5500.0,
    }
}

/// Robertson iso-temperature lines: (u, v, slope) per row.
///
/// Wyszecki & Stiles, 2nd ed.; the u value of the mired-325 row carries
/// the published erratum correction.
const ROBERTSON_UVT: [[f64; 3]; 31] = [
    [0.18006, 0.26352, -0.24341],
    [0.18066, 0.26589, -0.25479],
    [0.18133, 0.26846, -0.26876],
    [0.18208, 0.27119, -0.28539],
    [0.18293, 0.27407, -0.30470],
    [0.18388, 0.27709, -0.32675],
    [0.18494, 0.28021, -0.35156],
    [0.18611, 0.28342, -0.37915],
    [0.18740, 0.28668, -0.40955],
    [0.18880, 0.28997, -0.44278],
    [0.19032, 0.29326, -0.47888],
    [0.19462, 0.30141, -0.58204],
    [0.19962, 0.30921, -0.70471],
    [0.20525, 0.31647, -0.84901],
    [0.21142, 0.32312, -1.0182],
    [0.21807, 0.32909, -1.2168],
    [0.22511, 0.33439, -1.4512],
    [0.23247, 0.33904, -1.7298],
    [0.24010, 0.34308, -2.0637],
    [0.24792, 0.34655, -2.4681],
    [0.25591, 0.34951, -2.9641],
    [0.26400, 0.35200, -3.5814],
    [0.27218, 0.35407, -4.3633],
    [0.28039, 0.35577, -5.3762],
    [0.28863, 0.35714, -6.7262],
    [0.29685, 0.35823, -8.5955],
    [0.30505, 0.35907, -11.324],
    [0.31320, 0.35968, -15.628],
    [0.32129, 0.36011, -23.325],
    [0.32931, 0.36038, -40.770],
    [0.33724, 0.36051, -116.45],
];

/// Mired ladder matching [`ROBERTSON_UVT`] row for row.
const ROBERTSON_MIRED: [f64; 31] = [
    0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0, 100.0,
    125.0, 150.0, 175.0, 200.0, 225.0, 250.0, 275.0, 300.0, 325.0, 350.0,
    375.0, 400.0, 425.0, 450.0, 475.0, 500.0, 525.0, 550.0, 575.0, 600.0,
];

/// Signed distance from a chromaticity to a Robertson iso-temperature
/// line, as a 2D cross product against the line's unit slope.
fn robertson_length(uv: (f64, f64), uvt: [f64; 3]) -> f64 {
    let t = uvt[2];
    let sign = if t < 0.0 {
        -1.0
    } else if t > 0.0 {
        1.0
    } else {
        0.0
    };
    let slope_u = -sign / (1.0 + t * t).sqrt();
    let slope_v = t * slope_u;

    let du = uv.0 - uvt[0];
    let dv = uv.1 - uvt[1];
    slope_u * dv - slope_v * du
}

/// Estimates the correlated color temperature of an XYZ value by the
/// Robertson method, clamped to [2000, 50000] Kelvin.
pub fn xyz_to_cct(xyz: Vec3) -> f64 {
    let uv = xyz_to_uv(xyz);

    let mut distance_this = 0.0;
    let mut distance_prev = 0.0;
    let mut index = ROBERTSON_UVT.len();

    for (i, row) in ROBERTSON_UVT.iter().enumerate() {
        distance_this = robertson_length(uv, *row);
        if distance_this <= 0.0 {
            index = i;
            break;
        }
        distance_prev = distance_this;
    }

    let mired = if index == 0 {
        ROBERTSON_MIRED[0]
    } else if index >= ROBERTSON_UVT.len() {
        ROBERTSON_MIRED[ROBERTSON_MIRED.len() - 1]
    } else {
        ROBERTSON_MIRED[index - 1]
            + distance_prev * (ROBERTSON_MIRED[index] - ROBERTSON_MIRED[index - 1])
                / (distance_prev - distance_this)
    };

    clamp(mired_to_cct(mired), 2000.0, 50000.0)
}

/// Estimates the XYZ (Y = 1) of a blackbody-locus illuminant at the given
/// correlated color temperature, by blending the straddling Robertson rows
/// in mired space.
pub fn cct_to_xyz(cct: f64) -> Vec3 {
    let mired = cct_to_mired(cct);

    let index = ROBERTSON_MIRED
        .iter()
        .position(|&m| m >= mired)
        .unwrap_or(ROBERTSON_MIRED.len());

    let (u, v) = if index == 0 {
        (ROBERTSON_UVT[0][0], ROBERTSON_UVT[0][1])
    } else if index >= ROBERTSON_UVT.len() {
        let last = &ROBERTSON_UVT[ROBERTSON_UVT.len() - 1];
        (last[0], last[1])
    } else {
        let weight = (mired - ROBERTSON_MIRED[index - 1])
            / (ROBERTSON_MIRED[index] - ROBERTSON_MIRED[index - 1]);
        let low = &ROBERTSON_UVT[index - 1];
        let high = &ROBERTSON_UVT[index];
        (
            idt_math::lerp(low[0], high[0], weight),
            idt_math::lerp(low[1], high[1], weight),
        )
    };

    uv_to_xyz(u, v)
}

/// Element-wise linear interpolation between two matrices.
fn lerp_matrix(start: &Mat3, end: &Mat3, t: f64) -> Mat3 {
    let mut out = Mat3::ZERO;
    for i in 0..3 {
        for j in 0..3 {
            out.m[i][j] = idt_math::lerp(start.m[i][j], end.m[i][j], t);
        }
    }
    out
}

/// Blends the two calibration matrices for a target mired, clamping the
/// interpolation weight to [0, 1].
fn weighted_matrix(
    mired_target: f64,
    mired_start: f64,
    mired_end: f64,
    matrix_start: &Mat3,
    matrix_end: &Mat3,
) -> Mat3 {
    let weight = clamp(
        (mired_start - mired_target) / (mired_start - mired_end),
        0.0,
        1.0,
    );
    lerp_matrix(matrix_start, matrix_end, weight)
}

/// Recovers the XYZ-to-camera matrix for the capture illuminant.
///
/// Walks candidate mireds across the calibration range; each candidate's
/// blended matrix implies a white point whose temperature should agree
/// with the candidate. The root of that error (sign-change secant, or the
/// smallest-error sample when no sign change occurs) selects the blend.
///
/// Degenerate inputs (first calibration tag zero, or no neutral RGB) fall
/// back to the first calibration matrix with a warning.
fn find_xyz_to_camera_matrix(metadata: &Metadata) -> SolverResult<Mat3> {
    if metadata.calibration[0].illuminant == 0 {
        tracing::warn!(
            "no calibration illuminants found; using the first \
             calibration matrix"
        );
        return Ok(metadata.calibration[0].xyz_to_rgb);
    }

    let Some(neutral_rgb) = metadata.neutral_rgb else {
        tracing::warn!(
            "no neutral RGB values found; using the first calibration matrix"
        );
        return Ok(metadata.calibration[0].xyz_to_rgb);
    };

    let cct1 = light_source_to_cct(metadata.calibration[0].illuminant);
    let cct2 = light_source_to_cct(metadata.calibration[1].illuminant);

    let mir1 = cct_to_mired(cct1);
    let mir2 = cct_to_mired(cct2);

    let min_mired = cct_to_mired(50000.0);
    let max_mired = cct_to_mired(2000.0);

    let matrix_start = &metadata.calibration[0].xyz_to_rgb;
    let matrix_end = &metadata.calibration[1].xyz_to_rgb;

    let low_mired = clamp(mir1.min(mir2), min_mired, max_mired);
    let high_mired = clamp(mir1.max(mir2), min_mired, max_mired);
    let mired_step = 5.0_f64.max((high_mired - low_mired) / 50.0);

    let mut estimated_mired = 0.0;
    let mut last_mired = 0.0;
    let mut last_error = 0.0;
    let mut smallest_error: f64 = 0.0;

    let mut current_mired = low_mired;
    while current_mired < high_mired {
        let blended = weighted_matrix(
            current_mired,
            mir1,
            mir2,
            matrix_start,
            matrix_end,
        );
        let inverse = blended.inverse().ok_or_else(|| {
            SolverError::Numeric {
                reason: format!(
                    "singular blended calibration matrix at mired \
                     {current_mired}"
                ),
            }
        })?;

        let implied_cct = xyz_to_cct(inverse * neutral_rgb);
        let current_error = current_mired - cct_to_mired(implied_cct);

        if current_error.abs() <= 1e-9 {
            estimated_mired = current_mired;
            break;
        }
        if (current_mired - low_mired).abs() > 1e-9
            && current_error * last_error <= 0.0
        {
            // Sign change: secant-interpolate the root.
            estimated_mired = current_mired
                + current_error / (current_error - last_error)
                    * (current_mired - last_mired);
            break;
        }
        if (current_mired - low_mired).abs() <= 1e-9
            || current_error.abs() < smallest_error.abs()
        {
            estimated_mired = current_mired;
            smallest_error = current_error;
        }

        last_error = current_error;
        last_mired = current_mired;
        current_mired += mired_step;
    }

    Ok(weighted_matrix(
        estimated_mired,
        mir1,
        mir2,
        matrix_start,
        matrix_end,
    ))
}

/// The camera-to-XYZ matrix (baseline exposure applied) and the camera's
/// XYZ white point, normalized to Y = 1.
fn camera_xyz_matrix_and_white_point(
    metadata: &Metadata,
) -> SolverResult<(Mat3, Vec3)> {
    let xyz_to_camera = find_xyz_to_camera_matrix(metadata)?;
    let camera_to_xyz = xyz_to_camera
        .inverse()
        .ok_or_else(|| SolverError::Numeric {
            reason: "singular XYZ-to-camera matrix".to_string(),
        })?
        * 2.0_f64.powf(metadata.baseline_exposure);

    let white_point = match metadata.neutral_rgb {
        Some(neutral_rgb) => camera_to_xyz * neutral_rgb,
        None => cct_to_xyz(light_source_to_cct(
            metadata.calibration[0].illuminant,
        )),
    };

    if white_point.y.abs() < 1e-12 {
        return Err(SolverError::Numeric {
            reason: "camera white point has zero luminance".to_string(),
        });
    }
    let white_point = white_point / white_point.y;
    if white_point.sum().abs() < 1e-9 {
        return Err(SolverError::Numeric {
            reason: "degenerate camera white point".to_string(),
        });
    }

    Ok((camera_to_xyz, white_point))
}

/// The fixed XYZ(D65)-to-AP0 encoding matrix: adaptation from D65 to the
/// ACES white point followed by the inverse of the AP0 primaries.
pub fn xyz_d65_to_aces_matrix() -> Mat3 {
    let aces_rgb_to_xyz = rgb_to_xyz_matrix(&ACES_AP0);
    let xyz_to_aces = aces_rgb_to_xyz
        .inverse()
        .unwrap_or(Mat3::IDENTITY);
    xyz_to_aces * adapt_matrix(BRADFORD, D65, ACES_WHITE)
}

/// The fixed CAT from D65 to the ACES white point, used when matrixing is
/// delegated to the external raw processor.
pub fn cat_d65_to_aces() -> Mat3 {
    adapt_matrix(BRADFORD, D65, ACES_WHITE)
}

impl<'a> MetadataSolver<'a> {
    /// Creates a solver borrowing the given metadata snapshot.
    pub fn new(metadata: &'a Metadata) -> Self {
        Self { metadata }
    }

    /// Chromatic adaptation from the camera's estimated white point to the
    /// ACES white point.
    pub fn calculate_cat_matrix(&self) -> SolverResult<Mat3> {
        let (_, camera_white_point) =
            camera_xyz_matrix_and_white_point(self.metadata)?;

        let output_rgb_to_xyz = rgb_to_xyz_matrix(&ACES_AP0);
        let output_white_point = output_rgb_to_xyz * Vec3::ONE;

        Ok(adapt_matrix(BRADFORD, camera_white_point, output_white_point))
    }

    /// The DNG input device transform: the fixed XYZ(D65)-to-AP0 matrix
    /// composed with the camera's adaptation.
    pub fn calculate_idt_matrix(&self) -> SolverResult<Mat3> {
        let cat_matrix = self.calculate_cat_matrix()?;
        let idt_matrix = xyz_d65_to_aces_matrix() * cat_matrix;

        if idt_matrix.element_sum().abs() < 1e-9 {
            return Err(SolverError::Numeric {
                reason: "degenerate DNG input transform".to_string(),
            });
        }
        Ok(idt_matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mired_roundtrip() {
        for exponent in -2..4 {
            let mired = 10.0_f64.powi(exponent) * 3.7;
            let roundtrip = cct_to_mired(mired_to_cct(mired));
            assert!((roundtrip - mired).abs() < 1e-9);
        }
    }

    #[test]
    fn test_light_source_map() {
        assert_eq!(light_source_to_cct(17), 2856.0);
        assert_eq!(light_source_to_cct(21), 6500.0);
        assert_eq!(light_source_to_cct(99), 5500.0);
        assert_eq!(light_source_to_cct(32768 + 4200), 4200.0);
    }

    #[test]
    fn test_cct_roundtrip_at_table_rows() {
        // Exact table rows reproduce their mired through the estimator.
        for &mired in &[100.0, 250.0, 400.0] {
            let xyz = cct_to_xyz(mired_to_cct(mired));
            let cct = xyz_to_cct(xyz);
            assert!(
                (cct_to_mired(cct) - mired).abs() < 1e-6,
                "mired {mired} round-tripped to {}",
                cct_to_mired(cct)
            );
        }
    }

    #[test]
    fn test_cct_clamped() {
        // A deep-blue chromaticity implies an extreme temperature; the
        // estimate must stay within the supported range.
        let cct = xyz_to_cct(Vec3::new(0.2, 0.2, 1.5));
        assert!((2000.0..=50000.0).contains(&cct));

        let warm = xyz_to_cct(Vec3::new(1.8, 1.0, 0.1));
        assert!((2000.0..=50000.0).contains(&warm));
    }

    #[test]
    fn test_d65_cct_estimate() {
        let cct = xyz_to_cct(D65);
        assert!((cct - 6500.0).abs() < 50.0, "D65 estimated as {cct} K");
    }

    #[test]
    fn test_degenerate_calibration_falls_back() {
        let metadata = Metadata {
            baseline_exposure: 0.0,
            neutral_rgb: Some(Vec3::ONE),
            calibration: [
                Calibration {
                    illuminant: 0,
                    xyz_to_rgb: Mat3::diagonal(2.0, 2.0, 2.0),
                    camera_calibration: Mat3::IDENTITY,
                },
                Calibration::default(),
            ],
        };
        let matrix = find_xyz_to_camera_matrix(&metadata).unwrap();
        assert_eq!(matrix, Mat3::diagonal(2.0, 2.0, 2.0));
    }

    #[test]
    fn test_missing_neutral_falls_back() {
        let metadata = Metadata {
            baseline_exposure: 0.0,
            neutral_rgb: None,
            calibration: [
                Calibration {
                    illuminant: 17,
                    xyz_to_rgb: Mat3::diagonal(3.0, 3.0, 3.0),
                    camera_calibration: Mat3::IDENTITY,
                },
                Calibration {
                    illuminant: 21,
                    xyz_to_rgb: Mat3::IDENTITY,
                    camera_calibration: Mat3::IDENTITY,
                },
            ],
        };
        let matrix = find_xyz_to_camera_matrix(&metadata).unwrap();
        assert_eq!(matrix, Mat3::diagonal(3.0, 3.0, 3.0));
    }

    #[test]
    fn test_interpolation_recovers_midpoint() {
        // Calibrations pinned to Robertson rows: 2500 K (400 mired) and
        // 5000 K (200 mired). A neutral taken from the 300-mired row sits
        // exactly midway, so the blend must be the element-wise midpoint.
        let metadata = Metadata {
            baseline_exposure: 0.0,
            neutral_rgb: Some(cct_to_xyz(mired_to_cct(300.0))),
            calibration: [
                Calibration {
                    illuminant: 32768 + 2500,
                    xyz_to_rgb: Mat3::IDENTITY,
                    camera_calibration: Mat3::IDENTITY,
                },
                Calibration {
                    illuminant: 32768 + 5000,
                    xyz_to_rgb: Mat3::diagonal(2.0, 2.0, 2.0),
                    camera_calibration: Mat3::IDENTITY,
                },
            ],
        };

        let matrix = find_xyz_to_camera_matrix(&metadata).unwrap();
        let expected = Mat3::diagonal(1.5, 1.5, 1.5);
        for i in 0..3 {
            for j in 0..3 {
                assert!(
                    (matrix.m[i][j] - expected.m[i][j]).abs() < 1e-6,
                    "matrix[{i}][{j}] = {}",
                    matrix.m[i][j]
                );
            }
        }
    }

    #[test]
    fn test_dng_idt_rows_are_finite() {
        let metadata = Metadata {
            baseline_exposure: 0.5,
            neutral_rgb: Some(Vec3::new(0.6, 1.0, 0.8)),
            calibration: [
                Calibration {
                    illuminant: 17,
                    xyz_to_rgb: Mat3::from_rows([
                        [0.9, 0.05, 0.05],
                        [0.1, 0.8, 0.1],
                        [0.05, 0.1, 0.85],
                    ]),
                    camera_calibration: Mat3::IDENTITY,
                },
                Calibration {
                    illuminant: 21,
                    xyz_to_rgb: Mat3::from_rows([
                        [1.0, 0.02, -0.02],
                        [0.05, 0.9, 0.05],
                        [0.0, 0.05, 0.95],
                    ]),
                    camera_calibration: Mat3::IDENTITY,
                },
            ],
        };

        let solver = MetadataSolver::new(&metadata);
        let idt = solver.calculate_idt_matrix().unwrap();
        assert!(idt.is_finite());
        assert!(idt.element_sum().abs() > 1e-9);

        let cat = solver.calculate_cat_matrix().unwrap();
        assert!(cat.is_finite());
    }

    #[test]
    fn test_xyz_d65_to_aces_is_stable() {
        let m = xyz_d65_to_aces_matrix();
        // D65 white must land on ACES unit RGB.
        let white = m * D65;
        assert!((white.x - 1.0).abs() < 1e-9);
        assert!((white.y - 1.0).abs() < 1e-9);
        assert!((white.z - 1.0).abs() < 1e-9);
    }
}
