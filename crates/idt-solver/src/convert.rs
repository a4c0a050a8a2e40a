//! Method orchestration: which solver runs, with which inputs.
//!
//! The converter owns the user-facing [`Settings`] (white-balance and
//! matrix method selectors, database locations, overrides) and turns a
//! [`RawMetadata`] snapshot from the external raw reader into a
//! [`ColorTransform`]: white-balance multipliers, an optional IDT matrix
//! and an optional CAT matrix. No pixels flow through here.

use std::path::PathBuf;

use idt_math::{Mat3, Vec3};
use idt_spectral::{DataCatalog, SpectralData};

use crate::metadata::{cat_d65_to_aces, Calibration, Metadata, MetadataSolver};
use crate::spectral::SpectralSolver;
use crate::{SolverError, SolverResult};

/// Database path of the training reflectances used for the spectral fit.
const TRAINING_PATH: &str = "training/training_spectral.json";

/// Database path of the standard observer color matching functions.
const OBSERVER_PATH: &str = "cmf/cmf_1931.json";

/// How white balance is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WbMethod {
    /// Use the as-shot multipliers from the raw metadata.
    #[default]
    Metadata,
    /// White-balance to the illuminant named in [`Settings::illuminant`].
    Illuminant,
    /// Average a gray-box region; handled by the external raw reader.
    Box,
    /// Use the user-supplied multipliers.
    Custom,
}

/// How the color matrix is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatrixMethod {
    /// Spectral if camera data resolves in the database, else metadata.
    #[default]
    Auto,
    /// Solve from camera spectral sensitivities.
    Spectral,
    /// Solve from DNG calibration metadata.
    Metadata,
    /// Delegate to the raw reader's built-in (Adobe) matrices.
    Adobe,
    /// Use the user-supplied matrix.
    Custom,
}

/// User-facing conversion settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Spectral database search directories, in priority order.
    pub database_directories: Vec<PathBuf>,
    /// White-balance method selector.
    pub wb_method: WbMethod,
    /// Matrix method selector.
    pub matrix_method: MatrixMethod,
    /// Illuminant type token for [`WbMethod::Illuminant`] (e.g. "D55",
    /// "3200K"); empty means auto-detect from the white-balance
    /// multipliers.
    pub illuminant: String,
    /// Multipliers for [`WbMethod::Custom`].
    pub custom_wb: [f64; 4],
    /// Matrix for [`MatrixMethod::Custom`].
    pub custom_matrix: Mat3,
    /// Camera make override; empty uses the raw metadata.
    pub custom_camera_make: String,
    /// Camera model override; empty uses the raw metadata.
    pub custom_camera_model: String,
    /// Diagnostic output level; higher is chattier.
    pub verbosity: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_directories: Vec::new(),
            wb_method: WbMethod::default(),
            matrix_method: MatrixMethod::default(),
            illuminant: String::new(),
            custom_wb: [1.0; 4],
            custom_matrix: Mat3::IDENTITY,
            custom_camera_make: String::new(),
            custom_camera_model: String::new(),
            verbosity: 0,
        }
    }
}

/// The metadata snapshot the external raw reader provides.
#[derive(Debug, Clone, Default)]
pub struct RawMetadata {
    /// Camera manufacturer, as reported by the file.
    pub camera_make: String,
    /// Camera model, as reported by the file.
    pub camera_model: String,
    /// Pre-white-balance multipliers (RGBG).
    pub pre_mul: [f64; 4],
    /// As-shot camera multipliers (RGBG).
    pub cam_mul: [f64; 4],
    /// DNG baseline exposure, stops.
    pub baseline_exposure: f64,
    /// True when the file is a DNG (non-zero DNG version tag).
    pub is_dng: bool,
    /// DNG calibration illuminant tags 1 and 2.
    pub calibration_illuminant: [u16; 2],
    /// DNG color matrices 1 and 2, row-major XYZ-to-RGB.
    pub color_matrix: [Option<[f64; 9]>; 2],
    /// DNG camera calibration matrices 1 and 2 (4x4, row-major); the
    /// top-left 3x3 is kept. Stored but not used in the computation.
    pub camera_calibration: [Option<[f64; 16]>; 2],
}

/// The computed color transform.
///
/// `wb_multipliers` has 3 or 4 entries depending on the path (a 4th entry
/// duplicates the second green), or stays empty when white balance is
/// delegated to the external raw reader. `idt_matrix` is `None` when
/// matrixing is delegated; `cat_matrix` is `None` when adaptation is
/// subsumed into the IDT.
#[derive(Debug, Clone, Default)]
pub struct ColorTransform {
    /// White-balance multipliers.
    pub wb_multipliers: Vec<f64>,
    /// Input device transform to ACES AP0, if computed.
    pub idt_matrix: Option<Mat3>,
    /// Chromatic adaptation transform, if computed.
    pub cat_matrix: Option<Mat3>,
}

/// Camera identity after merging user overrides over file metadata.
#[derive(Debug, Clone)]
struct CameraIdentifier {
    make: String,
    model: String,
}

impl CameraIdentifier {
    fn is_empty(&self) -> bool {
        self.make.is_empty() || self.model.is_empty()
    }
}

impl std::fmt::Display for CameraIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.make, self.model)
    }
}

/// Orchestrates the solvers according to [`Settings`].
#[derive(Debug, Clone, Default)]
pub struct Converter {
    /// The conversion settings in effect.
    pub settings: Settings,
}

impl Converter {
    /// Creates a converter with the given settings.
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    fn camera_identifier(&self, metadata: &RawMetadata) -> CameraIdentifier {
        let make = if self.settings.custom_camera_make.is_empty() {
            metadata.camera_make.clone()
        } else {
            self.settings.custom_camera_make.clone()
        };
        let model = if self.settings.custom_camera_model.is_empty() {
            metadata.camera_model.clone()
        } else {
            self.settings.custom_camera_model.clone()
        };
        CameraIdentifier { make, model }
    }

    /// Computes the color transform for one image's metadata.
    ///
    /// # Errors
    ///
    /// Any failure leaves no partial outputs: the result is either a
    /// complete [`ColorTransform`] or an error.
    pub fn configure(
        &self,
        metadata: &RawMetadata,
    ) -> SolverResult<ColorTransform> {
        let mut transform = ColorTransform::default();

        match self.settings.wb_method {
            WbMethod::Metadata => {
                transform.wb_multipliers = metadata.cam_mul.to_vec();
            }
            WbMethod::Custom => {
                transform.wb_multipliers = self.settings.custom_wb.to_vec();
            }
            // Illuminant is resolved by the spectral path below; Box is
            // delegated entirely to the external raw reader.
            WbMethod::Illuminant | WbMethod::Box => {}
        }

        let matrix_method = self.resolve_matrix_method(metadata);

        if matrix_method == MatrixMethod::Custom {
            transform.idt_matrix = Some(self.settings.custom_matrix);
            transform.cat_matrix = None;
        }

        let spectral_white_balance =
            self.settings.wb_method == WbMethod::Illuminant;
        let spectral_matrix = matrix_method == MatrixMethod::Spectral;

        if spectral_white_balance || spectral_matrix {
            self.prepare_transform_spectral(metadata, &mut transform)?;
        }

        match matrix_method {
            MatrixMethod::Metadata => {
                if metadata.is_dng {
                    self.prepare_transform_dng(metadata, &mut transform)?;
                } else {
                    prepare_transform_non_dng(&mut transform);
                }
            }
            MatrixMethod::Adobe => {
                prepare_transform_non_dng(&mut transform);
            }
            _ => {}
        }

        Ok(transform)
    }

    /// Resolves [`MatrixMethod::Auto`] against the camera database.
    fn resolve_matrix_method(&self, metadata: &RawMetadata) -> MatrixMethod {
        if self.settings.matrix_method != MatrixMethod::Auto {
            return self.settings.matrix_method;
        }

        let identifier = self.camera_identifier(metadata);
        if !identifier.is_empty() {
            let mut solver =
                SpectralSolver::new(self.settings.database_directories.clone());
            if solver
                .find_camera(&identifier.make, &identifier.model)
                .is_ok()
            {
                return MatrixMethod::Spectral;
            }
        }

        if self.settings.verbosity > 0 {
            tracing::warn!(
                "falling back to the metadata matrix method: no spectral \
                 data found for camera '{identifier}'"
            );
        }
        MatrixMethod::Metadata
    }

    /// Spectral path: camera curves, training set and observer from the
    /// database; illuminant named or auto-detected; WB and IDT solved.
    /// CAT is cleared because adaptation is folded into the IDT.
    fn prepare_transform_spectral(
        &self,
        metadata: &RawMetadata,
        transform: &mut ColorTransform,
    ) -> SolverResult<()> {
        let identifier = self.camera_identifier(metadata);
        if identifier.is_empty() {
            return Err(SolverError::InvalidArgument {
                reason: "camera make and model are required for the \
                         spectral path"
                    .to_string(),
            });
        }

        let mut solver =
            SpectralSolver::new(self.settings.database_directories.clone());
        solver.verbosity = self.settings.verbosity;

        solver.find_camera(&identifier.make, &identifier.model)?;
        solver.training_data = solver.load_spectral_data(TRAINING_PATH)?;
        solver.observer = solver.load_spectral_data(OBSERVER_PATH)?;

        let illuminant_token = self.settings.illuminant.to_lowercase();

        if illuminant_token.is_empty() {
            // Auto-detect the illuminant from white-balance multipliers:
            // prefer multipliers established earlier in the pipeline, fall
            // back to the raw pre-multipliers.
            let mut wb = [0.0; 4];
            if transform.wb_multipliers.len() == 4 {
                wb[..3].copy_from_slice(&transform.wb_multipliers[..3]);
            } else {
                wb.copy_from_slice(&metadata.pre_mul);
            }

            // Collapse the two green channels.
            if wb[3] != 0.0 {
                wb[1] = (wb[1] + wb[3]) / 2.0;
            }
            let mut wb = Vec3::new(wb[0], wb[1], wb[2]);

            let min = wb.min_element();
            if min > 0.0 && min != 1.0 {
                wb = wb / min;
            }

            solver.find_illuminant_for_wb(wb)?;

            if self.settings.verbosity > 0 {
                tracing::info!(
                    "detected illuminant '{}'",
                    solver.illuminant.type_name
                );
            }
        } else {
            solver.find_illuminant(&illuminant_token)?;
            solver.calculate_wb()?;

            let wb = solver.wb_multipliers();
            transform.wb_multipliers = vec![wb.x, wb.y, wb.z];

            if self.settings.verbosity > 0 {
                tracing::info!(
                    "white balance coefficients: {} {} {}",
                    wb.x,
                    wb.y,
                    wb.z
                );
            }
        }

        solver.calculate_idt_matrix()?;
        transform.idt_matrix = Some(solver.idt_matrix());

        // CAT is embedded in the IDT in spectral mode.
        transform.cat_matrix = None;
        Ok(())
    }

    /// DNG metadata path: dual-calibration interpolation via the metadata
    /// solver. CAT is cleared (folded into the IDT).
    fn prepare_transform_dng(
        &self,
        raw: &RawMetadata,
        transform: &mut ColorTransform,
    ) -> SolverResult<()> {
        let neutral_rgb = {
            let m = &raw.cam_mul;
            (m[0] != 0.0 && m[1] != 0.0 && m[2] != 0.0).then(|| {
                Vec3::new(1.0 / m[0], 1.0 / m[1], 1.0 / m[2])
            })
        };

        let mut calibration = [Calibration::default(), Calibration::default()];
        for k in 0..2 {
            calibration[k].illuminant = raw.calibration_illuminant[k];
            if let Some(flat) = &raw.color_matrix[k] {
                calibration[k].xyz_to_rgb = Mat3::from_flat(flat);
            }
            if let Some(flat) = &raw.camera_calibration[k] {
                // Keep the top-left 3x3 of the 4x4 layout.
                calibration[k].camera_calibration = Mat3::from_rows([
                    [flat[0], flat[1], flat[2]],
                    [flat[4], flat[5], flat[6]],
                    [flat[8], flat[9], flat[10]],
                ]);
            }
        }

        let metadata = Metadata {
            baseline_exposure: raw.baseline_exposure,
            neutral_rgb,
            calibration,
        };

        let solver = MetadataSolver::new(&metadata);
        let idt_matrix = solver.calculate_idt_matrix()?;

        if self.settings.verbosity > 0 {
            tracing::info!("input transform matrix: {:?}", idt_matrix);
        }

        transform.idt_matrix = Some(idt_matrix);
        transform.cat_matrix = None;
        Ok(())
    }

    /// Lists the illuminants the database and the synthesizers support.
    pub fn list_supported_illuminants(&self) -> Vec<String> {
        let mut result = vec![
            "Day-light (e.g., D60, D6025)".to_string(),
            "Blackbody (e.g., 3200K)".to_string(),
        ];

        let catalog =
            DataCatalog::new(self.settings.database_directories.clone());
        for file in catalog.collect_files("illuminant") {
            if let Ok(data) = SpectralData::load(&file, false) {
                result.push(data.type_name);
            }
        }
        result
    }

    /// Lists the cameras the spectral database covers, as
    /// "manufacturer / model" strings.
    pub fn list_supported_cameras(&self) -> Vec<String> {
        let catalog =
            DataCatalog::new(self.settings.database_directories.clone());
        let mut result = Vec::new();
        for file in catalog.collect_files("camera") {
            if let Ok(data) = SpectralData::load(&file, false) {
                result.push(format!("{} / {}", data.manufacturer, data.model));
            }
        }
        result
    }
}

/// Non-DNG metadata path and the Adobe path: matrixing is delegated to
/// the external raw processor, only the fixed D65-to-ACES adaptation
/// remains for the core to report.
fn prepare_transform_non_dng(transform: &mut ColorTransform) {
    transform.idt_matrix = None;
    transform.cat_matrix = Some(cat_d65_to_aces());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dng_metadata() -> RawMetadata {
        RawMetadata {
            camera_make: "Example".into(),
            camera_model: "Mk I".into(),
            cam_mul: [2.0, 1.0, 1.5, 1.0],
            pre_mul: [1.9, 1.0, 1.4, 1.0],
            baseline_exposure: 0.0,
            is_dng: true,
            calibration_illuminant: [17, 21],
            color_matrix: [
                Some([0.9, 0.05, 0.05, 0.1, 0.8, 0.1, 0.05, 0.1, 0.85]),
                Some([1.0, 0.02, -0.02, 0.05, 0.9, 0.05, 0.0, 0.05, 0.95]),
            ],
            camera_calibration: [None, None],
        }
    }

    #[test]
    fn test_custom_matrix_passthrough() {
        let custom = Mat3::from_rows([
            [0.9, 0.05, 0.05],
            [0.0, 1.0, 0.0],
            [0.1, 0.1, 0.8],
        ]);
        let converter = Converter::new(Settings {
            wb_method: WbMethod::Custom,
            matrix_method: MatrixMethod::Custom,
            custom_wb: [2.0, 1.0, 1.5, 1.0],
            custom_matrix: custom,
            ..Default::default()
        });

        let transform = converter.configure(&RawMetadata::default()).unwrap();
        assert_eq!(transform.idt_matrix, Some(custom));
        assert_eq!(transform.cat_matrix, None);
        assert_eq!(transform.wb_multipliers, vec![2.0, 1.0, 1.5, 1.0]);
    }

    #[test]
    fn test_adobe_path_uses_fixed_cat() {
        let converter = Converter::new(Settings {
            matrix_method: MatrixMethod::Adobe,
            ..Default::default()
        });

        let metadata = dng_metadata();
        let transform = converter.configure(&metadata).unwrap();
        assert!(transform.idt_matrix.is_none());
        let cat = transform.cat_matrix.expect("Adobe path reports a CAT");
        assert!(cat.is_finite());
        // The as-shot multipliers pass through.
        assert_eq!(transform.wb_multipliers, metadata.cam_mul.to_vec());
    }

    #[test]
    fn test_metadata_dng_path_solves_idt() {
        let converter = Converter::new(Settings {
            matrix_method: MatrixMethod::Metadata,
            ..Default::default()
        });

        let transform = converter.configure(&dng_metadata()).unwrap();
        let idt = transform.idt_matrix.expect("DNG path computes an IDT");
        assert!(idt.is_finite());
        assert!(transform.cat_matrix.is_none());
    }

    #[test]
    fn test_metadata_non_dng_delegates_matrixing() {
        let converter = Converter::new(Settings {
            matrix_method: MatrixMethod::Metadata,
            ..Default::default()
        });

        let mut metadata = dng_metadata();
        metadata.is_dng = false;
        let transform = converter.configure(&metadata).unwrap();
        assert!(transform.idt_matrix.is_none());
        assert!(transform.cat_matrix.is_some());
    }

    #[test]
    fn test_auto_falls_back_to_metadata_without_camera_data() {
        // No database directories: the Auto probe cannot resolve the
        // camera and must fall back to the metadata method.
        let converter = Converter::new(Settings {
            matrix_method: MatrixMethod::Auto,
            ..Default::default()
        });

        let transform = converter.configure(&dng_metadata()).unwrap();
        assert!(transform.idt_matrix.is_some());
        assert!(transform.cat_matrix.is_none());
    }

    #[test]
    fn test_configure_is_idempotent() {
        let converter = Converter::new(Settings {
            matrix_method: MatrixMethod::Metadata,
            ..Default::default()
        });
        let metadata = dng_metadata();

        let a = converter.configure(&metadata).unwrap();
        let b = converter.configure(&metadata).unwrap();
        assert_eq!(a.wb_multipliers, b.wb_multipliers);
        assert_eq!(a.idt_matrix, b.idt_matrix);
        assert_eq!(a.cat_matrix, b.cat_matrix);
    }

    #[test]
    fn test_supported_illuminants_always_lists_synthesizers() {
        let converter = Converter::new(Settings::default());
        let illuminants = converter.list_supported_illuminants();
        assert_eq!(illuminants.len(), 2);
        assert!(illuminants[0].starts_with("Day-light"));
        assert!(illuminants[1].starts_with("Blackbody"));
    }
}
