//! # idt-solver
//!
//! Solvers and orchestration for converting camera raw colorimetry into
//! ACES AP0 transforms.
//!
//! Three cooperating pieces:
//!
//! - [`SpectralSolver`] - white balance and a least-squares IDT fit from
//!   camera spectral sensitivities, an illuminant, an observer and a
//!   training reflectance set
//! - [`MetadataSolver`] - IDT and CAT from DNG dual-illuminant calibration
//!   metadata when no spectral data exists for the camera
//! - [`Converter`] - method selection (including the `Auto` fallback from
//!   spectral to metadata), input validation and final
//!   {white balance, IDT, CAT} assembly
//!
//! # Example
//!
//! ```ignore
//! use idt_solver::{Converter, MatrixMethod, RawMetadata, Settings, WbMethod};
//!
//! let converter = Converter::new(Settings {
//!     database_directories: vec!["/usr/share/spectral-db".into()],
//!     wb_method: WbMethod::Metadata,
//!     matrix_method: MatrixMethod::Auto,
//!     ..Default::default()
//! });
//!
//! let transform = converter.configure(&raw_metadata)?;
//! // transform.wb_multipliers, transform.idt_matrix, transform.cat_matrix
//! ```
//!
//! The solvers are synchronous and own no global state; run independent
//! conversions on separate threads by giving each its own solver.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod convert;
mod error;
pub mod lm;
mod metadata;
mod spectral;

pub use convert::*;
pub use error::*;
pub use metadata::*;
pub use spectral::*;
