//! # idt-spectral
//!
//! Spectral data model for camera-to-ACES input transform computation.
//!
//! This crate provides everything the solvers consume as input:
//!
//! - [`Spectrum`] - a regularly-sampled curve with arithmetic, integration
//!   and reshaping onto the reference 380-780 nm / 5 nm grid
//! - [`SpectralData`] - a keyed collection of named channel curves (camera
//!   RGB sensitivities, observer XYZ matching functions, illuminant power,
//!   training-patch reflectances) with header metadata and a JSON loader
//! - [`DataCatalog`] - ordered search over spectral database directories
//! - [`illuminant`] - CIE D-series and blackbody synthesis from CCT
//!
//! # Data flow
//!
//! ```text
//! database dirs --> DataCatalog --> SpectralData --> Spectrum curves
//!                                        ^
//!    CCT (e.g. "D65", "3200K") ----------+  (synthesized illuminants)
//! ```
//!
//! All curves in one `SpectralData` share a single [`Shape`]; loaders reduce
//! curves to [`REFERENCE_SHAPE`] unless asked not to.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod catalog;
mod data;
mod error;
pub mod illuminant;
mod spectrum;

pub use catalog::*;
pub use data::*;
pub use error::*;
pub use spectrum::*;
