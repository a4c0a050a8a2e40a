//! # idt-math
//!
//! Math primitives for camera-to-ACES input transform computation.
//!
//! This crate provides the numeric foundation shared by the spectral and
//! metadata solvers:
//!
//! - [`Mat3`] - 3x3 double-precision matrices for color space transforms
//! - [`Vec3`] - 3D double-precision vectors for RGB/XYZ triplets
//! - Chromatic adaptation transforms (Bradford)
//! - Chromaticity-based RGB/XYZ matrix generation
//! - CIE L\*a\*b\* and CIE 1960 UCS conversions
//! - Interpolation utilities (lerp, clamp)
//!
//! # Design
//!
//! All matrix operations assume **row-major** storage and **column vectors**:
//!
//! ```text
//! result = matrix * vector
//! ```
//!
//! Everything here is `f64`: the solvers interpolate calibration matrices and
//! run a least-squares fit to tolerances around 1e-17, well beyond `f32`.
//! Bridges to [`glam`] double types are provided for interop.
//!
//! # Usage
//!
//! ```rust
//! use idt_math::{Mat3, Vec3};
//!
//! // sRGB to XYZ (D65)
//! let rgb_to_xyz = Mat3::from_rows([
//!     [0.4124564, 0.3575761, 0.1804375],
//!     [0.2126729, 0.7151522, 0.0721750],
//!     [0.0193339, 0.1191920, 0.9503041],
//! ]);
//!
//! let rgb = Vec3::new(1.0, 0.0, 0.0);
//! let xyz = rgb_to_xyz * rgb;
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod adapt;
mod interp;
mod lab;
mod mat3;
mod primaries;
mod uv;
mod vec3;

pub use adapt::*;
pub use interp::*;
pub use lab::*;
pub use mat3::*;
pub use primaries::*;
pub use uv::*;
pub use vec3::*;

/// Re-export glam double-precision types for direct use.
pub mod glam {
    pub use ::glam::{DMat3 as GlamMat3, DVec3 as GlamVec3};
}
