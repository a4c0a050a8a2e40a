//! Error types for the white-balance and input-transform solvers.

use thiserror::Error;

/// Result type for solver operations.
pub type SolverResult<T> = Result<T, SolverError>;

/// Errors that can occur while computing input transforms.
#[derive(Debug, Error)]
pub enum SolverError {
    /// Spectral data loading or lookup failed.
    #[error(transparent)]
    Spectral(#[from] idt_spectral::SpectralError),

    /// An input token or value was malformed.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// What was wrong with the input.
        reason: String,
    },

    /// No camera spectral data matched the requested make and model.
    #[error("no spectral data found for camera '{make} {model}'")]
    CameraNotFound {
        /// Requested manufacturer.
        make: String,
        /// Requested model.
        model: String,
    },

    /// No illuminant in the database matched the requested type token.
    #[error("no illuminant found matching '{name}'")]
    IlluminantNotFound {
        /// The requested type token.
        name: String,
    },

    /// A solver method was invoked before its inputs were initialized.
    #[error("{what} needs to be initialised prior to calling {method}")]
    NotInitialized {
        /// The missing input (camera, illuminant, observer, training data).
        what: &'static str,
        /// The method that was called too early.
        method: &'static str,
    },

    /// A numeric computation failed (singular matrix, non-converging fit,
    /// degenerate white point).
    #[error("numeric failure: {reason}")]
    Numeric {
        /// Description of the failure.
        reason: String,
    },
}
