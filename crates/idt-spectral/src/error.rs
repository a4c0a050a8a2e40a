//! Error types for spectral data handling.
//!
//! Covers file loading, channel lookup and illuminant synthesis failures.
//! Shape mismatches in [`crate::Spectrum`] arithmetic are programmer errors
//! and panic instead of returning these.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for spectral data operations.
pub type SpectralResult<T> = Result<T, SpectralError>;

/// Errors that can occur while loading or querying spectral data.
#[derive(Debug, Error)]
pub enum SpectralError {
    /// I/O error reading a spectral data file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing of a spectral data file failed.
    #[error("JSON parsing of {path} failed: {source}")]
    Json {
        /// Path of the offending file.
        path: PathBuf,
        /// Underlying parser error.
        source: serde_json::Error,
    },

    /// A wavelength key could not be parsed as a number.
    #[error("invalid wavelength key '{key}' in {path}")]
    InvalidWavelength {
        /// Path of the offending file.
        path: PathBuf,
        /// The key that failed to parse.
        key: String,
    },

    /// The wavelength bins of a set are not regularly spaced.
    #[error(
        "inconsistent wavelength step in {path}: expected {expected}, got {got}"
    )]
    InconsistentStep {
        /// Path of the offending file.
        path: PathBuf,
        /// Step established by the first two bins.
        expected: f64,
        /// Conflicting step.
        got: f64,
    },

    /// A wavelength bin holds a different number of values than the set's
    /// index entry declares channels.
    #[error(
        "channel count mismatch in {path}, set '{set}': \
         index declares {expected} channels, bin holds {got} values"
    )]
    ChannelCountMismatch {
        /// Path of the offending file.
        path: PathBuf,
        /// Set name.
        set: String,
        /// Channel count from the index.
        expected: usize,
        /// Value count found in a bin.
        got: usize,
    },

    /// The requested data set does not exist.
    #[error("data set '{set}' not found in spectral data")]
    SetNotFound {
        /// The requested set name.
        set: String,
    },

    /// The requested channel does not exist within the set.
    #[error("channel '{channel}' not found in data set '{set}'")]
    ChannelNotFound {
        /// Set that was searched.
        set: String,
        /// The requested channel name.
        channel: String,
    },

    /// A spectral data file could not be resolved against the search
    /// directories.
    #[error("spectral data file not found: {path}")]
    FileNotFound {
        /// The path that failed to resolve.
        path: PathBuf,
    },

    /// Daylight synthesis was requested outside the D-series domain.
    #[error(
        "daylight CCT {cct} out of range: expected 4000..=25000 K \
         (or the 40..=250 shorthand)"
    )]
    DaylightCctOutOfRange {
        /// The rejected CCT input.
        cct: i32,
    },

    /// Blackbody synthesis was requested outside the Planckian domain.
    #[error("blackbody CCT {cct} out of range: expected 1500..<4000 K")]
    BlackbodyCctOutOfRange {
        /// The rejected CCT input.
        cct: i32,
    },
}
