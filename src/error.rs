//! Error types for the volsmile library.
//!
//! Every fallible operation returns `Result<T, VolSmileError>`. Input checks
//! always run before any numerical solve, so a [`VolSmileError::InvalidInput`]
//! means no solver was invoked.

use thiserror::Error;

/// Convenience type alias for results in this crate.
pub type Result<T> = std::result::Result<T, VolSmileError>;

/// Errors raised while fitting, interpolating or extrapolating a smile.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum VolSmileError {
    /// Input data is invalid: non-ascending strikes, mismatched lengths,
    /// a weight argument outside \[0, 1\], a tail slope outside its admissible
    /// range, or a boundary quote that is not monotone in strike.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A least-squares or root solve exhausted its retry budget.
    #[error("fit failed: {message}")]
    FitFailure {
        message: String,
        /// Model that failed (e.g., "SABR", "ShiftedLogNormal").
        model: &'static str,
        /// Best chi-square reached before giving up, if any.
        chi_square: Option<f64>,
    },

    /// Arithmetic degeneracy (NaN, log of a non-positive value, singular system).
    #[error("numerical error: {message}")]
    NumericalError { message: String },
}
