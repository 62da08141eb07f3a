//! Fixed-length model parameter vectors.
//!
//! A parameter vector is produced by a fit and never mutated afterwards;
//! finite-difference sensitivities bump one entry at a time through
//! [`ModelParameterVector::with_parameter`], which returns a new value.

use std::fmt::Debug;

use crate::error;
pub use crate::optim::ParameterBound;

/// Ordered parameters of a volatility-model family (e.g. SABR α, β, ρ, ν).
pub trait ModelParameterVector: Clone + Debug + Send + Sync + Sized {
    /// Number of parameters.
    fn len(&self) -> usize;

    /// Parameter at `index`, or `None` when out of range.
    fn get(&self, index: usize) -> Option<f64>;

    /// Whether `value` is an admissible value for the parameter at `index`.
    fn is_allowed(&self, index: usize, value: f64) -> bool;

    /// Copy of `self` with the parameter at `index` replaced.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`](crate::VolSmileError::InvalidInput)
    /// for an out-of-range index or an inadmissible value.
    fn with_parameter(&self, index: usize, value: f64) -> error::Result<Self>;

    fn to_vec(&self) -> Vec<f64>;

    /// Build from a flat slice in canonical order.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`](crate::VolSmileError::InvalidInput)
    /// for a wrong length or inadmissible values.
    fn from_slice(values: &[f64]) -> error::Result<Self>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
