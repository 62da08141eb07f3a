//! Blend curves for combining adjacent local fits.
//!
//! A weighting function maps `y ∈ [0, 1]` to a weight in `[0, 1]` with
//! `w(0) = 0` and `w(1) = 1` exactly. Between knots `xs[i] ≤ x ≤ xs[i+1]`
//! the argument is `y = (xs[i+1] − x) / (xs[i+1] − xs[i])`, so the weight on
//! the left-hand fit falls from 1 to 0 as `x` moves right.
//!
//! The three standard curves are stateless statics looked up by name:
//!
//! ```
//! use volsmile::smile::weighting_function;
//!
//! let sine = weighting_function("Sine").unwrap();
//! assert_eq!(sine.weight(0.5).unwrap(), 0.5);
//! ```

use std::f64::consts::PI;
use std::fmt::Debug;

use crate::error::{self, VolSmileError};

/// Stateless blend curve on `[0, 1]`.
pub trait WeightingFunction: Debug + Send + Sync {
    /// Registry name ("Linear", "Sine", "Cosine").
    fn name(&self) -> &'static str;

    /// The raw curve; only called with `0 < y < 1`.
    fn curve(&self, y: f64) -> f64;

    /// Weight at `y`, exact at both ends.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] if `y` is outside `[0, 1]`.
    fn weight(&self, y: f64) -> error::Result<f64> {
        if !(0.0..=1.0).contains(&y) {
            return Err(VolSmileError::InvalidInput {
                message: format!("weight argument must be in [0, 1], got {y}"),
            });
        }
        if y == 0.0 {
            return Ok(0.0);
        }
        if y == 1.0 {
            return Ok(1.0);
        }
        Ok(self.curve(y).clamp(0.0, 1.0))
    }

    /// Weight of the left-hand fit at `x` between `xs[index]` and `xs[index + 1]`.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] if `index` is not an interior
    /// index of `xs` or `x` lies outside `[xs[index], xs[index + 1]]`.
    fn weight_at(&self, xs: &[f64], index: usize, x: f64) -> error::Result<f64> {
        if xs.len() < 2 || index > xs.len() - 2 {
            return Err(VolSmileError::InvalidInput {
                message: format!(
                    "index {index} is not an interior index for {} knots",
                    xs.len()
                ),
            });
        }
        let y = (xs[index + 1] - x) / (xs[index + 1] - xs[index]);
        self.weight(y)
    }
}

/// `w(y) = y`
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearWeighting;

/// `w(y) = ½·(sin(π(y − ½)) + 1)`
#[derive(Debug, Clone, Copy, Default)]
pub struct SineWeighting;

/// `w(y) = cos(π/6·(2y² + y − 3))`
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineWeighting;

impl WeightingFunction for LinearWeighting {
    fn name(&self) -> &'static str {
        "Linear"
    }

    fn curve(&self, y: f64) -> f64 {
        y
    }
}

impl WeightingFunction for SineWeighting {
    fn name(&self) -> &'static str {
        "Sine"
    }

    fn curve(&self, y: f64) -> f64 {
        0.5 * ((PI * (y - 0.5)).sin() + 1.0)
    }
}

impl WeightingFunction for CosineWeighting {
    fn name(&self) -> &'static str {
        "Cosine"
    }

    fn curve(&self, y: f64) -> f64 {
        (PI / 6.0 * (2.0 * y * y + y - 3.0)).cos()
    }
}

pub static LINEAR: LinearWeighting = LinearWeighting;
pub static SINE: SineWeighting = SineWeighting;
pub static COSINE: CosineWeighting = CosineWeighting;

static REGISTRY: [&dyn WeightingFunction; 3] = [&LINEAR, &SINE, &COSINE];

/// Look up a standard weighting function by name (case-insensitive).
///
/// # Errors
/// Returns [`VolSmileError::InvalidInput`] for an unknown name.
pub fn weighting_function(name: &str) -> error::Result<&'static dyn WeightingFunction> {
    REGISTRY
        .iter()
        .copied()
        .find(|w| w.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| VolSmileError::InvalidInput {
            message: format!(
                "unknown weighting function {name:?}, expected one of {:?}",
                weighting_function_names()
            ),
        })
}

/// Names accepted by [`weighting_function`].
pub fn weighting_function_names() -> Vec<&'static str> {
    REGISTRY.iter().map(|w| w.name()).collect()
}
