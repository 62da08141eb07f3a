//! # volsmile
//!
//! Single-expiry volatility smile interpolation and extrapolation.
//!
//! Fits a smile model piecewise to market quotes (a global fit, then
//! overlapping three-quote local fits blended between knots), and extends
//! the smile beyond the quoted strikes with either a shifted log-normal
//! tail or an analytic price continuation.
//!
//! ## Architecture
//!
//! - **`implied`**: Black pricing, Greeks and implied volatility
//! - **`optim`**: least squares, root finding, Newton and finite differences
//! - **`smile`**: volatility functions, local fitter, [`SmileInterpolator`](smile::SmileInterpolator)
//! - **`extrapolation`**: shifted log-normal and SABR analytic tails
//! - **`batch`**: many independent slices, in parallel with the `parallel` feature
//!
//! ## Design
//!
//! - **Newtypes for outputs, bare `f64` for inputs.** [`Vol`], [`Variance`]
//!   and [`Strike`] wrap return values. Inputs are validated before any
//!   solver runs.
//! - **No panics.** Every fallible operation returns [`Result`].
//! - **Immutable smiles.** A fitted smile is a value. Only the interpolator
//!   carries state: its seeded random restart generator.
//! - **Thread-safe.** [`SmileSection`] requires `Send + Sync`.
//!
//! ```
//! use volsmile::{SmileSection, TailFailureMode};
//!
//! let strikes = [80.0, 90.0, 100.0, 110.0, 120.0];
//! let vols = [0.26, 0.23, 0.21, 0.205, 0.21];
//! let smile = volsmile::fit_smile(100.0, &strikes, 1.0, &vols)?;
//! let tail = volsmile::fit_tail(100.0, 120.0, 0.21, 0.0, 1.0, TailFailureMode::Quiet)?;
//! assert!(smile.vol(105.0)?.0 > 0.0);
//! assert!(tail.mu().abs() < 1e-6);
//! # Ok::<(), volsmile::VolSmileError>(())
//! ```

pub mod batch;
pub mod conventions;
pub mod error;
pub mod extrapolation;
pub mod implied;
pub mod optim;
pub mod smile;
pub mod types;
mod validate;

#[doc(inline)]
pub use error::{Result, VolSmileError};
#[doc(inline)]
pub use extrapolation::{TailFailureMode, TailParameters};
#[doc(inline)]
pub use smile::SmileSection;
#[doc(inline)]
pub use types::{OptionType, Strike, Variance, Vol};

use extrapolation::ShiftedLogNormalTailFitter;
use smile::{InterpolatedSmile, SabrHaganVolatilityFunction, SabrModelFamily, SmileInterpolator};

/// Fit a SABR smile interpolator with default settings.
///
/// # Errors
/// As [`SmileInterpolator::fit`].
pub fn fit_smile(
    forward: f64,
    strikes: &[f64],
    expiry: f64,
    vols: &[f64],
) -> Result<InterpolatedSmile<SabrHaganVolatilityFunction>> {
    SmileInterpolator::builder(SabrModelFamily::default())
        .build()?
        .fit(forward, strikes, expiry, vols)
}

/// Fit a shifted log-normal tail to a boundary volatility and slope.
///
/// # Errors
/// As [`ShiftedLogNormalTailFitter::fit_tail`].
pub fn fit_tail(
    forward: f64,
    cutoff: f64,
    vol: f64,
    vol_grad: f64,
    expiry: f64,
    mode: TailFailureMode,
) -> Result<TailParameters> {
    ShiftedLogNormalTailFitter::default().fit_tail(forward, cutoff, vol, vol_grad, expiry, mode)
}
