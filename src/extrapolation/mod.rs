//! Smile extrapolation beyond the quoted strikes.
//!
//! Two tail models are provided:
//!
//! - [`ShiftedLogNormal`]: Black pricing with a shifted forward `F·e^μ` and
//!   volatility `θ`, fitted by [`ShiftedLogNormalTailFitter`] to a boundary
//!   value and slope (or to two boundary quotes).
//! - [`SabrTailExtrapolation`]: an analytic continuation of a model price
//!   that matches value, slope and curvature at a cutoff strike.
//!
//! [`ExtrapolatedSmile`] stitches an interior smile to a low and a high
//! shifted log-normal tail.

pub mod extrapolated;
pub mod sabr_tail;
pub mod shifted_lognormal;
pub mod tail_fitter;

pub use extrapolated::ExtrapolatedSmile;
pub use sabr_tail::{SabrTailConfig, SabrTailExtrapolation};
pub use shifted_lognormal::{ShiftedLogNormal, TailParameters};
pub use tail_fitter::{ReducedTailFit, ShiftedLogNormalTailFitter, TailFit, TailFitterConfig};

use serde::{Deserialize, Serialize};

/// Which end of the smile a tail extends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TailSide {
    /// Strikes below the lowest quote; priced with puts.
    Left,
    /// Strikes above the highest quote; priced with calls.
    Right,
}

/// What a tail fit does when the boundary slope cannot be matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TailFailureMode {
    /// Return the first failure to the caller.
    #[default]
    Exception,
    /// Clamp an out-of-range slope, then shrink it until a fit succeeds.
    Quiet,
    /// Ignore the slope: constant volatility beyond the cutoff.
    Flat,
}
