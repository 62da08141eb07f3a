//! An interior smile with shifted log-normal tails on both sides.

use crate::error::{self, VolSmileError};
use crate::extrapolation::TailFailureMode;
use crate::extrapolation::shifted_lognormal::{ShiftedLogNormal, TailParameters};
use crate::extrapolation::tail_fitter::ShiftedLogNormalTailFitter;
use crate::optim::{FiniteDifference, FiniteDifferenceType};
use crate::smile::SmileSection;
use crate::types::{Strike, Vol};
use crate::validate::{validate_positive, validate_smile_inputs};

/// Relative strike step of the one-sided boundary slope.
const SLOPE_SHIFT: f64 = 1e-4;

/// Interior smile between the first and last quoted strikes, tails outside.
///
/// Each tail matches the quoted volatility at its cutoff and the interior
/// smile's slope there, taken one-sided from inside the quoted range.
///
/// ```
/// use volsmile::extrapolation::{ExtrapolatedSmile, ShiftedLogNormalTailFitter, TailFailureMode};
/// use volsmile::smile::{SabrModelFamily, SmileInterpolator, SmileSection};
///
/// let strikes = [80.0, 90.0, 100.0, 110.0, 120.0];
/// let vols = [0.2; 5];
/// let interior = SmileInterpolator::builder(SabrModelFamily::default())
///     .build()?
///     .fit(100.0, &strikes, 1.0, &vols)?;
/// let smile = ExtrapolatedSmile::new(
///     interior,
///     &strikes,
///     &vols,
///     TailFailureMode::Flat,
///     &ShiftedLogNormalTailFitter::default(),
/// )?;
/// assert_eq!(smile.vol(70.0)?.0, 0.2);
/// # Ok::<(), volsmile::VolSmileError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ExtrapolatedSmile<S: SmileSection> {
    interior: S,
    low_cutoff: f64,
    high_cutoff: f64,
    low: ShiftedLogNormal,
    high: ShiftedLogNormal,
}

impl<S: SmileSection> ExtrapolatedSmile<S> {
    /// Fit both tails of `interior` at the ends of the quoted strikes.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] for invalid quotes, and any
    /// tail error `mode` does not absorb. [`TailFailureMode::Flat`] never
    /// evaluates the interior smile.
    pub fn new(
        interior: S,
        quoted_strikes: &[f64],
        quoted_vols: &[f64],
        mode: TailFailureMode,
        fitter: &ShiftedLogNormalTailFitter,
    ) -> error::Result<Self> {
        let (forward, expiry) = (interior.forward(), interior.expiry());
        validate_smile_inputs(forward, quoted_strikes, expiry, quoted_vols, 2)?;
        let n = quoted_strikes.len();
        let (low_cutoff, high_cutoff) = (quoted_strikes[0], quoted_strikes[n - 1]);

        let (low_slope, high_slope) = match mode {
            TailFailureMode::Flat => (0.0, 0.0),
            _ => (
                boundary_slope(&interior, low_cutoff, FiniteDifferenceType::Forward)?,
                boundary_slope(&interior, high_cutoff, FiniteDifferenceType::Backward)?,
            ),
        };

        let low = fitter.fit_tail_smile(forward, low_cutoff, quoted_vols[0], low_slope, expiry, mode)?;
        let high = fitter.fit_tail_smile(forward, high_cutoff, quoted_vols[n - 1], high_slope, expiry, mode)?;

        #[cfg(feature = "logging")]
        tracing::debug!(
            low_cutoff,
            low_slope,
            high_cutoff,
            high_slope,
            mode = ?mode,
            "smile tails fitted"
        );

        Ok(Self {
            interior,
            low_cutoff,
            high_cutoff,
            low,
            high,
        })
    }

    pub fn interior(&self) -> &S {
        &self.interior
    }

    /// `(low, high)` cutoff strikes.
    pub fn cutoffs(&self) -> (Strike, Strike) {
        (Strike(self.low_cutoff), Strike(self.high_cutoff))
    }

    pub fn low_tail(&self) -> &TailParameters {
        self.low.parameters()
    }

    pub fn high_tail(&self) -> &TailParameters {
        self.high.parameters()
    }
}

fn boundary_slope<S: SmileSection>(interior: &S, strike: f64, kind: FiniteDifferenceType) -> error::Result<f64> {
    let vol = |k: f64| interior.vol(k).map(|v| v.0).unwrap_or(f64::NAN);
    let slope = FiniteDifference::new(kind, SLOPE_SHIFT * strike).derivative(&vol, strike);
    if !slope.is_finite() {
        return Err(VolSmileError::NumericalError {
            message: format!("interior smile slope is not finite at strike {strike}"),
        });
    }
    Ok(slope)
}

impl<S: SmileSection> SmileSection for ExtrapolatedSmile<S> {
    fn vol(&self, strike: f64) -> error::Result<Vol> {
        validate_positive(strike, "strike")?;
        if strike < self.low_cutoff {
            self.low.vol(strike).map(Vol)
        } else if strike > self.high_cutoff {
            self.high.vol(strike).map(Vol)
        } else {
            self.interior.vol(strike)
        }
    }

    fn forward(&self) -> f64 {
        self.interior.forward()
    }

    fn expiry(&self) -> f64 {
        self.interior.expiry()
    }
}
