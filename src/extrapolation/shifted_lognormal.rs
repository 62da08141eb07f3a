//! Shifted log-normal tail model.
//!
//! Options are priced with Black on the shifted forward `F·e^μ` at
//! volatility `θ`, and the result is inverted back to a Black volatility on
//! the true forward. `μ = 0` is plain Black, so the tail volatility is
//! exactly `θ` at every strike.

use serde::{Deserialize, Serialize};

use crate::error::{self, VolSmileError};
use crate::implied::{BlackImpliedVol, black_price};
use crate::optim::{FiniteDifference, FiniteDifferenceType};
use crate::smile::SmileSection;
use crate::types::{OptionType, Vol};
use crate::validate::{validate_finite, validate_positive};

/// Relative strike bump for the volatility slope.
const SLOPE_SHIFT: f64 = 1e-5;

/// Shifted log-normal parameters `(μ, θ)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TailParametersRaw", into = "TailParametersRaw")]
pub struct TailParameters {
    mu: f64,
    theta: f64,
}

#[derive(Serialize, Deserialize)]
struct TailParametersRaw {
    mu: f64,
    theta: f64,
}

impl TryFrom<TailParametersRaw> for TailParameters {
    type Error = VolSmileError;

    fn try_from(raw: TailParametersRaw) -> Result<Self, Self::Error> {
        Self::new(raw.mu, raw.theta)
    }
}

impl From<TailParameters> for TailParametersRaw {
    fn from(p: TailParameters) -> Self {
        Self {
            mu: p.mu,
            theta: p.theta,
        }
    }
}

impl TailParameters {
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] if `mu` is not finite or
    /// `theta` is not positive and finite.
    pub fn new(mu: f64, theta: f64) -> error::Result<Self> {
        validate_finite(mu, "mu")?;
        validate_positive(theta, "theta")?;
        Ok(Self { mu, theta })
    }

    /// Unshifted parameters: constant volatility `vol`.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] if `vol` is not positive.
    pub fn flat(vol: f64) -> error::Result<Self> {
        Self::new(0.0, vol)
    }

    /// Log shift of the forward.
    pub fn mu(&self) -> f64 {
        self.mu
    }

    /// Volatility of the shifted model.
    pub fn theta(&self) -> f64 {
        self.theta
    }
}

/// A shifted log-normal smile at one forward and expiry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ShiftedLogNormalRaw", into = "ShiftedLogNormalRaw")]
pub struct ShiftedLogNormal {
    forward: f64,
    expiry: f64,
    params: TailParameters,
}

#[derive(Serialize, Deserialize)]
struct ShiftedLogNormalRaw {
    forward: f64,
    expiry: f64,
    params: TailParameters,
}

impl TryFrom<ShiftedLogNormalRaw> for ShiftedLogNormal {
    type Error = VolSmileError;

    fn try_from(raw: ShiftedLogNormalRaw) -> Result<Self, Self::Error> {
        Self::new(raw.forward, raw.expiry, raw.params)
    }
}

impl From<ShiftedLogNormal> for ShiftedLogNormalRaw {
    fn from(s: ShiftedLogNormal) -> Self {
        Self {
            forward: s.forward,
            expiry: s.expiry,
            params: s.params,
        }
    }
}

impl ShiftedLogNormal {
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] for a non-positive forward or expiry.
    pub fn new(forward: f64, expiry: f64, params: TailParameters) -> error::Result<Self> {
        validate_positive(forward, "forward")?;
        validate_positive(expiry, "expiry")?;
        Ok(Self {
            forward,
            expiry,
            params,
        })
    }

    pub fn parameters(&self) -> &TailParameters {
        &self.params
    }

    /// `F·e^μ`.
    pub fn shifted_forward(&self) -> f64 {
        self.forward * self.params.mu.exp()
    }

    /// Undiscounted price of an option struck at `strike`.
    pub fn price(&self, strike: f64, option_type: OptionType) -> f64 {
        black_price(
            self.shifted_forward(),
            strike,
            self.expiry,
            self.params.theta,
            option_type,
        )
    }

    /// Black volatility on the unshifted forward.
    ///
    /// # Errors
    /// Returns an error if the model price at `strike` has no Black implied
    /// volatility (e.g. it underflows far in the wings).
    pub fn vol(&self, strike: f64) -> error::Result<f64> {
        validate_positive(strike, "strike")?;
        if self.params.mu == 0.0 {
            return Ok(self.params.theta);
        }
        let option_type = OptionType::otm(self.forward, strike);
        let price = self.price(strike, option_type);
        BlackImpliedVol::compute(price, self.forward, strike, self.expiry, option_type).map(|v| v.0)
    }

    /// `∂σ/∂K` by central differences.
    ///
    /// # Errors
    /// Propagates failures of [`vol`](Self::vol) at the bumped strikes.
    pub fn vol_slope(&self, strike: f64) -> error::Result<f64> {
        validate_positive(strike, "strike")?;
        let vol = |k: f64| self.vol(k).unwrap_or(f64::NAN);
        let slope = FiniteDifference::new(FiniteDifferenceType::Central, SLOPE_SHIFT * strike)
            .derivative(&vol, strike);
        if !slope.is_finite() {
            return Err(VolSmileError::NumericalError {
                message: format!("shifted log-normal vol slope is not finite at strike {strike}"),
            });
        }
        Ok(slope)
    }
}

impl SmileSection for ShiftedLogNormal {
    fn vol(&self, strike: f64) -> error::Result<Vol> {
        ShiftedLogNormal::vol(self, strike).map(Vol)
    }

    fn forward(&self) -> f64 {
        self.forward
    }

    fn expiry(&self) -> f64 {
        self.expiry
    }
}
