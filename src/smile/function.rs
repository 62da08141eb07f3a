//! Volatility function providers.
//!
//! A [`VolatilityFunction`] maps an option, a forward and a parameter vector
//! to a Black volatility. Providers with closed-form sensitivities can
//! override [`vol_adjoint`](VolatilityFunction::vol_adjoint) and
//! [`vol_adjoint2`](VolatilityFunction::vol_adjoint2); the defaults bump the
//! forward, the strike and each model parameter with second-order finite
//! differences, switching to one-sided schemes at a parameter boundary.

use crate::error::{self, VolSmileError};
use crate::optim::{FiniteDifference, FiniteDifferenceType};
use crate::smile::parameters::ModelParameterVector;
use crate::types::EuropeanOption;

/// Relative bump on forward and strike for first-order sensitivities.
const MARKET_SHIFT: f64 = 1e-6;
/// Relative bump on forward and strike for second-order sensitivities.
const MARKET_SHIFT_2: f64 = 1e-4;
/// Absolute bump on model parameters.
const PARAMETER_SHIFT: f64 = 1e-6;

/// Volatility and its first-order sensitivities.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityAdjoint {
    pub vol: f64,
    pub d_forward: f64,
    pub d_strike: f64,
    /// One entry per model parameter, in canonical order.
    pub d_params: Vec<f64>,
}

/// Volatility with first- and second-order market sensitivities.
#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityAdjoint2 {
    pub vol: f64,
    pub d_forward: f64,
    pub d_strike: f64,
    pub d_params: Vec<f64>,
    pub d2_forward2: f64,
    pub d2_forward_strike: f64,
    pub d2_strike2: f64,
}

/// A closed-form implied-volatility model.
pub trait VolatilityFunction: Send + Sync {
    type Params: ModelParameterVector;

    /// Model name used in diagnostics (e.g. "SABR").
    fn name(&self) -> &'static str;

    /// Black volatility of `option` under `params`.
    fn vol(&self, option: &EuropeanOption, forward: f64, params: &Self::Params) -> error::Result<f64>;

    /// Volatility with first-order sensitivities to forward, strike and parameters.
    fn vol_adjoint(
        &self,
        option: &EuropeanOption,
        forward: f64,
        params: &Self::Params,
    ) -> error::Result<VolatilityAdjoint> {
        let vol = self.vol(option, forward, params)?;
        let strike = option.strike;

        let by_forward = |f: f64| self.vol(option, f, params).unwrap_or(f64::NAN);
        let by_strike = |k: f64| self.vol(&option.with_strike(k), forward, params).unwrap_or(f64::NAN);
        let d_forward = central(MARKET_SHIFT * forward).derivative(&by_forward, forward);
        let d_strike = central(MARKET_SHIFT * strike).derivative(&by_strike, strike);

        let d_params = parameter_sensitivities(self, option, forward, params)?;
        finite("vol_adjoint", [vol, d_forward, d_strike])?;

        Ok(VolatilityAdjoint {
            vol,
            d_forward,
            d_strike,
            d_params,
        })
    }

    /// Volatility with first- and second-order forward/strike sensitivities.
    fn vol_adjoint2(
        &self,
        option: &EuropeanOption,
        forward: f64,
        params: &Self::Params,
    ) -> error::Result<VolatilityAdjoint2> {
        let first = self.vol_adjoint(option, forward, params)?;
        let strike = option.strike;
        let h_f = MARKET_SHIFT_2 * forward;
        let h_k = MARKET_SHIFT_2 * strike;

        let by_forward = |f: f64| self.vol(option, f, params).unwrap_or(f64::NAN);
        let by_strike = |k: f64| self.vol(&option.with_strike(k), forward, params).unwrap_or(f64::NAN);
        let d2_forward2 = central(h_f).second_derivative(&by_forward, forward);
        let d2_strike2 = central(h_k).second_derivative(&by_strike, strike);

        let at = |f: f64, k: f64| self.vol(&option.with_strike(k), f, params).unwrap_or(f64::NAN);
        let d2_forward_strike = (at(forward + h_f, strike + h_k) - at(forward + h_f, strike - h_k)
            - at(forward - h_f, strike + h_k)
            + at(forward - h_f, strike - h_k))
            / (4.0 * h_f * h_k);
        finite("vol_adjoint2", [d2_forward2, d2_strike2, d2_forward_strike])?;

        Ok(VolatilityAdjoint2 {
            vol: first.vol,
            d_forward: first.d_forward,
            d_strike: first.d_strike,
            d_params: first.d_params,
            d2_forward2,
            d2_forward_strike,
            d2_strike2,
        })
    }
}

fn central(shift: f64) -> FiniteDifference {
    FiniteDifference::new(FiniteDifferenceType::Central, shift)
}

/// `∂vol/∂θᵢ` for every parameter, central unless a bump leaves the allowed region.
fn parameter_sensitivities<F: VolatilityFunction + ?Sized>(
    function: &F,
    option: &EuropeanOption,
    forward: f64,
    params: &F::Params,
) -> error::Result<Vec<f64>> {
    let mut out = Vec::with_capacity(params.len());
    for i in 0..params.len() {
        let Some(x) = params.get(i) else {
            return Err(VolSmileError::InvalidInput {
                message: format!("parameter index {i} out of range"),
            });
        };
        let kind = FiniteDifference::choose(x, PARAMETER_SHIFT, |v| params.is_allowed(i, v));
        let bumped = |v: f64| {
            params
                .with_parameter(i, v)
                .and_then(|p| function.vol(option, forward, &p))
                .unwrap_or(f64::NAN)
        };
        let d = FiniteDifference::new(kind, PARAMETER_SHIFT).derivative(&bumped, x);
        if !d.is_finite() {
            return Err(VolSmileError::NumericalError {
                message: format!("non-finite sensitivity to parameter {i} of {}", function.name()),
            });
        }
        out.push(d);
    }
    Ok(out)
}

fn finite<const N: usize>(what: &str, values: [f64; N]) -> error::Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(VolSmileError::NumericalError {
            message: format!("{what}: non-finite finite-difference result {values:?}"),
        })
    }
}
