//! Fitting shifted log-normal tails to boundary conditions.
//!
//! Every variant reduces to matching a price and its strike derivative
//! (dual delta) at one strike. Matching on volatility directly can step into
//! regions where the model price has no Black implied volatility; prices
//! are always defined.
//!
//! The unknowns are solved in transformed coordinates
//! `u = L·atanh(μ/L)`, `v = ln θ`, which keeps `μ` inside `(−L, L)` and
//! `θ` positive without constraining the solver.

use serde::{Deserialize, Serialize};

use crate::error::{self, VolSmileError};
use crate::extrapolation::shifted_lognormal::{ShiftedLogNormal, TailParameters};
use crate::extrapolation::{TailFailureMode, TailSide};
use crate::implied::{BlackImpliedVol, black_price, dual_delta, vega};
use crate::optim::{NewtonConfig, NewtonVectorRootFinder};
use crate::types::OptionType;
use crate::validate::{
    validate_finite, validate_non_negative, validate_positive, validate_smile_inputs,
};

const MODEL: &str = "ShiftedLogNormal";

/// Keeps `atanh` finite when a fitted `μ` sits on the soft limit.
const MAX_TANH: f64 = 1.0 - 1e-15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TailFitterConfig {
    /// Factor applied to the target slope after each failed quiet fit.
    pub reduction_factor: f64,
    /// Relative distance inside the admissible slope range after clamping.
    pub bound_shrink: f64,
    /// Attempts allowed in the quiet loop, clamps included.
    pub max_reductions: usize,
    /// Soft limit `L` on `|μ|`.
    pub mu_limit: f64,
    pub tolerance: f64,
    pub max_iterations: usize,
}

impl Default for TailFitterConfig {
    fn default() -> Self {
        Self {
            reduction_factor: 0.95,
            bound_shrink: 0.01,
            max_reductions: 100,
            mu_limit: 40.0,
            tolerance: 1e-12,
            max_iterations: 100,
        }
    }
}

/// A tail fitted from a strike array, possibly after dropping boundary points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TailFit {
    pub parameters: TailParameters,
    /// Strike the tail was matched at.
    pub cutoff: f64,
    /// Boundary points dropped before a fit succeeded.
    pub tossed: usize,
}

/// A tail fitted after the target slope was clamped or reduced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReducedTailFit {
    pub parameters: TailParameters,
    /// Slope actually matched.
    pub vol_grad: f64,
    /// Clamps and reductions applied before the fit succeeded.
    pub reductions: usize,
}

/// Solves shifted log-normal parameters from boundary quotes.
#[derive(Debug, Clone)]
pub struct ShiftedLogNormalTailFitter {
    config: TailFitterConfig,
    newton: NewtonVectorRootFinder,
}

impl Default for ShiftedLogNormalTailFitter {
    fn default() -> Self {
        Self::new(TailFitterConfig::default())
    }
}

impl ShiftedLogNormalTailFitter {
    pub fn new(config: TailFitterConfig) -> Self {
        let newton = NewtonVectorRootFinder::new(NewtonConfig {
            tolerance: config.tolerance,
            max_iterations: config.max_iterations,
            ..NewtonConfig::default()
        });
        Self { config, newton }
    }

    pub fn config(&self) -> &TailFitterConfig {
        &self.config
    }

    fn to_internal(&self, p: &TailParameters) -> [f64; 2] {
        let limit = self.config.mu_limit;
        let ratio = (p.mu() / limit).clamp(-MAX_TANH, MAX_TANH);
        [limit * ratio.atanh(), p.theta().ln()]
    }

    fn from_internal(&self, x: &[f64]) -> error::Result<TailParameters> {
        let limit = self.config.mu_limit;
        TailParameters::new(limit * (x[0] / limit).tanh(), x[1].exp())
    }

    fn solve(
        &self,
        residuals: &dyn Fn(&TailParameters) -> Vec<f64>,
        start: &TailParameters,
    ) -> error::Result<TailParameters> {
        let f = |x: &[f64]| self.from_internal(x).map(|p| residuals(&p));
        let x = self
            .newton
            .solve(&f, &self.to_internal(start))
            .map_err(|e| VolSmileError::FitFailure {
                message: format!("tail solve failed: {e}"),
                model: MODEL,
                chi_square: None,
            })?;
        self.from_internal(&x)
    }

    /// Parameters whose price and dual delta at `strike` equal `price` and `price_grad`.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] when the targets cannot come
    /// from any convex price curve: a call slope must be negative with
    /// `price − price_grad·strike < forward`, a put slope positive with
    /// `price < strike`. Returns [`VolSmileError::FitFailure`] if the solve
    /// does not converge.
    pub fn fit_price_and_grad(
        &self,
        forward: f64,
        strike: f64,
        price: f64,
        price_grad: f64,
        expiry: f64,
        option_type: OptionType,
    ) -> error::Result<TailParameters> {
        validate_positive(forward, "forward")?;
        validate_non_negative(strike, "strike")?;
        validate_positive(price, "price")?;
        validate_finite(price_grad, "price gradient")?;
        validate_positive(expiry, "expiry")?;
        match option_type {
            OptionType::Call if price_grad >= 0.0 => {
                return Err(VolSmileError::InvalidInput {
                    message: format!("call price gradient must be negative, got {price_grad}"),
                });
            }
            OptionType::Call if price - price_grad * strike >= forward => {
                return Err(VolSmileError::InvalidInput {
                    message: format!(
                        "call price {price} with gradient {price_grad} at strike {strike} implies a zero-strike price above the forward {forward}"
                    ),
                });
            }
            OptionType::Put if price_grad <= 0.0 => {
                return Err(VolSmileError::InvalidInput {
                    message: format!("put price gradient must be positive, got {price_grad}"),
                });
            }
            OptionType::Put if price >= strike => {
                return Err(VolSmileError::InvalidInput {
                    message: format!("put price {price} must be below the strike {strike}"),
                });
            }
            _ => {}
        }

        let start_vol = BlackImpliedVol::compute(price, forward, strike, expiry, option_type)?;
        let start = TailParameters::flat(start_vol.0)?;
        let residuals = |p: &TailParameters| {
            let shifted = forward * p.mu().exp();
            let model_price = black_price(shifted, strike, expiry, p.theta(), option_type);
            let model_grad = dual_delta(shifted, strike, expiry, p.theta(), option_type);
            vec![
                model_price / price - 1.0,
                (model_grad - price_grad) / price_grad.abs(),
            ]
        };
        let fitted = self.solve(&residuals, &start)?;

        #[cfg(feature = "logging")]
        tracing::debug!(strike, mu = fitted.mu(), theta = fitted.theta(), "tail fitted to price and gradient");

        Ok(fitted)
    }

    /// Admissible open range `(min, max)` of `∂σ/∂K` at a boundary point.
    ///
    /// Outside it the implied price curve is not convex or leaves the
    /// static no-arbitrage bounds, and no shifted log-normal tail can match it.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] for non-positive inputs and
    /// [`VolSmileError::NumericalError`] if vega vanishes.
    pub fn volatility_gradient_bounds(
        &self,
        forward: f64,
        strike: f64,
        vol: f64,
        expiry: f64,
    ) -> error::Result<(f64, f64)> {
        validate_positive(forward, "forward")?;
        validate_positive(strike, "strike")?;
        validate_positive(vol, "vol")?;
        validate_positive(expiry, "expiry")?;

        let option_type = OptionType::otm(forward, strike);
        let price = black_price(forward, strike, expiry, vol, option_type);
        let dd = dual_delta(forward, strike, expiry, vol, option_type);
        let vg = vega(forward, strike, expiry, vol);
        if !(vg > 0.0) || !vg.is_finite() {
            return Err(VolSmileError::NumericalError {
                message: format!("vega is {vg} at strike {strike}, vol {vol}"),
            });
        }
        Ok(match option_type {
            OptionType::Call => (((price - forward) / strike - dd) / vg, -dd / vg),
            OptionType::Put => ((price / strike - dd) / vg, (1.0 - dd) / vg),
        })
    }

    /// Parameters reproducing volatility `vol` and slope `vol_grad` at `strike`.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] if `vol_grad` lies outside
    /// [`volatility_gradient_bounds`](Self::volatility_gradient_bounds), and
    /// [`VolSmileError::FitFailure`] if the solve does not converge.
    pub fn fit_volatility_and_grad(
        &self,
        forward: f64,
        strike: f64,
        vol: f64,
        vol_grad: f64,
        expiry: f64,
    ) -> error::Result<TailParameters> {
        validate_finite(vol_grad, "vol gradient")?;
        let (lo, hi) = self.volatility_gradient_bounds(forward, strike, vol, expiry)?;
        if !(lo < vol_grad && vol_grad < hi) {
            return Err(VolSmileError::InvalidInput {
                message: format!(
                    "vol gradient {vol_grad} at strike {strike} outside admissible range ({lo}, {hi})"
                ),
            });
        }
        let option_type = OptionType::otm(forward, strike);
        let price = black_price(forward, strike, expiry, vol, option_type);
        let price_grad =
            dual_delta(forward, strike, expiry, vol, option_type) + vega(forward, strike, expiry, vol) * vol_grad;
        self.fit_price_and_grad(forward, strike, price, price_grad, expiry, option_type)
    }

    /// [`fit_volatility_and_grad`](Self::fit_volatility_and_grad), flattening
    /// the slope until a fit succeeds.
    ///
    /// A slope outside the admissible range is first moved just inside the
    /// nearest bound; each failed fit then scales it by
    /// [`TailFitterConfig::reduction_factor`].
    ///
    /// # Errors
    /// Returns [`VolSmileError::FitFailure`] once
    /// [`TailFitterConfig::max_reductions`] attempts are used up.
    pub fn fit_volatility_and_grad_quietly(
        &self,
        forward: f64,
        strike: f64,
        vol: f64,
        vol_grad: f64,
        expiry: f64,
    ) -> error::Result<ReducedTailFit> {
        validate_finite(vol_grad, "vol gradient")?;
        let shrink = self.config.bound_shrink;
        let mut grad = vol_grad;
        for reductions in 0..=self.config.max_reductions {
            let (lo, hi) = self.volatility_gradient_bounds(forward, strike, vol, expiry)?;
            if grad >= hi || grad <= lo {
                let bound = if grad >= hi { hi } else { lo };
                let inward = if grad >= hi { bound > 0.0 } else { bound < 0.0 };
                grad = if inward { (1.0 - shrink) * bound } else { (1.0 + shrink) * bound };

                #[cfg(feature = "logging")]
                tracing::warn!(strike, from = vol_grad, to = grad, "tail slope outside admissible range, clamped");
                continue;
            }
            match self.fit_volatility_and_grad(forward, strike, vol, grad, expiry) {
                Ok(parameters) => {
                    return Ok(ReducedTailFit {
                        parameters,
                        vol_grad: grad,
                        reductions,
                    });
                }
                Err(_e) => {
                    #[cfg(feature = "logging")]
                    tracing::warn!(strike, vol_grad = grad, error = %_e, "tail fit failed, reducing slope");
                    grad *= self.config.reduction_factor;
                }
            }
        }
        Err(VolSmileError::FitFailure {
            message: format!(
                "no tail fit at strike {strike} after {} slope reductions",
                self.config.max_reductions
            ),
            model: MODEL,
            chi_square: None,
        })
    }

    /// Fit a tail at the boundary of a quoted smile, moving inward on failure.
    ///
    /// The slope at each candidate point comes from its neighbour further
    /// inside. When a fit fails the boundary-most point is dropped and the
    /// next one is tried.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] for invalid quotes and
    /// [`VolSmileError::FitFailure`] if every candidate point fails.
    pub fn fit_from_quotes(
        &self,
        forward: f64,
        strikes: &[f64],
        vols: &[f64],
        expiry: f64,
        side: TailSide,
    ) -> error::Result<TailFit> {
        validate_smile_inputs(forward, strikes, expiry, vols, 2)?;
        let n = strikes.len();
        let candidates: Vec<(usize, usize)> = match side {
            TailSide::Left => (0..n - 1).map(|i| (i, i + 1)).collect(),
            TailSide::Right => (1..n).rev().map(|i| (i, i - 1)).collect(),
        };

        for (tossed, &(at, inner)) in candidates.iter().enumerate() {
            let slope = (vols[inner] - vols[at]) / (strikes[inner] - strikes[at]);
            match self.fit_volatility_and_grad(forward, strikes[at], vols[at], slope, expiry) {
                Ok(parameters) => {
                    return Ok(TailFit {
                        parameters,
                        cutoff: strikes[at],
                        tossed,
                    });
                }
                Err(_e) => {
                    #[cfg(feature = "logging")]
                    tracing::warn!(strike = strikes[at], side = ?side, error = %_e, "tail fit failed, tossing boundary point");
                }
            }
        }
        Err(VolSmileError::FitFailure {
            message: format!("no {side:?} tail fit succeeded at any of {n} quoted strikes"),
            model: MODEL,
            chi_square: None,
        })
    }

    /// Parameters repricing two options of the same type exactly.
    ///
    /// A starting point is fitted to the average price and the secant slope
    /// at the mid strike, then refined against both prices.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] if the strikes are not
    /// ascending or the prices are not monotone in strike (decreasing for
    /// calls, increasing for puts), and [`VolSmileError::FitFailure`] if
    /// either solve fails.
    pub fn fit_two_prices(
        &self,
        forward: f64,
        strikes: [f64; 2],
        prices: [f64; 2],
        expiry: f64,
        option_type: OptionType,
    ) -> error::Result<TailParameters> {
        let [k1, k2] = strikes;
        let [p1, p2] = prices;
        validate_positive(k1, "strike")?;
        validate_positive(p1, "price")?;
        validate_positive(p2, "price")?;
        if !(k2 > k1) {
            return Err(VolSmileError::InvalidInput {
                message: format!("strikes must be ascending, got {k1} then {k2}"),
            });
        }
        let monotone = match option_type {
            OptionType::Call => p1 > p2,
            OptionType::Put => p1 < p2,
        };
        if !monotone {
            return Err(VolSmileError::InvalidInput {
                message: format!("{option_type:?} prices {p1}, {p2} are not monotone in strike"),
            });
        }

        let start = self.fit_price_and_grad(
            forward,
            0.5 * (k1 + k2),
            0.5 * (p1 + p2),
            (p2 - p1) / (k2 - k1),
            expiry,
            option_type,
        )?;
        let residuals = |p: &TailParameters| {
            let shifted = forward * p.mu().exp();
            vec![
                black_price(shifted, k1, expiry, p.theta(), option_type) / p1 - 1.0,
                black_price(shifted, k2, expiry, p.theta(), option_type) / p2 - 1.0,
            ]
        };
        self.solve(&residuals, &start)
    }

    /// [`fit_two_prices`](Self::fit_two_prices) from two Black volatilities.
    ///
    /// # Errors
    /// As [`fit_two_prices`](Self::fit_two_prices); vols must be positive.
    pub fn fit_two_volatilities(
        &self,
        forward: f64,
        strikes: [f64; 2],
        vols: [f64; 2],
        expiry: f64,
        option_type: OptionType,
    ) -> error::Result<TailParameters> {
        validate_positive(forward, "forward")?;
        validate_positive(expiry, "expiry")?;
        for v in vols {
            validate_positive(v, "vol")?;
        }
        let prices = [
            black_price(forward, strikes[0], expiry, vols[0], option_type),
            black_price(forward, strikes[1], expiry, vols[1], option_type),
        ];
        self.fit_two_prices(forward, strikes, prices, expiry, option_type)
    }

    /// Fit a tail to a boundary volatility and slope under `mode`.
    ///
    /// # Errors
    /// [`TailFailureMode::Exception`] returns the first validation or fit
    /// error; [`TailFailureMode::Quiet`] fails only when its reduction budget
    /// is exhausted; [`TailFailureMode::Flat`] fails only on invalid inputs.
    pub fn fit_tail(
        &self,
        forward: f64,
        cutoff: f64,
        vol: f64,
        vol_grad: f64,
        expiry: f64,
        mode: TailFailureMode,
    ) -> error::Result<TailParameters> {
        match mode {
            TailFailureMode::Exception => {
                self.fit_volatility_and_grad(forward, cutoff, vol, vol_grad, expiry)
            }
            TailFailureMode::Quiet => self
                .fit_volatility_and_grad_quietly(forward, cutoff, vol, vol_grad, expiry)
                .map(|fit| fit.parameters),
            TailFailureMode::Flat => {
                validate_positive(forward, "forward")?;
                validate_positive(cutoff, "cutoff")?;
                validate_positive(expiry, "expiry")?;
                TailParameters::flat(vol)
            }
        }
    }

    /// A fitted tail as a smile.
    ///
    /// # Errors
    /// As [`fit_tail`](Self::fit_tail).
    pub fn fit_tail_smile(
        &self,
        forward: f64,
        cutoff: f64,
        vol: f64,
        vol_grad: f64,
        expiry: f64,
        mode: TailFailureMode,
    ) -> error::Result<ShiftedLogNormal> {
        let params = self.fit_tail(forward, cutoff, vol, vol_grad, expiry, mode)?;
        ShiftedLogNormal::new(forward, expiry, params)
    }
}
