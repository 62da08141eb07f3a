//! Analytic continuation of a model smile beyond a cutoff strike.
//!
//! Beyond the cutoff the out-of-the-money price is replaced by
//!
//! - right tail (calls): `K^(−μ) · exp(a + b/K + c/K²)`
//! - left tail (puts): `K^μ · exp(a + b·K + c·K²)`
//!
//! with `(a, b, c)` chosen so that price, first and second strike
//! derivatives match the model at the cutoff. The price curve is therefore
//! C² across the cutoff and decays like a power `μ` deep in the tail. The
//! other option type follows from put/call parity.
//!
//! # References
//! - Benaim, S., Dodgson, M. and Kainth, D. "An arbitrage-free method for
//!   smile extrapolation", Royal Bank of Scotland (2008)

use nalgebra::{Matrix3, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{self, VolSmileError};
use crate::extrapolation::TailSide;
use crate::implied::BlackImpliedVol;
use crate::implied::black::{black_price, dual_delta, dual_gamma, dual_vanna, vega, volga};
use crate::optim::{FiniteDifference, RealRootFinder, RidderRootFinder};
use crate::smile::SmileSection;
use crate::smile::function::VolatilityFunction;
use crate::smile::parameters::ModelParameterVector;
use crate::smile::sabr::SabrHaganVolatilityFunction;
use crate::types::{EuropeanOption, OptionType, Vol};
use crate::validate::{validate_non_negative, validate_positive};

const MODEL: &str = "SabrTail";

/// Thresholds of the tail fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SabrTailConfig {
    /// Below this expiry the tail is treated as expired.
    pub small_expiry: f64,
    /// Cutoff price and derivatives all below this are treated as zero.
    pub negligible_price: f64,
    /// `a` used for an expired tail.
    pub expired_parameter: f64,
    /// `a` used when the cutoff price is negligible.
    pub negligible_parameter: f64,
    /// Absolute accuracy of the right-tail root solve for `c`.
    pub root_accuracy: f64,
    /// Relative forward bump and absolute parameter bump for sensitivities.
    pub fd_shift: f64,
}

impl Default for SabrTailConfig {
    fn default() -> Self {
        Self {
            small_expiry: 1e-6,
            negligible_price: 1e-15,
            expired_parameter: -1e4,
            negligible_parameter: -100.0,
            root_accuracy: 1e-5,
            fd_shift: 1e-4,
        }
    }
}

/// Tail of a model smile continued analytically from `cutoff`.
#[derive(Debug, Clone)]
pub struct SabrTailExtrapolation<F: VolatilityFunction = SabrHaganVolatilityFunction> {
    forward: f64,
    expiry: f64,
    cutoff: f64,
    mu: f64,
    side: TailSide,
    params: F::Params,
    function: F,
    config: SabrTailConfig,
    coefficients: [f64; 3],
    degenerate: bool,
}

impl<F: VolatilityFunction> SabrTailExtrapolation<F> {
    /// Fit the tail of `function` under `params` at `cutoff`.
    ///
    /// `mu > 0` sets the power decay on either side.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] for a non-positive forward,
    /// cutoff or `mu`, [`VolSmileError::NumericalError`] if the model price or
    /// its derivatives at the cutoff are unusable, and
    /// [`VolSmileError::FitFailure`] if the curvature equation has no root.
    pub fn new(
        forward: f64,
        params: F::Params,
        cutoff: f64,
        expiry: f64,
        mu: f64,
        side: TailSide,
        function: F,
    ) -> error::Result<Self> {
        Self::with_config(
            forward,
            params,
            cutoff,
            expiry,
            mu,
            side,
            function,
            SabrTailConfig::default(),
        )
    }

    /// [`new`](Self::new) with explicit thresholds.
    ///
    /// # Errors
    /// As [`new`](Self::new).
    #[allow(clippy::too_many_arguments)]
    pub fn with_config(
        forward: f64,
        params: F::Params,
        cutoff: f64,
        expiry: f64,
        mu: f64,
        side: TailSide,
        function: F,
        config: SabrTailConfig,
    ) -> error::Result<Self> {
        validate_positive(forward, "forward")?;
        validate_positive(cutoff, "cutoff")?;
        validate_non_negative(expiry, "expiry")?;
        validate_positive(mu, "mu")?;
        let mut tail = Self {
            forward,
            expiry,
            cutoff,
            mu,
            side,
            params,
            function,
            config,
            coefficients: [0.0; 3],
            degenerate: false,
        };
        let (coefficients, degenerate) = tail.fit(forward, &tail.params)?;
        tail.coefficients = coefficients;
        tail.degenerate = degenerate;

        #[cfg(feature = "logging")]
        tracing::debug!(
            cutoff,
            mu,
            side = ?side,
            a = coefficients[0],
            b = coefficients[1],
            c = coefficients[2],
            degenerate,
            "tail continuation fitted"
        );

        Ok(tail)
    }

    /// `(a, b, c)`.
    pub fn parameters(&self) -> [f64; 3] {
        self.coefficients
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    pub fn mu(&self) -> f64 {
        self.mu
    }

    pub fn side(&self) -> TailSide {
        self.side
    }

    /// Whether the tail was short-circuited to a zero price.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// Option type priced directly by the tail formula.
    fn tail_type(&self) -> OptionType {
        match self.side {
            TailSide::Left => OptionType::Put,
            TailSide::Right => OptionType::Call,
        }
    }

    /// Exponent basis `φ`, `φ'` and `φ''` at `k`.
    fn basis(&self, k: f64) -> [[f64; 3]; 3] {
        match self.side {
            TailSide::Right => {
                let k2 = k * k;
                [
                    [1.0, 1.0 / k, 1.0 / k2],
                    [0.0, -1.0 / k2, -2.0 / (k2 * k)],
                    [0.0, 2.0 / (k2 * k), 6.0 / (k2 * k2)],
                ]
            }
            TailSide::Left => [[1.0, k, k * k], [0.0, 1.0, 2.0 * k], [0.0, 0.0, 2.0]],
        }
    }

    /// Log price and its first two strike derivatives.
    fn log_price(&self, coefficients: &[f64; 3], k: f64) -> [f64; 3] {
        let power = match self.side {
            TailSide::Left => self.mu,
            TailSide::Right => -self.mu,
        };
        let [phi, d1, d2] = self.basis(k);
        let dot = |v: &[f64; 3]| v.iter().zip(coefficients).map(|(x, c)| x * c).sum::<f64>();
        [
            power * k.ln() + dot(&phi),
            power / k + dot(&d1),
            -power / (k * k) + dot(&d2),
        ]
    }

    fn price_with(&self, coefficients: &[f64; 3], forward: f64, strike: f64, option_type: OptionType) -> f64 {
        let tail = self.log_price(coefficients, strike)[0].exp();
        match (self.tail_type(), option_type) {
            (OptionType::Call, OptionType::Put) => tail - (forward - strike),
            (OptionType::Put, OptionType::Call) => tail + (forward - strike),
            _ => tail,
        }
    }

    /// Price and first two strike derivatives of the model at the cutoff.
    fn cutoff_values(&self, forward: f64, params: &F::Params) -> error::Result<[f64; 3]> {
        let (k, t) = (self.cutoff, self.expiry);
        let option_type = self.tail_type();
        let option = EuropeanOption::new(k, t, option_type);
        let adj = self.function.vol_adjoint2(&option, forward, params)?;
        let (s, s1, s2) = (adj.vol, adj.d_strike, adj.d2_strike2);

        let price = black_price(forward, k, t, s, option_type);
        let v = vega(forward, k, t, s);
        let first = dual_delta(forward, k, t, s, option_type) + v * s1;
        let second = dual_gamma(forward, k, t, s)
            + 2.0 * dual_vanna(forward, k, t, s) * s1
            + volga(forward, k, t, s) * s1 * s1
            + v * s2;
        Ok([price, first, second])
    }

    /// `(a, b, c)` matching the model at the cutoff, and whether the tail is degenerate.
    fn fit(&self, forward: f64, params: &F::Params) -> error::Result<([f64; 3], bool)> {
        let cfg = &self.config;
        if self.expiry < cfg.small_expiry {
            return Ok(([cfg.expired_parameter, 0.0, 0.0], true));
        }
        let [p, p1, p2] = self.cutoff_values(forward, params)?;
        if p.abs() < cfg.negligible_price && p1.abs() < cfg.negligible_price && p2.abs() < cfg.negligible_price {
            return Ok(([cfg.negligible_parameter, 0.0, 0.0], true));
        }
        if !(p > 0.0) {
            return Err(VolSmileError::NumericalError {
                message: format!("model price {p} at cutoff {} is not positive", self.cutoff),
            });
        }

        let (k, mu) = (self.cutoff, self.mu);
        let coefficients = match self.side {
            TailSide::Left => {
                let r1 = p1 / p;
                let c = 0.5 * (p2 / p - r1 * r1 + mu / (k * k));
                let b = r1 - mu / k - 2.0 * c * k;
                [p.ln() - mu * k.ln() - b * k - c * k * k, b, c]
            }
            TailSide::Right => {
                let k2 = k * k;
                let b_of = |c: f64| -2.0 * c / k - (p1 / p * k + mu) * k;
                let curvature = |c: f64| {
                    let b = b_of(c);
                    -p2 / p * k2 + mu * (mu + 1.0) + 2.0 * b * (mu + 1.0) / k
                        + (2.0 * c * (2.0 * mu + 3.0) + b * b) / k2
                        + 4.0 * b * c / (k2 * k)
                        + 4.0 * c * c / (k2 * k2)
                };
                let c = RidderRootFinder::with_accuracy(cfg.root_accuracy)
                    .find_root(&curvature, -1.0, 1.0)
                    .map_err(|e| VolSmileError::FitFailure {
                        message: format!("no curvature match at cutoff {k}: {e}"),
                        model: MODEL,
                        chi_square: None,
                    })?;
                let b = b_of(c);
                [(p / k.powf(-mu)).ln() - b / k - c / k2, b, c]
            }
        };
        if coefficients.iter().any(|c| !c.is_finite()) {
            return Err(VolSmileError::NumericalError {
                message: format!("non-finite tail coefficients {coefficients:?}"),
            });
        }
        Ok((coefficients, false))
    }

    /// Undiscounted price at `strike`.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] for a non-positive strike and
    /// [`VolSmileError::NumericalError`] if put/call parity yields a negative price.
    pub fn price(&self, strike: f64, option_type: OptionType) -> error::Result<f64> {
        validate_positive(strike, "strike")?;
        let price = self.price_with(&self.coefficients, self.forward, strike, option_type);
        if price < 0.0 || !price.is_finite() {
            return Err(VolSmileError::NumericalError {
                message: format!("extrapolated {option_type:?} price {price} at strike {strike}"),
            });
        }
        Ok(price)
    }

    /// `∂price/∂K`.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] for a non-positive strike.
    pub fn price_derivative_strike(&self, strike: f64, option_type: OptionType) -> error::Result<f64> {
        validate_positive(strike, "strike")?;
        let [l, l1, _] = self.log_price(&self.coefficients, strike);
        let tail = l.exp() * l1;
        Ok(match (self.tail_type(), option_type) {
            (OptionType::Call, OptionType::Put) => tail + 1.0,
            (OptionType::Put, OptionType::Call) => tail - 1.0,
            _ => tail,
        })
    }

    /// `∂price/∂F`, refitting the tail at bumped forwards.
    ///
    /// # Errors
    /// Propagates failures of the refits.
    pub fn price_derivative_forward(&self, strike: f64, option_type: OptionType) -> error::Result<f64> {
        validate_positive(strike, "strike")?;
        let h = self.config.fd_shift * self.forward;
        let (up, _) = self.fit(self.forward + h, &self.params)?;
        let (down, _) = self.fit(self.forward - h, &self.params)?;
        Ok((self.price_with(&up, self.forward + h, strike, option_type)
            - self.price_with(&down, self.forward - h, strike, option_type))
            / (2.0 * h))
    }

    /// `∂price/∂θᵢ` for every model parameter.
    ///
    /// The coefficient sensitivities solve `J·∂(a,b,c)/∂θ = ∂(P,P',P'')/∂θ`,
    /// where `J` is the Jacobian of the cutoff values in `(a, b, c)` and the
    /// right-hand side bumps each model parameter.
    ///
    /// # Errors
    /// Returns [`VolSmileError::NumericalError`] if `J` is singular or a
    /// bumped cutoff value is not finite.
    pub fn price_adjoint_params(&self, strike: f64, _option_type: OptionType) -> error::Result<Vec<f64>> {
        validate_positive(strike, "strike")?;
        let n = self.params.len();
        if self.degenerate {
            return Ok(vec![0.0; n]);
        }

        let k = self.cutoff;
        let [l, l1, l2] = self.log_price(&self.coefficients, k);
        let p = l.exp();
        let [phi, d1, d2] = self.basis(k);
        let jac = Matrix3::from_fn(|row, j| match row {
            0 => p * phi[j],
            1 => p * (phi[j] * l1 + d1[j]),
            _ => p * (phi[j] * (l2 + l1 * l1) + d2[j] + 2.0 * l1 * d1[j]),
        });
        let lu = jac.lu();

        let tail_price = self.log_price(&self.coefficients, strike)[0].exp();
        let [phi_k, _, _] = self.basis(strike);
        let shift = self.config.fd_shift;

        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            let Some(x) = self.params.get(i) else {
                return Err(VolSmileError::InvalidInput {
                    message: format!("parameter index {i} out of range"),
                });
            };
            let kind = FiniteDifference::choose(x, shift, |v| self.params.is_allowed(i, v));
            let fd = FiniteDifference::new(kind, shift);
            let mut rhs = Vector3::zeros();
            for row in 0..3 {
                let value = |v: f64| {
                    self.params
                        .with_parameter(i, v)
                        .and_then(|bumped| self.cutoff_values(self.forward, &bumped))
                        .map(|values| values[row])
                        .unwrap_or(f64::NAN)
                };
                rhs[row] = fd.derivative(&value, x);
            }
            let Some(d_coef) = lu.solve(&rhs) else {
                return Err(VolSmileError::NumericalError {
                    message: format!("singular tail Jacobian at cutoff {k}"),
                });
            };
            let d = tail_price * (0..3).map(|j| phi_k[j] * d_coef[j]).sum::<f64>();
            if !d.is_finite() {
                return Err(VolSmileError::NumericalError {
                    message: format!("non-finite tail sensitivity to parameter {i}"),
                });
            }
            out.push(d);
        }
        Ok(out)
    }

    /// Black volatility of the out-of-the-money extrapolated price.
    ///
    /// # Errors
    /// Returns an error if that price has no Black implied volatility.
    pub fn vol(&self, strike: f64) -> error::Result<f64> {
        let option_type = OptionType::otm(self.forward, strike);
        let price = self.price(strike, option_type)?;
        BlackImpliedVol::compute(price, self.forward, strike, self.expiry, option_type).map(|v| v.0)
    }
}

impl<F: VolatilityFunction> SmileSection for SabrTailExtrapolation<F> {
    fn vol(&self, strike: f64) -> error::Result<Vol> {
        SabrTailExtrapolation::vol(self, strike).map(Vol)
    }

    fn forward(&self) -> f64 {
        self.forward
    }

    fn expiry(&self) -> f64 {
        self.expiry
    }
}
