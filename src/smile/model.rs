//! Model families plugged into the smile interpolator.
//!
//! A [`SmileModelFamily`] supplies everything the generic interpolator needs
//! to know about one volatility model: the function itself, parameter
//! bounds, a heuristic global starting point and which parameters are held
//! fixed in the global and local fits.

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand::rngs::StdRng;

use crate::conventions::log_moneyness;
use crate::error::{self, VolSmileError};
use crate::optim::ParameterBound;
use crate::smile::fitter::SmileQuotes;
use crate::smile::function::VolatilityFunction;
use crate::smile::sabr::SabrHaganVolatilityFunction;

/// Box bounds on `(α, β, ρ, ν)` for a unit forward and vols of order one.
///
/// [`SabrModelFamily::bounds`] rescales the `α` ceiling to the quotes.
pub const SABR_BOUNDS: [ParameterBound; 4] = [
    ParameterBound::new(1e-8, 10.0),
    ParameterBound::new(0.0, 1.0),
    ParameterBound::new(-0.9999, 0.9999),
    ParameterBound::new(1e-8, 10.0),
];

/// Strategy describing one model family to the smile interpolator.
pub trait SmileModelFamily: Send + Sync {
    type Function: VolatilityFunction + Clone;

    fn function(&self) -> &Self::Function;

    /// Box bounds, one per parameter, for fitting `quotes`.
    fn bounds(&self, quotes: &SmileQuotes<'_>) -> Vec<ParameterBound>;

    /// Starting point for the global fit. `attempt == 0` is the deterministic
    /// heuristic; later attempts draw a randomized start from `rng`.
    ///
    /// # Errors
    /// Returns [`VolSmileError::NumericalError`] if no heuristic start can be formed.
    fn global_start(
        &self,
        quotes: &SmileQuotes<'_>,
        rng: &mut StdRng,
        attempt: usize,
    ) -> error::Result<Vec<f64>>;

    /// Parameters held constant in the global fit.
    fn global_fixed(&self) -> Vec<bool>;

    /// Parameters held constant in each local window fit.
    fn local_fixed(&self) -> Vec<bool>;
}

/// SABR (Hagan) family.
///
/// `beta` is free in the global fit unless supplied, and always held at the
/// global value in local fits.
#[derive(Debug, Clone, Default)]
pub struct SabrModelFamily {
    beta: Option<f64>,
    function: SabrHaganVolatilityFunction,
}

impl SabrModelFamily {
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] if `beta` is outside `[0, 1]`.
    pub fn new(beta: Option<f64>) -> error::Result<Self> {
        if let Some(b) = beta
            && !(0.0..=1.0).contains(&b)
        {
            return Err(VolSmileError::InvalidInput {
                message: format!("beta must be in [0, 1], got {b}"),
            });
        }
        Ok(Self {
            beta,
            function: SabrHaganVolatilityFunction,
        })
    }

    pub fn beta(&self) -> Option<f64> {
        self.beta
    }
}

/// Least-squares quadratic `σ ≈ a + b·x + c·x²` in log-moneyness `x`.
fn quadratic_fit(quotes: &SmileQuotes<'_>) -> Option<(f64, f64, f64)> {
    let xs: Vec<f64> = quotes
        .strikes
        .iter()
        .map(|&k| log_moneyness(k, quotes.forward))
        .collect();
    let a_mat = DMatrix::<f64>::from_fn(xs.len(), 3, |i, j| xs[i].powi(j as i32));
    let b_vec = DVector::from_column_slice(quotes.vols);
    let ata = a_mat.transpose() * &a_mat;
    let atb = a_mat.transpose() * &b_vec;
    let x = ata.qr().solve(&atb)?;
    x.iter().all(|v| v.is_finite()).then(|| (x[0], x[1], x[2]))
}

impl SmileModelFamily for SabrModelFamily {
    type Function = SabrHaganVolatilityFunction;

    fn function(&self) -> &SabrHaganVolatilityFunction {
        &self.function
    }

    /// `α` scales like `σ·F^(1−β)`, so its ceiling is
    /// `ALPHA_HEADROOM · max σ · F^(1−β)`, maximised over `β` when it is free.
    fn bounds(&self, quotes: &SmileQuotes<'_>) -> Vec<ParameterBound> {
        const ALPHA_HEADROOM: f64 = 10.0;

        let max_vol = quotes.vols.iter().copied().fold(0.0, f64::max);
        let f = quotes.forward;
        let scale = match self.beta {
            Some(beta) => f.powf(1.0 - beta),
            None => f.max(1.0),
        };
        let alpha_max = (ALPHA_HEADROOM * max_vol * scale).max(SABR_BOUNDS[0].lower);
        let mut bounds = SABR_BOUNDS.to_vec();
        bounds[0] = ParameterBound::new(SABR_BOUNDS[0].lower, alpha_max);
        bounds
    }

    /// Inverts the small-moneyness expansion of the Hagan formula,
    /// `σ(x) ≈ σ₀ + (ρν/2 − σ₀(1−β)/2)·x + …`, against a quadratic fit.
    fn global_start(
        &self,
        quotes: &SmileQuotes<'_>,
        rng: &mut StdRng,
        attempt: usize,
    ) -> error::Result<Vec<f64>> {
        /// Slope and curvature below which the smile is treated as flat.
        const FLAT: f64 = 1e-3;
        const MAX_RHO: f64 = 0.95;

        let (a, b, c) = quadratic_fit(quotes).ok_or_else(|| VolSmileError::NumericalError {
            message: "quadratic fit of the smile is singular".into(),
        })?;
        let f = quotes.forward;
        let beta = self.beta.unwrap_or(1.0);
        let atm = if a > 0.0 {
            a
        } else {
            quotes.vols.iter().sum::<f64>() / quotes.vols.len() as f64
        };

        let mut start = if b.abs() < FLAT && c.abs() < FLAT {
            vec![atm * f.powf(1.0 - beta), beta, 0.0, (4.0 * c).max(1e-3)]
        } else {
            let rho_nu = 2.0 * b + atm * (1.0 - beta);
            let nu2 = (atm * (12.0 * c - atm * (1.0 - beta).powi(2)) + 3.0 * rho_nu * rho_nu) / 2.0;
            let nu = if nu2 > 1e-4 { nu2.sqrt() } else { 0.01 };
            let nu = nu.max(rho_nu.abs() / MAX_RHO);
            let rho = (rho_nu / nu).clamp(-MAX_RHO, MAX_RHO);
            vec![atm * f.powf(1.0 - beta), beta, rho, nu]
        };

        if attempt > 0 {
            start[0] *= rng.gen_range(-0.5..0.5_f64).exp();
            if self.beta.is_none() {
                start[1] = rng.gen_range(0.0..1.0);
                start[0] = atm * f.powf(1.0 - start[1]) * rng.gen_range(-0.3..0.3_f64).exp();
            }
            start[2] = rng.gen_range(-0.9..0.9);
            start[3] = rng.gen_range(0.05..1.5);
        }

        Ok(start
            .iter()
            .zip(&self.bounds(quotes))
            .map(|(&v, bound)| bound.clamp(v))
            .collect())
    }

    fn global_fixed(&self) -> Vec<bool> {
        vec![false, self.beta.is_some(), false, false]
    }

    fn local_fixed(&self) -> Vec<bool> {
        vec![false, true, false, false]
    }
}
