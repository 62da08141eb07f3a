//! Least-squares calibration of a volatility model to a set of quotes.
//!
//! Residuals are error-weighted vol differences `(σ_model − σ_market) / error`,
//! so the reported chi-square is `Σ ((σ_model − σ_market) / error)²`.

use crate::error::{self, VolSmileError};
use crate::optim::{LeastSquaresSolver, ParameterBound};
use crate::smile::function::VolatilityFunction;
use crate::smile::parameters::ModelParameterVector;
use crate::types::{EuropeanOption, OptionType};
use crate::validate::{validate_positive, validate_smile_inputs};

/// Quotes of one smile slice, borrowed from the caller.
#[derive(Debug, Clone, Copy)]
pub struct SmileQuotes<'a> {
    pub forward: f64,
    pub expiry: f64,
    pub strikes: &'a [f64],
    pub vols: &'a [f64],
}

impl<'a> SmileQuotes<'a> {
    pub fn new(forward: f64, expiry: f64, strikes: &'a [f64], vols: &'a [f64]) -> Self {
        Self {
            forward,
            expiry,
            strikes,
            vols,
        }
    }

    /// Quotes `start..start + len`.
    pub fn window(&self, start: usize, len: usize) -> SmileQuotes<'a> {
        SmileQuotes {
            strikes: &self.strikes[start..start + len],
            vols: &self.vols[start..start + len],
            ..*self
        }
    }

    pub fn len(&self) -> usize {
        self.strikes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strikes.is_empty()
    }
}

/// Calibrated parameters and fit quality.
#[derive(Debug, Clone, PartialEq)]
pub struct FitResult<P> {
    pub parameters: P,
    pub chi_square: f64,
    /// Whether the solver met a convergence criterion.
    pub converged: bool,
}

/// Fits one volatility model to a set of quotes with an injected solver.
pub struct SmileModelFitter<'a, F: VolatilityFunction> {
    quotes: SmileQuotes<'a>,
    errors: Vec<f64>,
    function: &'a F,
    bounds: Vec<ParameterBound>,
    solver: &'a dyn LeastSquaresSolver,
}

impl<'a, F: VolatilityFunction> SmileModelFitter<'a, F> {
    /// Fitter with the same target error on every quote.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] for invalid quotes or a
    /// non-positive error.
    pub fn new(
        quotes: SmileQuotes<'a>,
        error: f64,
        function: &'a F,
        bounds: &[ParameterBound],
        solver: &'a dyn LeastSquaresSolver,
    ) -> error::Result<Self> {
        validate_smile_inputs(quotes.forward, quotes.strikes, quotes.expiry, quotes.vols, 1)?;
        validate_positive(error, "fit error")?;
        Ok(Self {
            errors: vec![error; quotes.len()],
            quotes,
            function,
            bounds: bounds.to_vec(),
            solver,
        })
    }

    fn option(&self, strike: f64) -> EuropeanOption {
        EuropeanOption::new(
            strike,
            self.quotes.expiry,
            OptionType::otm(self.quotes.forward, strike),
        )
    }

    /// Error-weighted residuals at a flat parameter vector.
    ///
    /// Parameter vectors the model rejects, and model evaluations that fail,
    /// produce NaN residuals so a solver treats the point as unusable.
    pub fn residuals(&self, values: &[f64]) -> Vec<f64> {
        let Ok(params) = F::Params::from_slice(values) else {
            return vec![f64::NAN; self.quotes.len()];
        };
        self.quotes
            .strikes
            .iter()
            .zip(self.quotes.vols)
            .zip(&self.errors)
            .map(|((&k, &v), &e)| {
                match self.function.vol(&self.option(k), self.quotes.forward, &params) {
                    Ok(model) => (model - v) / e,
                    Err(_) => f64::NAN,
                }
            })
            .collect()
    }

    /// Chi-square of `params` against the quotes.
    ///
    /// # Errors
    /// Propagates model evaluation failures.
    pub fn chi_square(&self, params: &F::Params) -> error::Result<f64> {
        let mut chi2 = 0.0;
        for ((&k, &v), &e) in self.quotes.strikes.iter().zip(self.quotes.vols).zip(&self.errors) {
            let model = self.function.vol(&self.option(k), self.quotes.forward, params)?;
            chi2 += ((model - v) / e).powi(2);
        }
        Ok(chi2)
    }

    /// Calibrate from `start`, holding parameters flagged in `fixed` constant.
    ///
    /// # Errors
    /// Returns [`VolSmileError::FitFailure`] if the solver cannot start or
    /// ends on a parameter vector the model rejects.
    pub fn solve(&self, start: &[f64], fixed: &[bool]) -> error::Result<FitResult<F::Params>> {
        let residuals = |x: &[f64]| self.residuals(x);
        let result = self
            .solver
            .solve(start, fixed, &self.bounds, &residuals, None)
            .map_err(|e| VolSmileError::FitFailure {
                message: format!("least-squares solve failed: {e}"),
                model: self.function.name(),
                chi_square: None,
            })?;
        let parameters = F::Params::from_slice(&result.parameters).map_err(|e| {
            VolSmileError::FitFailure {
                message: format!("solver returned invalid parameters: {e}"),
                model: self.function.name(),
                chi_square: Some(result.chi_square),
            }
        })?;
        Ok(FitResult {
            parameters,
            chi_square: result.chi_square,
            converged: result.converged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::LevenbergMarquardt;
    use crate::smile::model::{SABR_BOUNDS, SabrModelFamily, SmileModelFamily};
    use crate::smile::sabr::{SabrHaganVolatilityFunction, SabrParameters};
    use approx::assert_abs_diff_eq;

    const F: f64 = 100.0;
    const T: f64 = 1.0;

    fn sabr_quotes(params: &SabrParameters, strikes: &[f64]) -> Vec<f64> {
        strikes
            .iter()
            .map(|&k| SabrHaganVolatilityFunction::hagan_vol(F, k, T, params).unwrap())
            .collect()
    }

    #[test]
    fn recovers_generating_parameters() {
        let truth = SabrParameters::new(0.2, 1.0, -0.3, 0.4).unwrap();
        let strikes = [70.0, 85.0, 100.0, 115.0, 130.0];
        let vols = sabr_quotes(&truth, &strikes);
        let lm = LevenbergMarquardt::default();
        let fitter = SmileModelFitter::new(
            SmileQuotes::new(F, T, &strikes, &vols),
            1e-4,
            &SabrHaganVolatilityFunction,
            &SABR_BOUNDS,
            &lm,
        )
        .unwrap();
        let fit = fitter
            .solve(&[0.25, 1.0, 0.0, 0.3], &[false, true, false, false])
            .unwrap();
        assert!(fit.chi_square < 1e-8);
        assert_abs_diff_eq!(fit.parameters.alpha(), 0.2, epsilon = 1e-5);
        assert_abs_diff_eq!(fit.parameters.rho(), -0.3, epsilon = 1e-4);
        assert_abs_diff_eq!(fit.parameters.nu(), 0.4, epsilon = 1e-4);
        assert_eq!(fit.parameters.beta(), 1.0);
    }

    #[test]
    fn chi_square_is_error_weighted() {
        let p = SabrParameters::new(0.2, 1.0, 0.0, 0.0).unwrap();
        let strikes = [100.0];
        // ν = 0, β = 1: flat 0.2 vol; quote 1bp away.
        let vols = [0.2001];
        let lm = LevenbergMarquardt::default();
        let fitter = SmileModelFitter::new(
            SmileQuotes::new(F, T, &strikes, &vols),
            1e-4,
            &SabrHaganVolatilityFunction,
            &SABR_BOUNDS,
            &lm,
        )
        .unwrap();
        assert_abs_diff_eq!(fitter.chi_square(&p).unwrap(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn invalid_vector_gives_nan_residuals() {
        let strikes = [90.0, 100.0, 110.0];
        let vols = [0.2, 0.2, 0.2];
        let lm = LevenbergMarquardt::default();
        let fitter = SmileModelFitter::new(
            SmileQuotes::new(F, T, &strikes, &vols),
            1e-4,
            &SabrHaganVolatilityFunction,
            &SABR_BOUNDS,
            &lm,
        )
        .unwrap();
        assert!(fitter.residuals(&[0.2, 2.0, 0.0, 0.1]).iter().all(|r| r.is_nan()));
    }

    #[test]
    fn rejects_unsorted_quotes() {
        let strikes = [100.0, 90.0, 110.0];
        let vols = [0.2, 0.2, 0.2];
        let lm = LevenbergMarquardt::default();
        let family = SabrModelFamily::default();
        let r = SmileModelFitter::new(
            SmileQuotes::new(F, T, &strikes, &vols),
            1e-4,
            family.function(),
            &SABR_BOUNDS,
            &lm,
        );
        assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
    }

    #[test]
    fn window_slices_quotes() {
        let strikes = [80.0, 90.0, 100.0, 110.0];
        let vols = [0.3, 0.25, 0.2, 0.22];
        let q = SmileQuotes::new(F, T, &strikes, &vols);
        let w = q.window(1, 3);
        assert_eq!(w.strikes, &[90.0, 100.0, 110.0]);
        assert_eq!(w.vols, &[0.25, 0.2, 0.22]);
        assert_eq!(w.forward, F);
    }
}
