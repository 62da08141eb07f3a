//! Piecewise smile interpolation by blended local model fits.
//!
//! The interpolator first fits the model to every quote (the global fit),
//! then fits each run of three consecutive quotes (a window) starting from
//! the previous window's result. Between two interior knots the smile is a
//! [`WeightingFunction`] blend of the two windows that share that interval;
//! both reproduce the quote at the shared knots, so the blend is continuous.
//!
//! ```
//! use volsmile::smile::{SabrModelFamily, SmileInterpolator, SmileSection};
//!
//! let strikes = [80.0, 90.0, 100.0, 110.0, 120.0];
//! let vols = [0.28, 0.24, 0.21, 0.20, 0.205];
//!
//! let mut interpolator = SmileInterpolator::builder(SabrModelFamily::default())
//!     .weighting("Sine")
//!     .seed(42)
//!     .build()?;
//! let smile = interpolator.fit(100.0, &strikes, 1.0, &vols)?;
//! assert!(smile.vol(95.0)?.0 > 0.0);
//! # Ok::<(), volsmile::VolSmileError>(())
//! ```

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::error::{self, VolSmileError};
use crate::optim::{LeastSquaresSolver, LevenbergMarquardt, ParameterBound};
use crate::smile::SmileSection;
use crate::smile::fitter::{FitResult, SmileModelFitter, SmileQuotes};
use crate::smile::function::VolatilityFunction;
use crate::smile::model::SmileModelFamily;
use crate::smile::parameters::ModelParameterVector;
use crate::smile::weighting::{WeightingFunction, weighting_function};
use crate::types::{EuropeanOption, OptionType, Vol};
use crate::validate::{validate_positive, validate_smile_inputs};

/// Quotes per local window.
const WINDOW: usize = 3;

/// Retry budgets and tolerances of the interpolator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmileInterpolatorConfig {
    /// Target vol error per quote used to weight residuals.
    pub fit_error: f64,
    /// Maximum number of global solve attempts.
    pub max_tries: usize,
    /// Maximum number of successful global solves to compare.
    pub max_count: usize,
    /// The global fit is accepted once chi-square ≤ factor · n.
    pub global_chi_square_factor: f64,
    /// A local window is retried while its chi-square exceeds this.
    pub local_chi_square_threshold: f64,
    pub local_max_retries: usize,
    /// Registry name of the blend curve.
    pub weighting: String,
    /// Seed of the interpolator's random restart generator.
    pub seed: u64,
}

impl Default for SmileInterpolatorConfig {
    fn default() -> Self {
        Self {
            fit_error: 1e-4,
            max_tries: 20,
            max_count: 5,
            global_chi_square_factor: 100.0,
            local_chi_square_threshold: 3.0,
            local_max_retries: 10,
            weighting: "Sine".into(),
            seed: 0,
        }
    }
}

/// How a fitted smile was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitState {
    /// Local window fits succeeded (or only three quotes were given).
    Refined,
    /// The local procedure failed; the smile is the global fit alone.
    DegradedGlobalOnly,
}

/// Calibrates an [`InterpolatedSmile`] for one model family.
///
/// Owns its random restart generator, seeded from
/// [`SmileInterpolatorConfig::seed`] at construction, so separate
/// interpolators can fit different slices concurrently and reproducibly.
pub struct SmileInterpolator<M: SmileModelFamily> {
    model: M,
    config: SmileInterpolatorConfig,
    weighting: &'static dyn WeightingFunction,
    solver: Box<dyn LeastSquaresSolver>,
    rng: StdRng,
}

impl<M: SmileModelFamily> std::fmt::Debug for SmileInterpolator<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmileInterpolator")
            .field("model", &self.model.function().name())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<M: SmileModelFamily> SmileInterpolator<M> {
    /// Interpolator with the given configuration and a default Levenberg–Marquardt solver.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] for an unknown weighting name or
    /// invalid tolerances.
    pub fn new(model: M, config: SmileInterpolatorConfig) -> error::Result<Self> {
        Self::builder(model).config(config).build()
    }

    pub fn builder(model: M) -> SmileInterpolatorBuilder<M> {
        SmileInterpolatorBuilder::new(model)
    }

    pub fn config(&self) -> &SmileInterpolatorConfig {
        &self.config
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Fit a smile to `(strike, vol)` quotes at one forward and expiry.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] for fewer than three quotes,
    /// non-ascending strikes or mismatched lengths, and
    /// [`VolSmileError::FitFailure`] when no global solve converges within
    /// `max_tries` attempts.
    pub fn fit(
        &mut self,
        forward: f64,
        strikes: &[f64],
        expiry: f64,
        vols: &[f64],
    ) -> error::Result<InterpolatedSmile<M::Function>> {
        validate_smile_inputs(forward, strikes, expiry, vols, WINDOW)?;
        let quotes = SmileQuotes::new(forward, expiry, strikes, vols);
        let bounds = self.model.bounds(&quotes);

        #[cfg(feature = "logging")]
        tracing::debug!(
            forward,
            expiry,
            n_quotes = strikes.len(),
            model = self.model.function().name(),
            "smile interpolation started"
        );

        let global = self.global_fit(&quotes, &bounds)?;

        let (fits, state) = if strikes.len() == WINDOW {
            (vec![global], FitState::Refined)
        } else {
            match self.local_fits(&quotes, &bounds, &global) {
                Ok(fits) => (fits, FitState::Refined),
                Err(_e) => {
                    #[cfg(feature = "logging")]
                    tracing::warn!(error = %_e, "local fits failed, falling back to global fit only");
                    let global = self.global_fit(&quotes, &bounds)?;
                    (vec![global], FitState::DegradedGlobalOnly)
                }
            }
        };

        #[cfg(feature = "logging")]
        tracing::debug!(n_fits = fits.len(), state = ?state, "smile interpolation complete");

        Ok(InterpolatedSmile {
            forward,
            expiry,
            strikes: strikes.to_vec(),
            fits,
            function: self.model.function().clone(),
            weighting: self.weighting,
            state,
        })
    }

    fn fitter<'a>(
        &'a self,
        quotes: SmileQuotes<'a>,
        bounds: &[ParameterBound],
    ) -> error::Result<SmileModelFitter<'a, M::Function>> {
        SmileModelFitter::new(
            quotes,
            self.config.fit_error,
            self.model.function(),
            bounds,
            self.solver.as_ref(),
        )
    }

    /// Best of up to `max_count` converged solves from fresh starts, stopping
    /// early once chi-square is within `factor · n`.
    fn global_fit(
        &mut self,
        quotes: &SmileQuotes<'_>,
        bounds: &[ParameterBound],
    ) -> error::Result<FitResult<<M::Function as VolatilityFunction>::Params>> {
        let cfg = self.config.clone();
        let target = cfg.global_chi_square_factor * quotes.len() as f64;
        let fixed = self.model.global_fixed();

        let mut best: Option<FitResult<_>> = None;
        let mut unconverged_chi_square: Option<f64> = None;
        let mut tries = 0usize;
        let mut count = 0usize;
        while best.as_ref().is_none_or(|b| b.chi_square > target) && count < cfg.max_count {
            if tries >= cfg.max_tries {
                break;
            }
            let start = self.model.global_start(quotes, &mut self.rng, tries)?;
            tries += 1;
            match self.fitter(*quotes, bounds)?.solve(&start, &fixed) {
                Ok(fit) if fit.converged => {
                    count += 1;
                    if best.as_ref().is_none_or(|b| fit.chi_square < b.chi_square) {
                        best = Some(fit);
                    }
                }
                Ok(fit) => {
                    #[cfg(feature = "logging")]
                    tracing::warn!(
                        attempt = tries,
                        chi_square = fit.chi_square,
                        "global fit attempt did not converge, retrying"
                    );
                    if unconverged_chi_square.is_none_or(|c| fit.chi_square < c) {
                        unconverged_chi_square = Some(fit.chi_square);
                    }
                }
                Err(_e) => {
                    #[cfg(feature = "logging")]
                    tracing::warn!(attempt = tries, error = %_e, "global fit attempt failed, retrying");
                }
            }
        }

        let Some(best) = best else {
            return Err(VolSmileError::FitFailure {
                message: format!("no global fit converged in {tries} attempts"),
                model: self.model.function().name(),
                chi_square: unconverged_chi_square,
            });
        };

        #[cfg(feature = "logging")]
        {
            if best.chi_square > target {
                tracing::warn!(
                    chi_square = best.chi_square,
                    target,
                    tries,
                    "global fit above target chi-square, keeping best result"
                );
            } else {
                tracing::debug!(chi_square = best.chi_square, tries, "global fit complete");
            }
        }

        Ok(best)
    }

    /// One fit per window of three consecutive quotes, each seeded from the
    /// previous window. Windows above the chi-square threshold are retried,
    /// first from the global fit and then from randomized global starts.
    fn local_fits(
        &mut self,
        quotes: &SmileQuotes<'_>,
        bounds: &[ParameterBound],
        global: &FitResult<<M::Function as VolatilityFunction>::Params>,
    ) -> error::Result<Vec<FitResult<<M::Function as VolatilityFunction>::Params>>> {
        let cfg = self.config.clone();
        let fixed = self.model.local_fixed();
        let global_values = global.parameters.to_vec();
        let n_windows = quotes.len() - WINDOW + 1;

        let mut fits = Vec::with_capacity(n_windows);
        let mut start = global_values.clone();
        for i in 0..n_windows {
            let window = quotes.window(i, WINDOW);
            let mut best = self.fitter(window, bounds)?.solve(&start, &fixed).ok();

            let mut retries = 0usize;
            while best
                .as_ref()
                .is_none_or(|b| b.chi_square > cfg.local_chi_square_threshold)
                && retries < cfg.local_max_retries
            {
                let retry_start = if retries == 0 {
                    global_values.clone()
                } else {
                    let mut s = self.model.global_start(quotes, &mut self.rng, retries)?;
                    for (j, &is_fixed) in fixed.iter().enumerate() {
                        if is_fixed {
                            s[j] = global_values[j];
                        }
                    }
                    s
                };
                retries += 1;
                if let Ok(fit) = self.fitter(window, bounds)?.solve(&retry_start, &fixed)
                    && best.as_ref().is_none_or(|b| fit.chi_square < b.chi_square)
                {
                    best = Some(fit);
                }
            }

            let Some(best) = best else {
                return Err(VolSmileError::FitFailure {
                    message: format!("local fit of window {i} failed in every attempt"),
                    model: self.model.function().name(),
                    chi_square: None,
                });
            };

            #[cfg(feature = "logging")]
            {
                if best.chi_square > cfg.local_chi_square_threshold {
                    tracing::warn!(
                        window = i,
                        chi_square = best.chi_square,
                        retries,
                        "local fit above threshold, keeping best result"
                    );
                }
            }

            start = best.parameters.to_vec();
            fits.push(best);
        }
        Ok(fits)
    }
}

/// Builder for [`SmileInterpolator`].
pub struct SmileInterpolatorBuilder<M: SmileModelFamily> {
    model: M,
    config: SmileInterpolatorConfig,
    solver: Option<Box<dyn LeastSquaresSolver>>,
}

impl<M: SmileModelFamily> SmileInterpolatorBuilder<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            config: SmileInterpolatorConfig::default(),
            solver: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SmileInterpolatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Blend curve by registry name ("Linear", "Sine", "Cosine").
    pub fn weighting(mut self, name: &str) -> Self {
        self.config.weighting = name.to_string();
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Target vol error per quote.
    pub fn fit_error(mut self, error: f64) -> Self {
        self.config.fit_error = error;
        self
    }

    /// Least-squares solver used for every global and local fit.
    pub fn solver(mut self, solver: Box<dyn LeastSquaresSolver>) -> Self {
        self.solver = Some(solver);
        self
    }

    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] for an unknown weighting name,
    /// a non-positive fit error or chi-square bound, or a zero retry budget.
    pub fn build(self) -> error::Result<SmileInterpolator<M>> {
        let cfg = self.config;
        validate_positive(cfg.fit_error, "fit_error")?;
        validate_positive(cfg.global_chi_square_factor, "global_chi_square_factor")?;
        validate_positive(cfg.local_chi_square_threshold, "local_chi_square_threshold")?;
        if cfg.max_tries == 0 || cfg.max_count == 0 {
            return Err(VolSmileError::InvalidInput {
                message: "max_tries and max_count must be at least 1".into(),
            });
        }
        let weighting = weighting_function(&cfg.weighting)?;
        Ok(SmileInterpolator {
            model: self.model,
            rng: StdRng::seed_from_u64(cfg.seed),
            config: cfg,
            weighting,
            solver: self
                .solver
                .unwrap_or_else(|| Box::new(LevenbergMarquardt::default())),
        })
    }
}

/// A fitted smile: one parameter set per window, blended between knots.
#[derive(Debug, Clone)]
pub struct InterpolatedSmile<F: VolatilityFunction> {
    forward: f64,
    expiry: f64,
    strikes: Vec<f64>,
    fits: Vec<FitResult<F::Params>>,
    function: F,
    weighting: &'static dyn WeightingFunction,
    state: FitState,
}

impl<F: VolatilityFunction> InterpolatedSmile<F> {
    /// Quoted strikes the smile was fitted to.
    pub fn strikes(&self) -> &[f64] {
        &self.strikes
    }

    /// One result per window, or a single global result.
    pub fn fit_results(&self) -> &[FitResult<F::Params>] {
        &self.fits
    }

    pub fn state(&self) -> FitState {
        self.state
    }

    pub fn weighting(&self) -> &'static dyn WeightingFunction {
        self.weighting
    }

    fn model_vol(&self, fit: usize, strike: f64) -> error::Result<f64> {
        let option = EuropeanOption::new(strike, self.expiry, OptionType::otm(self.forward, strike));
        self.function.vol(&option, self.forward, &self.fits[fit].parameters)
    }

    /// Blended volatility at `strike`.
    fn blended_vol(&self, strike: f64) -> error::Result<f64> {
        let n = self.strikes.len();
        let last = self.fits.len() - 1;
        if last == 0 {
            return self.model_vol(0, strike);
        }
        let index = self
            .strikes
            .partition_point(|&k| k <= strike)
            .saturating_sub(1);
        if index == 0 {
            return self.model_vol(0, strike);
        }
        if index >= n - 2 {
            return self.model_vol(last, strike);
        }
        let w = self.weighting.weight_at(&self.strikes, index, strike)?;
        if w == 1.0 {
            return self.model_vol(index - 1, strike);
        }
        if w == 0.0 {
            return self.model_vol(index, strike);
        }
        Ok(w * self.model_vol(index - 1, strike)? + (1.0 - w) * self.model_vol(index, strike)?)
    }
}

impl<F: VolatilityFunction> SmileSection for InterpolatedSmile<F> {
    fn vol(&self, strike: f64) -> error::Result<Vol> {
        validate_positive(strike, "strike")?;
        self.blended_vol(strike).map(Vol)
    }

    fn forward(&self) -> f64 {
        self.forward
    }

    fn expiry(&self) -> f64 {
        self.expiry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::LeastSquaresResult;
    use crate::optim::least_squares::{JacobianFn, ResidualFn};
    use crate::smile::model::SabrModelFamily;
    use crate::smile::sabr::{SabrHaganVolatilityFunction, SabrParameters};
    use approx::assert_abs_diff_eq;

    const F: f64 = 100.0;
    const T: f64 = 1.0;

    fn interpolator(beta: Option<f64>) -> SmileInterpolator<SabrModelFamily> {
        SmileInterpolator::builder(SabrModelFamily::new(beta).unwrap())
            .seed(42)
            .build()
            .unwrap()
    }

    fn sabr_vols(strikes: &[f64], p: &SabrParameters) -> Vec<f64> {
        strikes
            .iter()
            .map(|&k| SabrHaganVolatilityFunction::hagan_vol(F, k, T, p).unwrap())
            .collect()
    }

    // --- Validation ---

    #[test]
    fn rejects_fewer_than_three_quotes() {
        let r = interpolator(None).fit(F, &[90.0, 100.0], T, &[0.2, 0.2]);
        assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
    }

    #[test]
    fn rejects_unsorted_strikes() {
        let r = interpolator(None).fit(F, &[90.0, 110.0, 100.0], T, &[0.2, 0.2, 0.2]);
        assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
    }

    #[test]
    fn rejects_length_mismatch() {
        let r = interpolator(None).fit(F, &[90.0, 100.0, 110.0], T, &[0.2, 0.2]);
        assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
    }

    #[test]
    fn builder_rejects_unknown_weighting() {
        let r = SmileInterpolator::builder(SabrModelFamily::default())
            .weighting("Quartic")
            .build();
        assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
    }

    #[test]
    fn builder_rejects_zero_fit_error() {
        let r = SmileInterpolator::builder(SabrModelFamily::default())
            .fit_error(0.0)
            .build();
        assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
    }

    // --- Flat smile ---

    #[test]
    fn flat_smile_is_preserved() {
        let strikes = [80.0, 90.0, 100.0, 110.0, 120.0];
        let smile = interpolator(None).fit(F, &strikes, T, &[0.2; 5]).unwrap();
        assert_eq!(smile.state(), FitState::Refined);
        assert_eq!(smile.fit_results().len(), 3);
        for k in [80.0, 85.0, 95.0, 100.0, 117.0] {
            assert_abs_diff_eq!(smile.vol(k).unwrap().0, 0.2, epsilon = 1e-6);
        }
    }

    // --- Exact reproduction of model-generated quotes ---

    #[test]
    fn reproduces_sabr_quotes() {
        let truth = SabrParameters::new(0.2, 1.0, -0.3, 0.4).unwrap();
        let strikes = [70.0, 80.0, 90.0, 100.0, 110.0, 120.0, 130.0];
        let vols = sabr_vols(&strikes, &truth);
        let smile = interpolator(None).fit(F, &strikes, T, &vols).unwrap();
        for (&k, &v) in strikes.iter().zip(&vols) {
            assert_abs_diff_eq!(smile.vol(k).unwrap().0, v, epsilon = 1e-4);
        }
        // Between knots the blend stays on the generating smile.
        let mid = SabrHaganVolatilityFunction::hagan_vol(F, 95.0, T, &truth).unwrap();
        assert_abs_diff_eq!(smile.vol(95.0).unwrap().0, mid, epsilon = 1e-4);
    }

    #[test]
    fn reproduces_quotes_with_fixed_beta() {
        let truth = SabrParameters::new(2.0, 0.5, -0.2, 0.5).unwrap();
        let strikes = [80.0, 90.0, 100.0, 110.0, 120.0];
        let vols = sabr_vols(&strikes, &truth);
        let smile = interpolator(Some(0.5)).fit(F, &strikes, T, &vols).unwrap();
        for fit in smile.fit_results() {
            assert_eq!(fit.parameters.beta(), 0.5);
        }
        for (&k, &v) in strikes.iter().zip(&vols) {
            assert_abs_diff_eq!(smile.vol(k).unwrap().0, v, epsilon = 1e-4);
        }
    }

    // --- Three quotes: the global fit is the only fit ---

    #[test]
    fn three_quotes_use_global_fit_everywhere() {
        let strikes = [90.0, 100.0, 110.0];
        let vols = [0.25, 0.2, 0.22];
        let smile = interpolator(None).fit(F, &strikes, T, &vols).unwrap();
        assert_eq!(smile.fit_results().len(), 1);
        let p = smile.fit_results()[0].parameters;
        for k in [60.0, 90.0, 95.0, 105.0, 150.0] {
            let direct = SabrHaganVolatilityFunction::hagan_vol(F, k, T, &p).unwrap();
            assert_eq!(smile.vol(k).unwrap().0, direct);
        }
    }

    // --- Blend ---

    #[test]
    fn knots_use_single_window() {
        let strikes = [70.0, 80.0, 90.0, 100.0, 110.0, 120.0];
        let vols = [0.32, 0.28, 0.245, 0.22, 0.205, 0.2];
        let smile = interpolator(None).fit(F, &strikes, T, &vols).unwrap();
        // At an interior knot the weight is exactly 1: window index − 1 alone.
        let p = smile.fit_results()[1].parameters;
        let direct = SabrHaganVolatilityFunction::hagan_vol(F, 90.0, T, &p).unwrap();
        assert_eq!(smile.vol(90.0).unwrap().0, direct);
    }

    #[test]
    fn blend_is_continuous_across_knots() {
        let strikes = [70.0, 80.0, 90.0, 100.0, 110.0, 120.0];
        let vols = [0.32, 0.28, 0.245, 0.22, 0.205, 0.2];
        let smile = interpolator(None).fit(F, &strikes, T, &vols).unwrap();
        for &k in &strikes[1..strikes.len() - 1] {
            let left = smile.vol(k - 1e-7).unwrap().0;
            let right = smile.vol(k + 1e-7).unwrap().0;
            let at = smile.vol(k).unwrap().0;
            assert_abs_diff_eq!(left, at, epsilon = 1e-6);
            assert_abs_diff_eq!(right, at, epsilon = 1e-6);
        }
    }

    #[test]
    fn rejects_non_positive_query_strike() {
        let smile = interpolator(None)
            .fit(F, &[90.0, 100.0, 110.0], T, &[0.25, 0.2, 0.22])
            .unwrap();
        assert!(matches!(smile.vol(0.0), Err(VolSmileError::InvalidInput { .. })));
    }

    #[test]
    fn same_seed_same_smile() {
        let strikes = [70.0, 80.0, 90.0, 100.0, 110.0, 120.0];
        let vols = [0.32, 0.28, 0.245, 0.22, 0.205, 0.2];
        let a = interpolator(None).fit(F, &strikes, T, &vols).unwrap();
        let b = interpolator(None).fit(F, &strikes, T, &vols).unwrap();
        for k in [75.0, 95.0, 115.0] {
            assert_eq!(a.vol(k).unwrap().0, b.vol(k).unwrap().0);
        }
    }

    // --- Forward scale ---

    fn reproduces_at_scale(forward: f64, truth: SabrParameters, strikes: &[f64]) {
        let vols: Vec<f64> = strikes
            .iter()
            .map(|&k| SabrHaganVolatilityFunction::hagan_vol(forward, k, T, &truth).unwrap())
            .collect();
        let mut interpolator = SmileInterpolator::builder(SabrModelFamily::new(Some(truth.beta())).unwrap())
            .seed(42)
            .build()
            .unwrap();
        let smile = interpolator.fit(forward, strikes, T, &vols).unwrap();
        assert_eq!(smile.state(), FitState::Refined);
        for (&k, &v) in strikes.iter().zip(&vols) {
            assert_abs_diff_eq!(smile.vol(k).unwrap().0, v, epsilon = 1e-4);
        }
        for fit in smile.fit_results() {
            assert_abs_diff_eq!(fit.parameters.alpha(), truth.alpha(), epsilon = 0.1 * truth.alpha());
        }
    }

    #[test]
    fn normal_sabr_on_equity_forward_is_reproduced() {
        let truth = SabrParameters::new(20.0, 0.0, -0.3, 0.4).unwrap();
        reproduces_at_scale(100.0, truth, &[80.0, 90.0, 100.0, 110.0, 120.0]);
    }

    #[test]
    fn cev_sabr_on_index_forward_is_reproduced() {
        let alpha = 0.2 * 5000.0_f64.sqrt();
        let truth = SabrParameters::new(alpha, 0.5, -0.2, 0.5).unwrap();
        reproduces_at_scale(5000.0, truth, &[4000.0, 4500.0, 5000.0, 5500.0, 6000.0]);
    }

    // --- Solver failures ---

    /// Levenberg–Marquardt on the full slice; refuses every three-quote window.
    struct GlobalOnlySolver(LevenbergMarquardt);

    impl LeastSquaresSolver for GlobalOnlySolver {
        fn solve(
            &self,
            initial: &[f64],
            fixed: &[bool],
            bounds: &[ParameterBound],
            residuals: &ResidualFn<'_>,
            jacobian: Option<&JacobianFn<'_>>,
        ) -> error::Result<LeastSquaresResult> {
            if residuals(initial).len() <= WINDOW {
                return Err(VolSmileError::NumericalError {
                    message: "window refused".into(),
                });
            }
            self.0.solve(initial, fixed, bounds, residuals, jacobian)
        }
    }

    /// Returns the starting point without ever converging.
    struct StalledSolver;

    impl LeastSquaresSolver for StalledSolver {
        fn solve(
            &self,
            initial: &[f64],
            _fixed: &[bool],
            _bounds: &[ParameterBound],
            residuals: &ResidualFn<'_>,
            _jacobian: Option<&JacobianFn<'_>>,
        ) -> error::Result<LeastSquaresResult> {
            let chi_square = residuals(initial).iter().map(|r| r * r).sum();
            Ok(LeastSquaresResult {
                parameters: initial.to_vec(),
                chi_square,
                converged: false,
                iterations: 0,
            })
        }
    }

    struct FailingSolver;

    impl LeastSquaresSolver for FailingSolver {
        fn solve(
            &self,
            _initial: &[f64],
            _fixed: &[bool],
            _bounds: &[ParameterBound],
            _residuals: &ResidualFn<'_>,
            _jacobian: Option<&JacobianFn<'_>>,
        ) -> error::Result<LeastSquaresResult> {
            Err(VolSmileError::NumericalError {
                message: "solver unavailable".into(),
            })
        }
    }

    #[test]
    fn failed_windows_degrade_to_global_fit() {
        let truth = SabrParameters::new(0.2, 1.0, -0.3, 0.4).unwrap();
        let strikes = [80.0, 90.0, 100.0, 110.0, 120.0];
        let vols = sabr_vols(&strikes, &truth);
        let mut interpolator = SmileInterpolator::builder(SabrModelFamily::new(Some(1.0)).unwrap())
            .solver(Box::new(GlobalOnlySolver(LevenbergMarquardt::default())))
            .build()
            .unwrap();
        let smile = interpolator.fit(F, &strikes, T, &vols).unwrap();
        assert_eq!(smile.state(), FitState::DegradedGlobalOnly);
        assert_eq!(smile.fit_results().len(), 1);
        let p = smile.fit_results()[0].parameters;
        for k in [75.0, 90.0, 97.0, 113.0, 140.0] {
            let global = SabrHaganVolatilityFunction::hagan_vol(F, k, T, &p).unwrap();
            assert_eq!(smile.vol(k).unwrap().0, global);
        }
        for (&k, &v) in strikes.iter().zip(&vols) {
            assert_abs_diff_eq!(smile.vol(k).unwrap().0, v, epsilon = 1e-4);
        }
    }

    #[test]
    fn unconverged_global_fit_is_a_fit_failure() {
        let strikes = [80.0, 90.0, 100.0, 110.0, 120.0];
        let vols = [0.28, 0.24, 0.21, 0.2, 0.205];
        let mut interpolator = SmileInterpolator::builder(SabrModelFamily::default())
            .solver(Box::new(StalledSolver))
            .build()
            .unwrap();
        match interpolator.fit(F, &strikes, T, &vols) {
            Err(VolSmileError::FitFailure {
                model, chi_square, ..
            }) => {
                assert_eq!(model, "SABR");
                assert!(chi_square.is_some_and(|c| c > 0.0));
            }
            other => panic!("expected FitFailure, got {other:?}"),
        }
    }

    #[test]
    fn erroring_solver_is_a_fit_failure() {
        let mut interpolator = SmileInterpolator::builder(SabrModelFamily::default())
            .solver(Box::new(FailingSolver))
            .build()
            .unwrap();
        let r = interpolator.fit(F, &[90.0, 100.0, 110.0], T, &[0.25, 0.2, 0.22]);
        assert!(matches!(
            r,
            Err(VolSmileError::FitFailure {
                chi_square: None,
                ..
            })
        ));
    }

    #[test]
    fn config_serde_round_trip() {
        let cfg = SmileInterpolatorConfig {
            weighting: "Cosine".into(),
            seed: 9,
            ..SmileInterpolatorConfig::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: SmileInterpolatorConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
        let partial: SmileInterpolatorConfig = serde_json::from_str(r#"{"seed": 5}"#).unwrap();
        assert_eq!(partial.max_tries, 20);
        assert_eq!(partial.seed, 5);
    }
}
