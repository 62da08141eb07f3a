//! Box-constrained Levenberg–Marquardt with a fixed-parameter mask.
//!
//! Minimizes `Σ r_i(x)²`. Parameters flagged in `fixed` keep their initial
//! value; every other parameter is projected onto its [`ParameterBound`]
//! after each step. The Jacobian is supplied by the caller or built by
//! one-sided finite differences that step away from an active bound.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{self, VolSmileError};

/// Closed interval `[lower, upper]` a single parameter must stay in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterBound {
    pub lower: f64,
    pub upper: f64,
}

impl ParameterBound {
    pub const fn new(lower: f64, upper: f64) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, x: f64) -> bool {
        x >= self.lower && x <= self.upper
    }

    pub fn clamp(&self, x: f64) -> f64 {
        x.clamp(self.lower, self.upper)
    }
}

/// Residual vector as a function of the full parameter vector.
pub type ResidualFn<'a> = dyn Fn(&[f64]) -> Vec<f64> + 'a;

/// Jacobian `∂r_i/∂x_j` (rows = residuals, columns = all parameters).
pub type JacobianFn<'a> = dyn Fn(&[f64]) -> DMatrix<f64> + 'a;

/// Outcome of a least-squares solve.
#[derive(Debug, Clone)]
pub struct LeastSquaresResult {
    /// Full parameter vector, fixed entries included.
    pub parameters: Vec<f64>,
    /// `Σ r_i²` at `parameters`.
    pub chi_square: f64,
    /// Whether a convergence criterion was met before the iteration budget ran out.
    pub converged: bool,
    pub iterations: usize,
}

/// Nonlinear least-squares solver that supports fixed parameters.
pub trait LeastSquaresSolver: Send + Sync {
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] for inconsistent dimensions and
    /// [`VolSmileError::NumericalError`] if the residuals are not finite at the
    /// (clamped) starting point.
    fn solve(
        &self,
        initial: &[f64],
        fixed: &[bool],
        bounds: &[ParameterBound],
        residuals: &ResidualFn<'_>,
        jacobian: Option<&JacobianFn<'_>>,
    ) -> error::Result<LeastSquaresResult>;
}

/// Tunables for [`LevenbergMarquardt`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LevenbergMarquardtConfig {
    pub max_iterations: usize,
    pub initial_lambda: f64,
    pub lambda_up: f64,
    pub lambda_down: f64,
    pub min_lambda: f64,
    pub max_lambda: f64,
    /// Stop when `‖Jᵀr‖` falls below this.
    pub gradient_tolerance: f64,
    /// Stop when the projected step is this small relative to `‖x‖`.
    pub step_tolerance: f64,
    /// Stop when an accepted step improves chi-square by less than this (relative).
    pub improvement_tolerance: f64,
    pub finite_diff_epsilon: f64,
    pub max_stagnation: usize,
}

impl Default for LevenbergMarquardtConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
            min_lambda: 1e-12,
            max_lambda: 1e12,
            gradient_tolerance: 1e-10,
            step_tolerance: 1e-14,
            improvement_tolerance: 1e-14,
            finite_diff_epsilon: 1e-6,
            max_stagnation: 30,
        }
    }
}

/// Levenberg–Marquardt with Marquardt diagonal scaling.
#[derive(Debug, Clone, Default)]
pub struct LevenbergMarquardt {
    config: LevenbergMarquardtConfig,
}

impl LevenbergMarquardt {
    pub fn new(config: LevenbergMarquardtConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &LevenbergMarquardtConfig {
        &self.config
    }
}

#[inline]
fn chi_square(residuals: &[f64]) -> f64 {
    residuals.iter().map(|r| r * r).sum()
}

fn finite_difference_jacobian(
    x: &[f64],
    base: &[f64],
    free: &[usize],
    bounds: &[ParameterBound],
    eps_scale: f64,
    residuals: &ResidualFn<'_>,
) -> DMatrix<f64> {
    let mut j = DMatrix::zeros(base.len(), free.len());
    for (c, &i) in free.iter().enumerate() {
        let mut xp = x.to_vec();
        let h = (x[i].abs() * eps_scale).max(1e-7);
        xp[i] = (x[i] + h).min(bounds[i].upper);
        if (xp[i] - x[i]).abs() < 1e-14 {
            xp[i] = (x[i] - h).max(bounds[i].lower);
        }
        let denom = xp[i] - x[i];
        if denom.abs() < 1e-14 {
            continue;
        }
        let rp = residuals(&xp);
        for r in 0..base.len() {
            j[(r, c)] = (rp[r] - base[r]) / denom;
        }
    }
    j
}

impl LeastSquaresSolver for LevenbergMarquardt {
    fn solve(
        &self,
        initial: &[f64],
        fixed: &[bool],
        bounds: &[ParameterBound],
        residuals: &ResidualFn<'_>,
        jacobian: Option<&JacobianFn<'_>>,
    ) -> error::Result<LeastSquaresResult> {
        let n = initial.len();
        if fixed.len() != n || bounds.len() != n {
            return Err(VolSmileError::InvalidInput {
                message: format!(
                    "least-squares dimensions disagree: {n} parameters, {} fixed flags, {} bounds",
                    fixed.len(),
                    bounds.len()
                ),
            });
        }
        let opts = &self.config;

        let mut x: Vec<f64> = initial
            .iter()
            .zip(bounds)
            .map(|(&v, b)| b.clamp(v))
            .collect();
        let free: Vec<usize> = (0..n).filter(|&i| !fixed[i]).collect();

        let mut r = residuals(&x);
        if r.is_empty() {
            return Err(VolSmileError::InvalidInput {
                message: "residual function returned no residuals".into(),
            });
        }
        let mut chi2 = chi_square(&r);
        if !chi2.is_finite() {
            return Err(VolSmileError::NumericalError {
                message: format!("residuals are not finite at the starting point {x:?}"),
            });
        }

        let mut lambda = opts.initial_lambda.max(opts.min_lambda);
        let mut converged = free.is_empty();
        let mut stagnation = 0usize;
        let mut iterations = 0usize;

        while !converged && iterations < opts.max_iterations {
            iterations += 1;

            let jac = match jacobian {
                Some(jf) => {
                    let full = jf(&x);
                    full.select_columns(free.iter())
                }
                None => finite_difference_jacobian(
                    &x,
                    &r,
                    &free,
                    bounds,
                    opts.finite_diff_epsilon,
                    residuals,
                ),
            };
            let jt = jac.transpose();
            let mut a = &jt * &jac;
            let g = &jt * DVector::from_column_slice(&r);

            let grad_norm = g.norm();
            if !grad_norm.is_finite() {
                break;
            }
            if grad_norm <= opts.gradient_tolerance || chi2 < 1e-20 {
                converged = true;
                break;
            }

            for d in 0..free.len() {
                a[(d, d)] += lambda * (a[(d, d)].abs() + 1.0);
            }
            let Some(step) = a.lu().solve(&(-g)) else {
                lambda = (lambda * opts.lambda_up).min(opts.max_lambda);
                stagnation += 1;
                if stagnation >= opts.max_stagnation {
                    break;
                }
                continue;
            };

            let mut trial = x.clone();
            for (c, &i) in free.iter().enumerate() {
                trial[i] = bounds[i].clamp(x[i] + step[c]);
            }
            let step_norm = free
                .iter()
                .map(|&i| (trial[i] - x[i]).powi(2))
                .sum::<f64>()
                .sqrt();
            let x_norm = free.iter().map(|&i| x[i] * x[i]).sum::<f64>().sqrt();
            if step_norm <= opts.step_tolerance * (1.0 + x_norm) {
                converged = true;
                break;
            }

            let r_trial = residuals(&trial);
            let chi2_trial = chi_square(&r_trial);
            if chi2_trial.is_finite() && chi2_trial < chi2 {
                let improvement = chi2 - chi2_trial;
                x = trial;
                r = r_trial;
                chi2 = chi2_trial;
                lambda = (lambda * opts.lambda_down).max(opts.min_lambda);
                stagnation = 0;
                if improvement <= opts.improvement_tolerance * chi2.max(1.0) {
                    converged = true;
                }
            } else {
                lambda = (lambda * opts.lambda_up).min(opts.max_lambda);
                stagnation += 1;
                if stagnation >= opts.max_stagnation {
                    break;
                }
            }
        }

        Ok(LeastSquaresResult {
            parameters: x,
            chi_square: chi2,
            converged,
            iterations,
        })
    }
}
