//! Damped Newton iteration for small square nonlinear systems.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{self, VolSmileError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewtonConfig {
    /// Converged once `‖f(x)‖₂` falls below this.
    pub tolerance: f64,
    pub max_iterations: usize,
    /// Relative forward-difference step for the Jacobian.
    pub fd_step: f64,
    /// Smallest line-search fraction before giving up.
    pub min_step: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-12,
            max_iterations: 100,
            fd_step: 1e-7,
            min_step: 1e-10,
        }
    }
}

/// Newton's method with a finite-difference Jacobian and backtracking line search.
#[derive(Debug, Clone, Default)]
pub struct NewtonVectorRootFinder {
    config: NewtonConfig,
}

impl NewtonVectorRootFinder {
    pub fn new(config: NewtonConfig) -> Self {
        Self { config }
    }

    /// Solve `f(x) = 0` starting from `x0`.
    ///
    /// Evaluations of `f` that fail inside the line search count as a
    /// rejected step; a failure at an accepted point is propagated.
    ///
    /// # Errors
    /// Returns [`VolSmileError::NumericalError`] if the Jacobian is singular,
    /// the line search stalls, or the iteration budget is exhausted.
    pub fn solve(
        &self,
        f: &dyn Fn(&[f64]) -> error::Result<Vec<f64>>,
        x0: &[f64],
    ) -> error::Result<Vec<f64>> {
        let cfg = &self.config;
        let n = x0.len();
        let mut x = x0.to_vec();
        let mut r = f(&x)?;
        if r.len() != n {
            return Err(VolSmileError::InvalidInput {
                message: format!("system is not square: {n} unknowns, {} equations", r.len()),
            });
        }
        let mut norm = l2(&r);
        if !norm.is_finite() {
            return Err(VolSmileError::NumericalError {
                message: format!("residuals are not finite at the starting point {x:?}"),
            });
        }

        for _ in 0..cfg.max_iterations {
            if norm < cfg.tolerance {
                return Ok(x);
            }

            let mut jac = DMatrix::zeros(n, n);
            for j in 0..n {
                let h = cfg.fd_step * x[j].abs().max(1.0);
                let mut xp = x.clone();
                xp[j] += h;
                let rp = f(&xp)?;
                for i in 0..n {
                    jac[(i, j)] = (rp[i] - r[i]) / h;
                }
            }
            let rhs = -DVector::from_column_slice(&r);
            let Some(delta) = jac.lu().solve(&rhs) else {
                return Err(VolSmileError::NumericalError {
                    message: "singular Jacobian in Newton iteration".into(),
                });
            };

            let mut step = 1.0;
            loop {
                let trial: Vec<f64> = x.iter().zip(delta.iter()).map(|(xi, di)| xi + step * di).collect();
                if let Ok(r_trial) = f(&trial) {
                    let trial_norm = l2(&r_trial);
                    if trial_norm.is_finite() && trial_norm < norm * (1.0 - 1e-4 * step) {
                        x = trial;
                        r = r_trial;
                        norm = trial_norm;
                        break;
                    }
                }
                step *= 0.5;
                if step < cfg.min_step {
                    return Err(VolSmileError::NumericalError {
                        message: format!("Newton line search stalled at residual norm {norm:e}"),
                    });
                }
            }
        }

        if norm < cfg.tolerance {
            return Ok(x);
        }
        Err(VolSmileError::NumericalError {
            message: format!(
                "Newton did not converge in {} iterations, residual norm {norm:e}",
                cfg.max_iterations
            ),
        })
    }
}

fn l2(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}
