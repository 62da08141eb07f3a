//! One-dimensional root finding: outward bracketing and Ridder's method.

use serde::{Deserialize, Serialize};

use crate::error::{self, VolSmileError};

/// Bracketing 1-D root finder.
pub trait RealRootFinder: Send + Sync {
    /// Expand `[lo, hi]` outward until `f` changes sign across it.
    ///
    /// # Errors
    /// Returns [`VolSmileError::NumericalError`] if no sign change is found
    /// within the configured number of expansions.
    fn bracket(&self, f: &dyn Fn(f64) -> f64, lo: f64, hi: f64) -> error::Result<(f64, f64)>;

    /// Find a root of `f` inside a bracket `[a, b]`.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] if `[a, b]` does not bracket a
    /// root and [`VolSmileError::NumericalError`] on non-convergence.
    fn solve(&self, f: &dyn Fn(f64) -> f64, a: f64, b: f64) -> error::Result<f64>;

    /// [`bracket`](RealRootFinder::bracket) then [`solve`](RealRootFinder::solve).
    fn find_root(&self, f: &dyn Fn(f64) -> f64, lo: f64, hi: f64) -> error::Result<f64> {
        let (a, b) = self.bracket(f, lo, hi)?;
        self.solve(f, a, b)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidderConfig {
    /// Absolute tolerance on the root.
    pub accuracy: f64,
    pub max_iterations: usize,
    /// Geometric growth of the bracket per expansion step.
    pub expansion_ratio: f64,
    pub max_expansions: usize,
}

impl Default for RidderConfig {
    fn default() -> Self {
        Self {
            accuracy: 1e-5,
            max_iterations: 100,
            expansion_ratio: 1.6,
            max_expansions: 50,
        }
    }
}

/// Ridder's method (exponential-fit false position).
///
/// # References
/// - Ridders, C. "A new algorithm for computing a single root of a real
///   continuous function", IEEE Trans. Circuits Syst. 26 (1979)
#[derive(Debug, Clone, Default)]
pub struct RidderRootFinder {
    config: RidderConfig,
}

impl RidderRootFinder {
    pub fn new(config: RidderConfig) -> Self {
        Self { config }
    }

    /// Finder with the given absolute accuracy and default bracketing.
    pub fn with_accuracy(accuracy: f64) -> Self {
        Self {
            config: RidderConfig {
                accuracy,
                ..RidderConfig::default()
            },
        }
    }
}

impl RealRootFinder for RidderRootFinder {
    fn bracket(&self, f: &dyn Fn(f64) -> f64, lo: f64, hi: f64) -> error::Result<(f64, f64)> {
        if !(lo < hi) {
            return Err(VolSmileError::InvalidInput {
                message: format!("bracket requires lo < hi, got [{lo}, {hi}]"),
            });
        }
        let ratio = self.config.expansion_ratio;
        let (mut lo, mut hi) = (lo, hi);
        let (mut f_lo, mut f_hi) = (f(lo), f(hi));
        for _ in 0..self.config.max_expansions {
            if !f_lo.is_finite() || !f_hi.is_finite() {
                break;
            }
            if f_lo * f_hi <= 0.0 {
                return Ok((lo, hi));
            }
            if f_lo.abs() < f_hi.abs() {
                lo += ratio * (lo - hi);
                f_lo = f(lo);
            } else {
                hi += ratio * (hi - lo);
                f_hi = f(hi);
            }
        }
        Err(VolSmileError::NumericalError {
            message: format!("could not bracket a root, last interval [{lo}, {hi}]"),
        })
    }

    fn solve(&self, f: &dyn Fn(f64) -> f64, a: f64, b: f64) -> error::Result<f64> {
        let tol = self.config.accuracy;
        let (mut a, mut b) = (a, b);
        let (mut fa, mut fb) = (f(a), f(b));
        if fa == 0.0 {
            return Ok(a);
        }
        if fb == 0.0 {
            return Ok(b);
        }
        if fa * fb > 0.0 || !(fa * fb).is_finite() {
            return Err(VolSmileError::InvalidInput {
                message: format!("[{a}, {b}] does not bracket a root"),
            });
        }

        let mut x_prev = f64::NAN;
        for _ in 0..self.config.max_iterations {
            let m = 0.5 * (a + b);
            let fm = f(m);
            let s = (fm * fm - fa * fb).sqrt();
            if s == 0.0 {
                return Ok(m);
            }
            let x = m + (m - a) * (if fa >= fb { 1.0 } else { -1.0 }) * fm / s;
            if (x - x_prev).abs() <= tol {
                return Ok(x);
            }
            x_prev = x;
            let fx = f(x);
            if fx == 0.0 {
                return Ok(x);
            }
            if fm.signum() != fx.signum() {
                (a, fa, b, fb) = (m, fm, x, fx);
            } else if fa.signum() != fx.signum() {
                (b, fb) = (x, fx);
            } else {
                (a, fa) = (x, fx);
            }
            if (b - a).abs() <= tol {
                return Ok(x);
            }
        }
        Err(VolSmileError::NumericalError {
            message: format!(
                "Ridder did not converge in {} iterations",
                self.config.max_iterations
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn solves_cubic() {
        let f = |x: f64| x * x * x - 2.0 * x - 5.0;
        let finder = RidderRootFinder::with_accuracy(1e-12);
        let root = finder.solve(&f, 2.0, 3.0).unwrap();
        assert_abs_diff_eq!(root, 2.0945514815423265, epsilon = 1e-10);
    }

    #[test]
    fn linear_root_is_exact() {
        let f = |x: f64| 3.0 * x - 1.5;
        let root = RidderRootFinder::default().solve(&f, -1.0, 1.0).unwrap();
        assert_abs_diff_eq!(root, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn bracket_expands_outward() {
        let f = |x: f64| x - 37.0;
        let finder = RidderRootFinder::default();
        let (a, b) = finder.bracket(&f, -1.0, 1.0).unwrap();
        assert!(f(a) * f(b) <= 0.0);
        let root = finder.find_root(&f, -1.0, 1.0).unwrap();
        assert_abs_diff_eq!(root, 37.0, epsilon = 1e-5);
    }

    #[test]
    fn bracket_fails_without_root() {
        let f = |x: f64| x * x + 1.0;
        let r = RidderRootFinder::default().bracket(&f, -1.0, 1.0);
        assert!(matches!(r, Err(VolSmileError::NumericalError { .. })));
    }

    #[test]
    fn solve_rejects_non_bracket() {
        let f = |x: f64| x - 10.0;
        let r = RidderRootFinder::default().solve(&f, 0.0, 1.0);
        assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
    }
}
