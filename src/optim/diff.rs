//! Second-order finite differences for scalar functions.
//!
//! One-sided schemes are used next to a domain boundary (e.g. `beta = 1` or a
//! zero strike) where a central bump would leave the allowed region.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiniteDifferenceType {
    /// `(f(x+h) − f(x−h)) / 2h`
    Central,
    /// `(−3f(x) + 4f(x+h) − f(x+2h)) / 2h`
    Forward,
    /// `(3f(x) − 4f(x−h) + f(x−2h)) / 2h`
    Backward,
}

/// Scalar differentiator with a fixed scheme and absolute shift.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FiniteDifference {
    pub kind: FiniteDifferenceType,
    pub shift: f64,
}

impl Default for FiniteDifference {
    fn default() -> Self {
        Self {
            kind: FiniteDifferenceType::Central,
            shift: 1e-6,
        }
    }
}

impl FiniteDifference {
    pub fn new(kind: FiniteDifferenceType, shift: f64) -> Self {
        Self { kind, shift }
    }

    /// Central when both `x ± h` (and for one-sided schemes `x ± 2h`) are
    /// allowed, otherwise the one-sided scheme that stays inside the domain.
    /// Falls back to central when neither side fits.
    pub fn choose(x: f64, shift: f64, is_allowed: impl Fn(f64) -> bool) -> FiniteDifferenceType {
        let up = is_allowed(x + shift);
        let down = is_allowed(x - shift);
        match (up, down) {
            (true, true) => FiniteDifferenceType::Central,
            (true, false) if is_allowed(x + 2.0 * shift) => FiniteDifferenceType::Forward,
            (false, true) if is_allowed(x - 2.0 * shift) => FiniteDifferenceType::Backward,
            _ => FiniteDifferenceType::Central,
        }
    }

    /// First derivative of `f` at `x`.
    pub fn derivative(&self, f: &dyn Fn(f64) -> f64, x: f64) -> f64 {
        let h = self.shift;
        match self.kind {
            FiniteDifferenceType::Central => (f(x + h) - f(x - h)) / (2.0 * h),
            FiniteDifferenceType::Forward => (-1.5 * f(x) + 2.0 * f(x + h) - 0.5 * f(x + 2.0 * h)) / h,
            FiniteDifferenceType::Backward => (1.5 * f(x) - 2.0 * f(x - h) + 0.5 * f(x - 2.0 * h)) / h,
        }
    }

    /// Second derivative of `f` at `x`.
    pub fn second_derivative(&self, f: &dyn Fn(f64) -> f64, x: f64) -> f64 {
        let h = self.shift;
        let h2 = h * h;
        match self.kind {
            FiniteDifferenceType::Central => (f(x + h) - 2.0 * f(x) + f(x - h)) / h2,
            FiniteDifferenceType::Forward => {
                (2.0 * f(x) - 5.0 * f(x + h) + 4.0 * f(x + 2.0 * h) - f(x + 3.0 * h)) / h2
            }
            FiniteDifferenceType::Backward => {
                (2.0 * f(x) - 5.0 * f(x - h) + 4.0 * f(x - 2.0 * h) - f(x - 3.0 * h)) / h2
            }
        }
    }

    /// The derivative of `f` as a function.
    pub fn differentiate<'a>(&self, f: &'a dyn Fn(f64) -> f64) -> impl Fn(f64) -> f64 + use<'a> {
        let fd = *self;
        move |x| fd.derivative(f, x)
    }
}
