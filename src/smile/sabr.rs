//! SABR volatility provider (Hagan lognormal expansion).
//!
//! Under SABR the forward follows `dF = σ·F^β·dW₁` with lognormal
//! volatility `dσ = ν·σ·dW₂` and `d⟨W₁, W₂⟩ = ρ dt`. The provider evaluates
//! Hagan's closed-form Black volatility, with dedicated ATM and small-`z`
//! branches, and is what the interpolator fits window by window.
//!
//! # References
//! - Hagan, P. et al. "Managing Smile Risk" (2002)

use serde::{Deserialize, Serialize};

use crate::error::{self, VolSmileError};
use crate::smile::SmileSection;
use crate::smile::function::VolatilityFunction;
use crate::smile::parameters::ModelParameterVector;
use crate::types::{EuropeanOption, OptionType, Vol};
use crate::validate::{validate_non_negative, validate_positive};

/// Number of SABR parameters.
pub const SABR_PARAMETER_COUNT: usize = 4;

/// SABR parameters `(α, β, ρ, ν)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SabrParametersRaw", into = "SabrParametersRaw")]
pub struct SabrParameters {
    /// Vol scale α > 0.
    alpha: f64,
    /// CEV exponent β ∈ \[0, 1\].
    beta: f64,
    /// Spot-vol correlation ρ ∈ (−1, 1).
    rho: f64,
    /// Vol-of-vol ν ≥ 0 (ν = 0 reduces to CEV model).
    nu: f64,
}

#[derive(Serialize, Deserialize)]
struct SabrParametersRaw {
    alpha: f64,
    beta: f64,
    rho: f64,
    nu: f64,
}

impl TryFrom<SabrParametersRaw> for SabrParameters {
    type Error = VolSmileError;
    fn try_from(raw: SabrParametersRaw) -> Result<Self, Self::Error> {
        Self::new(raw.alpha, raw.beta, raw.rho, raw.nu)
    }
}

impl From<SabrParameters> for SabrParametersRaw {
    fn from(p: SabrParameters) -> Self {
        Self {
            alpha: p.alpha,
            beta: p.beta,
            rho: p.rho,
            nu: p.nu,
        }
    }
}

impl SabrParameters {
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] if parameters are out of range.
    pub fn new(alpha: f64, beta: f64, rho: f64, nu: f64) -> error::Result<Self> {
        validate_positive(alpha, "alpha")?;

        if !(0.0..=1.0).contains(&beta) {
            return Err(VolSmileError::InvalidInput {
                message: format!("beta must be in [0, 1], got {beta}"),
            });
        }

        if rho.abs() >= 1.0 || rho.is_nan() {
            return Err(VolSmileError::InvalidInput {
                message: format!("rho must be in (-1, 1), got {rho}"),
            });
        }

        validate_non_negative(nu, "nu")?;

        Ok(Self {
            alpha,
            beta,
            rho,
            nu,
        })
    }

    /// Returns the alpha (vol scale) parameter.
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Returns the beta (CEV exponent) parameter.
    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// Returns the rho (spot-vol correlation) parameter.
    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// Returns the nu (vol-of-vol) parameter.
    pub fn nu(&self) -> f64 {
        self.nu
    }
}

impl ModelParameterVector for SabrParameters {
    fn len(&self) -> usize {
        SABR_PARAMETER_COUNT
    }

    fn get(&self, index: usize) -> Option<f64> {
        match index {
            0 => Some(self.alpha),
            1 => Some(self.beta),
            2 => Some(self.rho),
            3 => Some(self.nu),
            _ => None,
        }
    }

    fn is_allowed(&self, index: usize, value: f64) -> bool {
        match index {
            0 => value.is_finite() && value > 0.0,
            1 => (0.0..=1.0).contains(&value),
            2 => value.abs() < 1.0,
            3 => value.is_finite() && value >= 0.0,
            _ => false,
        }
    }

    fn with_parameter(&self, index: usize, value: f64) -> error::Result<Self> {
        let mut values = self.to_vec();
        let Some(slot) = values.get_mut(index) else {
            return Err(VolSmileError::InvalidInput {
                message: format!("SABR parameter index {index} out of range"),
            });
        };
        *slot = value;
        Self::from_slice(&values)
    }

    fn to_vec(&self) -> Vec<f64> {
        vec![self.alpha, self.beta, self.rho, self.nu]
    }

    fn from_slice(values: &[f64]) -> error::Result<Self> {
        match values {
            &[alpha, beta, rho, nu] => Self::new(alpha, beta, rho, nu),
            _ => Err(VolSmileError::InvalidInput {
                message: format!(
                    "SABR needs {SABR_PARAMETER_COUNT} parameters, got {}",
                    values.len()
                ),
            }),
        }
    }
}

/// Hagan (2002) lognormal implied-volatility expansion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SabrHaganVolatilityFunction;

impl SabrHaganVolatilityFunction {
    /// Hagan implied volatility for a single strike.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] for non-positive forward or
    /// strike, and [`VolSmileError::NumericalError`] if the expansion does not
    /// produce a finite non-negative volatility.
    pub fn hagan_vol(
        forward: f64,
        strike: f64,
        expiry: f64,
        params: &SabrParameters,
    ) -> error::Result<f64> {
        /// Relative |F − K| below which the ATM limit is used.
        const ATM_EPS: f64 = 1e-14;
        /// |z| below which z/x(z) uses its Taylor series.
        const SMALL_Z: f64 = 1e-8;

        validate_positive(forward, "forward")?;
        validate_positive(strike, "strike")?;
        validate_non_negative(expiry, "expiry")?;

        let SabrParameters {
            alpha,
            beta,
            rho,
            nu,
        } = *params;
        let omb = 1.0 - beta;

        let time_factor = |fk_pow: f64| {
            1.0 + (omb * omb / 24.0 * alpha * alpha / fk_pow
                + rho * beta * nu * alpha / (4.0 * fk_pow.sqrt())
                + (2.0 - 3.0 * rho * rho) / 24.0 * nu * nu)
                * expiry
        };

        let vol = if (forward - strike).abs() <= ATM_EPS * forward {
            alpha / forward.powf(omb) * time_factor(forward.powf(2.0 * omb))
        } else {
            let fk = forward * strike;
            let fk_half = fk.powf(0.5 * omb);
            let ln_fk = (forward / strike).ln();
            let ln2 = ln_fk * ln_fk;
            let z = nu / alpha * fk_half * ln_fk;
            let z_over_x = if z.abs() < SMALL_Z {
                1.0 - 0.5 * rho * z + (2.0 - 3.0 * rho * rho) / 12.0 * z * z
            } else {
                let num = (1.0 - 2.0 * rho * z + z * z).sqrt() + z - rho;
                z / (num / (1.0 - rho)).ln()
            };
            let denom = fk_half * (1.0 + omb * omb / 24.0 * ln2 + omb.powi(4) / 1920.0 * ln2 * ln2);
            alpha / denom * z_over_x * time_factor(fk.powf(omb))
        };

        if !vol.is_finite() || vol < 0.0 {
            return Err(VolSmileError::NumericalError {
                message: format!("Hagan SABR vol is {vol} at strike {strike}"),
            });
        }
        Ok(vol)
    }
}

impl VolatilityFunction for SabrHaganVolatilityFunction {
    type Params = SabrParameters;

    fn name(&self) -> &'static str {
        "SABR"
    }

    fn vol(&self, option: &EuropeanOption, forward: f64, params: &SabrParameters) -> error::Result<f64> {
        Self::hagan_vol(forward, option.strike, option.expiry, params)
    }
}

/// SABR volatility smile with a single parameter set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SabrSmile {
    forward: f64,
    expiry: f64,
    params: SabrParameters,
}

impl SabrSmile {
    /// Create a SABR smile from calibrated parameters.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] if parameters are out of range.
    pub fn new(
        forward: f64,
        expiry: f64,
        alpha: f64,
        beta: f64,
        rho: f64,
        nu: f64,
    ) -> error::Result<Self> {
        validate_positive(forward, "forward")?;
        validate_positive(expiry, "expiry")?;
        let params = SabrParameters::new(alpha, beta, rho, nu)?;
        Ok(Self {
            forward,
            expiry,
            params,
        })
    }

    pub fn from_parameters(forward: f64, expiry: f64, params: SabrParameters) -> error::Result<Self> {
        validate_positive(forward, "forward")?;
        validate_positive(expiry, "expiry")?;
        Ok(Self {
            forward,
            expiry,
            params,
        })
    }

    pub fn parameters(&self) -> &SabrParameters {
        &self.params
    }

    /// Returns the alpha (vol scale) parameter.
    pub fn alpha(&self) -> f64 {
        self.params.alpha
    }

    /// Returns the beta (CEV exponent) parameter.
    pub fn beta(&self) -> f64 {
        self.params.beta
    }

    /// Returns the rho (spot-vol correlation) parameter.
    pub fn rho(&self) -> f64 {
        self.params.rho
    }

    /// Returns the nu (vol-of-vol) parameter.
    pub fn nu(&self) -> f64 {
        self.params.nu
    }
}

impl SmileSection for SabrSmile {
    fn vol(&self, strike: f64) -> error::Result<Vol> {
        let option = EuropeanOption::new(strike, self.expiry, OptionType::otm(self.forward, strike));
        SabrHaganVolatilityFunction
            .vol(&option, self.forward, &self.params)
            .map(Vol)
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
    use approx::assert_abs_diff_eq;

    // Canonical test parameters
    const F: f64 = 100.0;
    const T: f64 = 1.0;
    const ALPHA: f64 = 0.2;
    const BETA: f64 = 0.5;
    const RHO: f64 = -0.3;
    const NU: f64 = 0.4;

    fn make_smile() -> SabrSmile {
        SabrSmile::new(F, T, ALPHA, BETA, RHO, NU).unwrap()
    }

    fn lognormal(rho: f64, nu: f64) -> SabrParameters {
        SabrParameters::new(0.2, 1.0, rho, nu).unwrap()
    }

    // --- Valid construction ---

    #[test]
    fn new_valid_params() {
        let s = make_smile();
        assert_eq!(s.forward(), F);
        assert_eq!(s.expiry(), T);
        assert_eq!(s.alpha(), ALPHA);
        assert_eq!(s.beta(), BETA);
        assert_eq!(s.rho(), RHO);
        assert_eq!(s.nu(), NU);
    }

    // --- Boundary parameters ---

    #[test]
    fn boundary_parameters_are_accepted() {
        for (beta, rho, nu) in [(0.0, RHO, NU), (1.0, RHO, NU), (BETA, 0.999, NU), (BETA, -0.999, 0.0)] {
            let s = SabrSmile::new(F, T, ALPHA, beta, rho, nu).unwrap();
            assert_eq!((s.beta(), s.rho(), s.nu()), (beta, rho, nu));
        }
    }

    // --- Invalid forward / expiry ---

    #[test]
    fn new_rejects_bad_forward() {
        for f in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let r = SabrSmile::new(f, T, ALPHA, BETA, RHO, NU);
            assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
        }
    }

    #[test]
    fn new_rejects_bad_expiry() {
        for t in [0.0, -1.0, f64::NAN] {
            let r = SabrSmile::new(F, t, ALPHA, BETA, RHO, NU);
            assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
        }
    }

    // --- Invalid parameters ---

    #[test]
    fn new_rejects_bad_alpha() {
        for a in [0.0, -0.1, f64::NAN, f64::INFINITY] {
            let r = SabrParameters::new(a, BETA, RHO, NU);
            assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
        }
    }

    #[test]
    fn new_rejects_bad_beta() {
        for b in [-0.1, 1.1, f64::NAN, f64::INFINITY] {
            let r = SabrParameters::new(ALPHA, b, RHO, NU);
            assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
        }
    }

    #[test]
    fn new_rejects_bad_rho() {
        for rho in [1.0, -1.0, 1.5, f64::NAN, f64::INFINITY] {
            let r = SabrParameters::new(ALPHA, BETA, rho, NU);
            assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
        }
    }

    #[test]
    fn new_rejects_bad_nu() {
        for nu in [-0.1, f64::NAN, f64::INFINITY] {
            let r = SabrParameters::new(ALPHA, BETA, RHO, nu);
            assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
        }
    }

    // --- Parameter vector ---

    #[test]
    fn with_parameter_returns_new_value() {
        let p = SabrParameters::new(ALPHA, BETA, RHO, NU).unwrap();
        let q = p.with_parameter(2, 0.1).unwrap();
        assert_eq!(q.rho(), 0.1);
        assert_eq!(p.rho(), RHO);
        assert_eq!(q.to_vec(), vec![ALPHA, BETA, 0.1, NU]);
    }

    #[test]
    fn with_parameter_validates() {
        let p = SabrParameters::new(ALPHA, BETA, RHO, NU).unwrap();
        assert!(p.with_parameter(1, 1.5).is_err());
        assert!(p.with_parameter(4, 0.0).is_err());
        assert!(!p.is_allowed(2, 1.0));
        assert!(p.is_allowed(3, 0.0));
    }

    #[test]
    fn from_slice_checks_length() {
        assert!(SabrParameters::from_slice(&[0.2, 0.5, 0.0]).is_err());
        let p = SabrParameters::from_slice(&[0.2, 0.5, 0.0, 0.3]).unwrap();
        assert_eq!(p.get(3), Some(0.3));
        assert_eq!(p.get(4), None);
    }

    // --- Hagan formula ---

    #[test]
    fn atm_lognormal_closed_form() {
        // α·(1 + (ρβνα/4 + (2 − 3ρ²)ν²/24)·T)
        let v = SabrHaganVolatilityFunction::hagan_vol(F, F, T, &lognormal(-0.3, 0.4)).unwrap();
        let expected = 0.2 * (1.0 + (-0.3 * 0.4 * 0.2 / 4.0 + (2.0 - 0.27) / 24.0 * 0.16));
        assert_abs_diff_eq!(v, expected, epsilon = 1e-14);
    }

    #[test]
    fn reference_values() {
        let v = SabrHaganVolatilityFunction::hagan_vol(F, 110.0, T, &lognormal(-0.3, 0.4)).unwrap();
        assert_abs_diff_eq!(v, 0.19648069453495284, epsilon = 1e-12);
        let p = SabrParameters::new(2.0, 0.5, -0.3, 0.4).unwrap();
        let v = SabrHaganVolatilityFunction::hagan_vol(F, 90.0, T, &p).unwrap();
        assert_abs_diff_eq!(v, 0.21467028255329446, epsilon = 1e-12);
    }

    #[test]
    fn continuous_through_atm() {
        let p = SabrParameters::new(2.0, 0.5, -0.3, 0.4).unwrap();
        let atm = SabrHaganVolatilityFunction::hagan_vol(F, F, T, &p).unwrap();
        let near = SabrHaganVolatilityFunction::hagan_vol(F, F * (1.0 + 1e-9), T, &p).unwrap();
        assert_abs_diff_eq!(atm, near, epsilon = 1e-9);
    }

    #[test]
    fn negative_skew_for_negative_rho() {
        let s = make_smile();
        let low = s.vol(80.0).unwrap().0;
        let high = s.vol(120.0).unwrap().0;
        assert!(low > high);
    }

    #[test]
    fn rejects_non_positive_strike() {
        let r = SabrHaganVolatilityFunction::hagan_vol(F, 0.0, T, &lognormal(0.0, 0.4));
        assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
    }

    // --- Accessors from SmileSection ---

    #[test]
    fn smile_section_forward_and_expiry() {
        let s = make_smile();
        assert_eq!(SmileSection::forward(&s), F);
        assert_eq!(SmileSection::expiry(&s), T);
    }

    // --- Serde round-trip ---

    #[test]
    fn serde_round_trip() {
        let s = make_smile();
        let json = serde_json::to_string(&s).unwrap();
        let s2: SabrSmile = serde_json::from_str(&json).unwrap();
        assert_eq!(s.parameters(), s2.parameters());
    }

    #[test]
    fn serde_rejects_invalid_parameters() {
        let json = r#"{"alpha":0.2,"beta":0.5,"rho":1.5,"nu":0.4}"#;
        assert!(serde_json::from_str::<SabrParameters>(json).is_err());
    }
}
