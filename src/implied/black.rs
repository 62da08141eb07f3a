//! Black (lognormal) forward pricing, strike/vol sensitivities and implied volatility.
//!
//! All prices are undiscounted forward prices. The formulas take bare `f64`
//! inputs and are meant for inner loops; validation happens in
//! [`BlackImpliedVol::compute`] and in the fitters that call them.

use std::f64::consts::{FRAC_1_SQRT_2, PI};

use implied_vol::{DefaultSpecialFn, ImpliedBlackVolatility};

use crate::conventions::log_moneyness;
use crate::error::VolSmileError;
use crate::types::{OptionType, Vol};
use crate::validate::{validate_non_negative, validate_positive};

/// Below this σ√T the option is priced at intrinsic value.
const SMALL_STDDEV: f64 = 1e-13;

/// Standard normal cumulative distribution.
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * libm::erfc(-x * FRAC_1_SQRT_2)
}

/// Standard normal density.
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// `(d1, d2, σ√T)`.
fn d1_d2(forward: f64, strike: f64, expiry: f64, vol: f64) -> (f64, f64, f64) {
    let std_dev = vol * expiry.sqrt();
    let d1 = -log_moneyness(strike, forward) / std_dev + 0.5 * std_dev;
    (d1, d1 - std_dev, std_dev)
}

/// Black forward price of a European option.
///
/// Returns intrinsic value when `vol·√expiry` is negligible or `strike == 0`.
///
/// # Examples
/// ```
/// use volsmile::implied::black_price;
/// use volsmile::types::OptionType;
///
/// let call = black_price(100.0, 100.0, 1.0, 0.2, OptionType::Call);
/// assert!((call - 7.965567).abs() < 1e-6);
/// ```
pub fn black_price(forward: f64, strike: f64, expiry: f64, vol: f64, option_type: OptionType) -> f64 {
    let sign = option_type.sign();
    let std_dev = vol * expiry.sqrt();
    if std_dev < SMALL_STDDEV || strike == 0.0 {
        return (sign * (forward - strike)).max(0.0);
    }
    let (d1, d2, _) = d1_d2(forward, strike, expiry, vol);
    (sign * (forward * norm_cdf(sign * d1) - strike * norm_cdf(sign * d2))).max(0.0)
}

/// Dual delta ∂P/∂K.
pub fn dual_delta(forward: f64, strike: f64, expiry: f64, vol: f64, option_type: OptionType) -> f64 {
    let std_dev = vol * expiry.sqrt();
    if std_dev < SMALL_STDDEV {
        return match (option_type, forward > strike) {
            (OptionType::Call, true) => -1.0,
            (OptionType::Call, false) => 0.0,
            (OptionType::Put, true) => 0.0,
            (OptionType::Put, false) => 1.0,
        };
    }
    let sign = option_type.sign();
    let (_, d2, _) = d1_d2(forward, strike, expiry, vol);
    -sign * norm_cdf(sign * d2)
}

/// Vega ∂P/∂σ (identical for calls and puts).
pub fn vega(forward: f64, strike: f64, expiry: f64, vol: f64) -> f64 {
    let std_dev = vol * expiry.sqrt();
    if std_dev < SMALL_STDDEV {
        return 0.0;
    }
    let (d1, _, _) = d1_d2(forward, strike, expiry, vol);
    forward * expiry.sqrt() * norm_pdf(d1)
}

/// Dual gamma ∂²P/∂K².
pub fn dual_gamma(forward: f64, strike: f64, expiry: f64, vol: f64) -> f64 {
    let std_dev = vol * expiry.sqrt();
    if std_dev < SMALL_STDDEV {
        return 0.0;
    }
    let (_, d2, std_dev) = d1_d2(forward, strike, expiry, vol);
    norm_pdf(d2) / (strike * std_dev)
}

/// Dual vanna ∂²P/∂K∂σ.
pub fn dual_vanna(forward: f64, strike: f64, expiry: f64, vol: f64) -> f64 {
    let std_dev = vol * expiry.sqrt();
    if std_dev < SMALL_STDDEV {
        return 0.0;
    }
    let (d1, d2, _) = d1_d2(forward, strike, expiry, vol);
    norm_pdf(d2) * d1 / vol
}

/// Volga ∂²P/∂σ².
pub fn volga(forward: f64, strike: f64, expiry: f64, vol: f64) -> f64 {
    let std_dev = vol * expiry.sqrt();
    if std_dev < SMALL_STDDEV {
        return 0.0;
    }
    let (d1, d2, _) = d1_d2(forward, strike, expiry, vol);
    vega(forward, strike, expiry, vol) * d1 * d2 / vol
}

/// Black (lognormal) implied volatility calculator.
///
/// Wraps Jäckel's "Let's Be Rational" inversion from the [`implied_vol`]
/// crate, which stays accurate for prices far below `1e-16` in the wings.
pub struct BlackImpliedVol;

impl BlackImpliedVol {
    /// Compute Black implied volatility from an option price.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] for non-positive inputs or a
    /// price outside the no-arbitrage range `(intrinsic, bound)`, and
    /// [`VolSmileError::NumericalError`] if the inversion yields no volatility.
    pub fn compute(
        option_price: f64,
        forward: f64,
        strike: f64,
        expiry: f64,
        option_type: OptionType,
    ) -> crate::error::Result<Vol> {
        validate_non_negative(option_price, "option price")?;
        validate_positive(forward, "forward")?;
        validate_positive(strike, "strike")?;
        validate_positive(expiry, "expiry")?;

        let intrinsic = (option_type.sign() * (forward - strike)).max(0.0);
        let time_value = option_price - intrinsic;
        if time_value <= 0.0 {
            return Err(VolSmileError::InvalidInput {
                message: format!(
                    "price {option_price} is not above intrinsic value {intrinsic}"
                ),
            });
        }
        // Time value equals the out-of-the-money price by put/call parity.
        if time_value >= forward.min(strike) {
            return Err(VolSmileError::InvalidInput {
                message: format!("price {option_price} exceeds the no-arbitrage bound"),
            });
        }

        let otm_type = OptionType::otm(forward, strike);
        let sigma = ImpliedBlackVolatility::builder()
            .option_price(time_value)
            .forward(forward)
            .strike(strike)
            .expiry(expiry)
            .is_call(otm_type == OptionType::Call)
            .build_unchecked()
            .calculate::<DefaultSpecialFn>();
        match sigma {
            Some(v) if v.is_finite() && v > 0.0 => Ok(Vol(v)),
            _ => Err(VolSmileError::NumericalError {
                message: format!(
                    "no Black volatility reproduces price {option_price} at strike {strike}"
                ),
            }),
        }
    }
}
