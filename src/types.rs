//! Core domain types for smile fitting.
//!
//! **Outputs use newtypes**: [`Vol`], [`Variance`] and [`Strike`] wrap
//! returned values so a volatility cannot silently be used as a variance.
//! **Inputs use bare `f64`**: `vol(strike: f64)` reads clearly at the call
//! site, and validation happens inside constructors and fitters.
//!
//! These wrap `f64`, so only `PartialEq`/`PartialOrd` are derived.

use serde::{Deserialize, Serialize};

use crate::error::{self, VolSmileError};
use crate::validate::{validate_non_negative, validate_positive};

/// Strike price `K` of an option contract.
///
/// # Examples
/// ```
/// use volsmile::types::Strike;
/// let strike = Strike(100.0);
/// assert_eq!(strike.0, 100.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Strike(pub f64);

/// Implied volatility `σ`, measured as annualized standard deviation.
///
/// # Examples
/// ```
/// use volsmile::types::Vol;
/// let vol = Vol(0.20);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Vol(pub f64);

/// Total variance `σ²T`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Variance(pub f64);

/// Option type: call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionType {
    /// Right to buy at strike price.
    Call,
    /// Right to sell at strike price.
    Put,
}

impl OptionType {
    /// Out-of-the-money type at `strike`: calls at or above the forward, puts below.
    pub fn otm(forward: f64, strike: f64) -> Self {
        if strike >= forward {
            OptionType::Call
        } else {
            OptionType::Put
        }
    }

    /// `+1` for calls, `-1` for puts.
    pub fn sign(self) -> f64 {
        match self {
            OptionType::Call => 1.0,
            OptionType::Put => -1.0,
        }
    }

    pub fn is_call(self) -> bool {
        matches!(self, OptionType::Call)
    }
}

/// A European option as seen by a volatility function: strike, expiry and side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EuropeanOption {
    pub strike: f64,
    pub expiry: f64,
    pub option_type: OptionType,
}

impl EuropeanOption {
    pub fn new(strike: f64, expiry: f64, option_type: OptionType) -> Self {
        Self {
            strike,
            expiry,
            option_type,
        }
    }

    /// Copy with a different strike.
    pub fn with_strike(&self, strike: f64) -> Self {
        Self { strike, ..*self }
    }
}

/// A single market quote: strike and Black implied volatility.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MarketPointRaw", into = "MarketPointRaw")]
pub struct MarketPoint {
    strike: f64,
    implied_vol: f64,
}

#[derive(Serialize, Deserialize)]
struct MarketPointRaw {
    strike: f64,
    implied_vol: f64,
}

impl TryFrom<MarketPointRaw> for MarketPoint {
    type Error = VolSmileError;
    fn try_from(raw: MarketPointRaw) -> Result<Self, Self::Error> {
        Self::new(raw.strike, raw.implied_vol)
    }
}

impl From<MarketPoint> for MarketPointRaw {
    fn from(p: MarketPoint) -> Self {
        Self {
            strike: p.strike,
            implied_vol: p.implied_vol,
        }
    }
}

impl MarketPoint {
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] unless `strike > 0` and `implied_vol >= 0`.
    pub fn new(strike: f64, implied_vol: f64) -> error::Result<Self> {
        validate_positive(strike, "strike")?;
        validate_non_negative(implied_vol, "implied_vol")?;
        Ok(Self {
            strike,
            implied_vol,
        })
    }

    pub fn strike(&self) -> f64 {
        self.strike
    }

    pub fn implied_vol(&self) -> f64 {
        self.implied_vol
    }
}
