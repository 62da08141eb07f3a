//! Single-expiry volatility smiles.
//!
//! A smile represents how implied volatility varies with strike at a fixed
//! forward and expiry. Every fitted or extrapolated smile in this crate
//! implements [`SmileSection`].
//!
//! ## Pieces
//!
//! - [`VolatilityFunction`]: closed-form model (e.g. [`SabrHaganVolatilityFunction`])
//! - [`SmileModelFitter`]: least-squares calibration of one model to a set of quotes
//! - [`SmileInterpolator`]: global warm start then blended 3-point local fits
//! - [`WeightingFunction`]: blend curve between adjacent local fits

pub mod fitter;
pub mod function;
pub mod interpolator;
pub mod model;
pub mod parameters;
pub mod sabr;
pub mod weighting;

pub use fitter::{FitResult, SmileModelFitter, SmileQuotes};
pub use function::{VolatilityAdjoint, VolatilityAdjoint2, VolatilityFunction};
pub use interpolator::{
    FitState, InterpolatedSmile, SmileInterpolator, SmileInterpolatorBuilder,
    SmileInterpolatorConfig,
};
pub use model::{SabrModelFamily, SmileModelFamily};
pub use parameters::{ModelParameterVector, ParameterBound};
pub use sabr::{SabrHaganVolatilityFunction, SabrParameters, SabrSmile};
pub use weighting::{WeightingFunction, weighting_function};

use crate::error;
use crate::types::{Variance, Vol};

/// A single-expiry volatility smile.
///
/// # Thread Safety
/// All implementations must be `Send + Sync` so independent slices can be
/// fitted and queried concurrently.
///
/// # Error Handling
/// Methods return `Result` so implementations can report numerical failures
/// (e.g., a tail price with no real implied volatility) rather than panicking.
pub trait SmileSection: Send + Sync {
    /// Implied Black volatility σ at the given strike.
    fn vol(&self, strike: f64) -> error::Result<Vol>;

    /// Total Black variance σ²T at the given strike.
    ///
    /// Default implementation derives from [`vol`](SmileSection::vol):
    /// `variance(K) = vol(K)² × expiry`.
    fn variance(&self, strike: f64) -> error::Result<Variance> {
        let v = self.vol(strike)?;
        Ok(Variance(v.0 * v.0 * self.expiry()))
    }

    /// Forward price F at this expiry.
    fn forward(&self) -> f64;

    /// Time to expiry T in years.
    fn expiry(&self) -> f64;
}
