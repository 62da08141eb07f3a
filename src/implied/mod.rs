//! Black (lognormal) pricing and implied volatility.
//!
//! - [`black_price`] and the strike/vol sensitivities used by the tail fitters
//! - [`BlackImpliedVol`] for inverting a price back to a volatility

pub mod black;

pub use black::{BlackImpliedVol, black_price, dual_delta, vega};
