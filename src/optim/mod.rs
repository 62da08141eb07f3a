//! Numerical primitives used by the smile and tail fitters.
//!
//! Each primitive sits behind a small trait so a fitter can be handed a
//! different solver; the default implementations are:
//!
//! - [`LevenbergMarquardt`]: box-constrained nonlinear least squares with a fixed-parameter mask
//! - [`RidderRootFinder`]: 1-D bracketing plus Ridder's method
//! - [`NewtonVectorRootFinder`]: damped Newton for small square systems
//! - [`FiniteDifference`]: second-order scalar differentiation

pub mod diff;
pub mod least_squares;
pub mod newton;
pub mod root;

pub use diff::{FiniteDifference, FiniteDifferenceType};
pub use least_squares::{
    LeastSquaresResult, LeastSquaresSolver, LevenbergMarquardt, LevenbergMarquardtConfig,
    ParameterBound,
};
pub use newton::{NewtonConfig, NewtonVectorRootFinder};
pub use root::{RealRootFinder, RidderConfig, RidderRootFinder};
