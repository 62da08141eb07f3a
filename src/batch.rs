//! Fitting many independent smile slices at once.
//!
//! ```
//! use volsmile::batch::SmileBatch;
//! use volsmile::SmileSection;
//! use volsmile::extrapolation::TailFailureMode;
//!
//! let strikes = vec![80.0, 90.0, 100.0, 110.0, 120.0];
//! let vols = vec![0.26, 0.23, 0.21, 0.205, 0.21];
//!
//! let slices = SmileBatch::new()
//!     .beta(1.0)
//!     .tail_mode(TailFailureMode::Quiet)
//!     .add_slice(100.0, 1.0, &strikes, &vols)
//!     .add_slice(100.0, 0.25, &strikes, &vols)
//!     .build()?;
//!
//! assert_eq!(slices[0].expiry, 0.25);
//! assert!(slices[1].smile.vol(60.0)?.0 > 0.0);
//! # Ok::<(), volsmile::VolSmileError>(())
//! ```

use crate::error::{self, VolSmileError};
use crate::extrapolation::{ExtrapolatedSmile, ShiftedLogNormalTailFitter, TailFailureMode};
use crate::smile::{FitState, SabrModelFamily, SmileInterpolator, SmileInterpolatorConfig, SmileSection};
use crate::types::MarketPoint;
use crate::validate::validate_smile_inputs;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// One fitted slice.
pub struct FittedSlice {
    pub forward: f64,
    pub expiry: f64,
    pub state: FitState,
    /// Interpolated smile, with tails if a tail mode was set.
    pub smile: Box<dyn SmileSection>,
}

impl std::fmt::Debug for FittedSlice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FittedSlice")
            .field("forward", &self.forward)
            .field("expiry", &self.expiry)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Builder that fits a SABR smile interpolator to every added slice.
///
/// Each slice gets its own interpolator seeded with `config.seed + i`,
/// where `i` is the order in which the slice was added, so results do not
/// depend on how slices are scheduled.
#[derive(Debug, Default)]
pub struct SmileBatch {
    beta: Option<f64>,
    config: SmileInterpolatorConfig,
    tail_mode: Option<TailFailureMode>,
    slices: Vec<SliceData>,
}

#[derive(Debug)]
struct SliceData {
    forward: f64,
    expiry: f64,
    strikes: Vec<f64>,
    vols: Vec<f64>,
}

impl SmileBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold SABR beta fixed. By default it is fitted per slice.
    pub fn beta(mut self, beta: f64) -> Self {
        self.beta = Some(beta);
        self
    }

    pub fn config(mut self, config: SmileInterpolatorConfig) -> Self {
        self.config = config;
        self
    }

    /// Extrapolate every slice beyond its quotes with shifted log-normal tails.
    pub fn tail_mode(mut self, mode: TailFailureMode) -> Self {
        self.tail_mode = Some(mode);
        self
    }

    /// Add quotes for one expiry. `strikes` must be ascending.
    pub fn add_slice(mut self, forward: f64, expiry: f64, strikes: &[f64], vols: &[f64]) -> Self {
        self.slices.push(SliceData {
            forward,
            expiry,
            strikes: strikes.to_vec(),
            vols: vols.to_vec(),
        });
        self
    }

    /// Add validated quotes for one expiry.
    pub fn add_points(self, forward: f64, expiry: f64, points: &[MarketPoint]) -> Self {
        let (strikes, vols): (Vec<f64>, Vec<f64>) =
            points.iter().map(|p| (p.strike(), p.implied_vol())).unzip();
        self.add_slice(forward, expiry, &strikes, &vols)
    }

    /// Fit every slice and return them sorted by expiry.
    ///
    /// # Errors
    /// Returns [`VolSmileError::InvalidInput`] if no slice was added or any
    /// slice is invalid, and the first fit or tail error otherwise.
    pub fn build(self) -> error::Result<Vec<FittedSlice>> {
        #[cfg(feature = "logging")]
        tracing::debug!(
            n_slices = self.slices.len(),
            beta = ?self.beta,
            tail_mode = ?self.tail_mode,
            "smile batch started"
        );

        if self.slices.is_empty() {
            return Err(VolSmileError::InvalidInput {
                message: "at least one slice is required".into(),
            });
        }
        let family = SabrModelFamily::new(self.beta)?;
        for slice in &self.slices {
            validate_smile_inputs(slice.forward, &slice.strikes, slice.expiry, &slice.vols, 3)?;
        }

        let config = &self.config;
        let tail_mode = self.tail_mode;
        let tail_fitter = ShiftedLogNormalTailFitter::default();
        let fit_slice = |(index, slice): (usize, &SliceData)| -> error::Result<FittedSlice> {
            let slice_config = SmileInterpolatorConfig {
                seed: config.seed.wrapping_add(index as u64),
                ..config.clone()
            };
            let mut interpolator = SmileInterpolator::new(family.clone(), slice_config)?;
            let interior = interpolator.fit(slice.forward, &slice.strikes, slice.expiry, &slice.vols)?;
            let state = interior.state();
            let smile: Box<dyn SmileSection> = match tail_mode {
                Some(mode) => Box::new(ExtrapolatedSmile::new(
                    interior,
                    &slice.strikes,
                    &slice.vols,
                    mode,
                    &tail_fitter,
                )?),
                None => Box::new(interior),
            };
            Ok(FittedSlice {
                forward: slice.forward,
                expiry: slice.expiry,
                state,
                smile,
            })
        };

        #[cfg(feature = "parallel")]
        let mut fitted: Vec<FittedSlice> = self
            .slices
            .par_iter()
            .enumerate()
            .map(fit_slice)
            .collect::<error::Result<Vec<_>>>()?;
        #[cfg(not(feature = "parallel"))]
        let mut fitted: Vec<FittedSlice> = self
            .slices
            .iter()
            .enumerate()
            .map(fit_slice)
            .collect::<error::Result<Vec<_>>>()?;

        fitted.sort_by(|a, b| a.expiry.total_cmp(&b.expiry));

        #[cfg(feature = "logging")]
        tracing::debug!(
            n_slices = fitted.len(),
            n_degraded = fitted
                .iter()
                .filter(|s| s.state == FitState::DegradedGlobalOnly)
                .count(),
            "smile batch complete"
        );

        Ok(fitted)
    }
}
