//! Integration tests for the volsmile pipeline.
//!
//! Exercises the full path from quotes through the global and local fits,
//! blending, tail extrapolation and batch fitting, using only the public API.

use std::sync::Arc;
use std::thread;

use approx::assert_abs_diff_eq;
use volsmile::{OptionType, VolSmileError};
use volsmile::batch::SmileBatch;
use volsmile::extrapolation::{
    ExtrapolatedSmile, SabrTailExtrapolation, ShiftedLogNormalTailFitter, TailFailureMode, TailSide,
};
use volsmile::optim::{LevenbergMarquardt, LevenbergMarquardtConfig};
use volsmile::smile::{
    FitState, SabrHaganVolatilityFunction, SabrModelFamily, SabrSmile, SmileInterpolator,
    SmileInterpolatorConfig, SmileSection,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const FORWARD: f64 = 100.0;
const EXPIRY: f64 = 1.0;

fn standard_strikes() -> Vec<f64> {
    vec![70.0, 80.0, 90.0, 95.0, 100.0, 105.0, 110.0, 120.0, 130.0]
}

/// Quotes generated from a single SABR parameter set.
fn sabr_quotes(beta: f64, rho: f64, nu: f64) -> Vec<f64> {
    let alpha = 0.2 * FORWARD.powf(1.0 - beta);
    let sabr = SabrSmile::new(FORWARD, EXPIRY, alpha, beta, rho, nu).unwrap();
    standard_strikes()
        .iter()
        .map(|&k| sabr.vol(k).unwrap().0)
        .collect()
}

/// Equity-like skew that no single SABR parameter set fits exactly.
fn market_quotes() -> Vec<f64> {
    let noise = [0.002, -0.001, 0.0, 0.001, 0.0, -0.001, 0.0, 0.001, -0.002];
    sabr_quotes(1.0, -0.4, 0.6)
        .iter()
        .zip(noise)
        .map(|(v, e)| v + e)
        .collect()
}

// ---------------------------------------------------------------------------
// Interpolation
// ---------------------------------------------------------------------------

#[test]
fn fit_smile_reproduces_sabr_quotes() -> Result<(), Box<dyn std::error::Error>> {
    let strikes = standard_strikes();
    let vols = sabr_quotes(0.5, -0.3, 0.4);
    let smile = volsmile::fit_smile(FORWARD, &strikes, EXPIRY, &vols)?;
    assert_eq!(smile.state(), FitState::Refined);
    assert_eq!(smile.fit_results().len(), strikes.len() - 2);
    for (&k, &v) in strikes.iter().zip(&vols) {
        assert_abs_diff_eq!(smile.vol(k)?.0, v, epsilon = 1e-4);
    }
    Ok(())
}

#[test]
fn market_skew_is_matched_at_every_quote() -> Result<(), Box<dyn std::error::Error>> {
    let strikes = standard_strikes();
    let vols = market_quotes();
    let mut interpolator = SmileInterpolator::builder(SabrModelFamily::new(Some(1.0))?)
        .seed(7)
        .build()?;
    let smile = interpolator.fit(FORWARD, &strikes, EXPIRY, &vols)?;
    for (&k, &v) in strikes.iter().zip(&vols) {
        assert_abs_diff_eq!(smile.vol(k)?.0, v, epsilon = 5e-4);
    }
    Ok(())
}

#[test]
fn interpolated_smile_is_continuous_across_knots() -> Result<(), Box<dyn std::error::Error>> {
    let strikes = standard_strikes();
    let smile = volsmile::fit_smile(FORWARD, &strikes, EXPIRY, &market_quotes())?;
    for &k in &strikes[1..strikes.len() - 1] {
        let below = smile.vol(k - 1e-7)?.0;
        let above = smile.vol(k + 1e-7)?.0;
        assert_abs_diff_eq!(below, above, epsilon = 1e-5);
    }
    Ok(())
}

#[test]
fn every_weighting_reproduces_quotes() -> Result<(), Box<dyn std::error::Error>> {
    let strikes = standard_strikes();
    let vols = sabr_quotes(1.0, -0.2, 0.5);
    for name in ["Linear", "Sine", "Cosine"] {
        let mut interpolator = SmileInterpolator::builder(SabrModelFamily::new(Some(1.0))?)
            .weighting(name)
            .build()?;
        let smile = interpolator.fit(FORWARD, &strikes, EXPIRY, &vols)?;
        assert_eq!(smile.weighting().name(), name);
        for (&k, &v) in strikes.iter().zip(&vols) {
            assert_abs_diff_eq!(smile.vol(k)?.0, v, epsilon = 1e-4);
        }
    }
    Ok(())
}

#[test]
fn custom_solver_is_used() -> Result<(), Box<dyn std::error::Error>> {
    let solver = LevenbergMarquardt::new(LevenbergMarquardtConfig::default());
    let mut interpolator = SmileInterpolator::builder(SabrModelFamily::default())
        .solver(Box::new(solver))
        .build()?;
    let smile = interpolator.fit(FORWARD, &standard_strikes(), EXPIRY, &market_quotes())?;
    assert!(smile.vol(100.0)?.0 > 0.0);
    Ok(())
}

#[test]
fn config_from_json_drives_the_interpolator() -> Result<(), Box<dyn std::error::Error>> {
    let config: SmileInterpolatorConfig =
        serde_json::from_str(r#"{"weighting": "Linear", "seed": 11}"#)?;
    assert_eq!(config.max_tries, 20);
    let interpolator = SmileInterpolator::new(SabrModelFamily::default(), config)?;
    assert_eq!(interpolator.config().weighting, "Linear");

    let bad: SmileInterpolatorConfig = serde_json::from_str(r#"{"weighting": "Cubic"}"#)?;
    assert!(matches!(
        SmileInterpolator::new(SabrModelFamily::default(), bad),
        Err(VolSmileError::InvalidInput { .. })
    ));
    Ok(())
}

#[test]
fn invalid_quotes_are_rejected_before_fitting() {
    let r = volsmile::fit_smile(FORWARD, &[90.0, 100.0], EXPIRY, &[0.2, 0.2]);
    assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
    let r = volsmile::fit_smile(FORWARD, &[90.0, 110.0, 100.0], EXPIRY, &[0.2, 0.2, 0.2]);
    assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
    let r = volsmile::fit_smile(-1.0, &[90.0, 100.0, 110.0], EXPIRY, &[0.2, 0.2, 0.2]);
    assert!(matches!(r, Err(VolSmileError::InvalidInput { .. })));
}

// ---------------------------------------------------------------------------
// Extrapolation
// ---------------------------------------------------------------------------

#[test]
fn extrapolated_market_smile_is_smooth_and_positive() -> Result<(), Box<dyn std::error::Error>> {
    let strikes = standard_strikes();
    let vols = market_quotes();
    let interior = volsmile::fit_smile(FORWARD, &strikes, EXPIRY, &vols)?;
    let smile = ExtrapolatedSmile::new(
        interior,
        &strikes,
        &vols,
        TailFailureMode::Quiet,
        &ShiftedLogNormalTailFitter::default(),
    )?;
    for k in [70.0, 130.0] {
        assert_abs_diff_eq!(smile.vol(k - 1e-6)?.0, smile.vol(k + 1e-6)?.0, epsilon = 1e-5);
    }
    for k in [40.0, 50.0, 60.0, 150.0, 180.0, 250.0] {
        let v = smile.vol(k)?.0;
        assert!(v.is_finite() && v > 0.0, "vol {v} at {k}");
    }
    Ok(())
}

#[test]
fn flat_mode_extends_boundary_quotes() -> Result<(), Box<dyn std::error::Error>> {
    let strikes = standard_strikes();
    let vols = market_quotes();
    let interior = volsmile::fit_smile(FORWARD, &strikes, EXPIRY, &vols)?;
    let smile = ExtrapolatedSmile::new(
        interior,
        &strikes,
        &vols,
        TailFailureMode::Flat,
        &ShiftedLogNormalTailFitter::default(),
    )?;
    assert_eq!(smile.vol(50.0)?.0, vols[0]);
    assert_eq!(smile.vol(200.0)?.0, vols[vols.len() - 1]);
    Ok(())
}

#[test]
fn fit_tail_matches_boundary_slope() -> Result<(), Box<dyn std::error::Error>> {
    let params = volsmile::fit_tail(FORWARD, 120.0, 0.22, 0.001, EXPIRY, TailFailureMode::Exception)?;
    let tail = volsmile::extrapolation::ShiftedLogNormal::new(FORWARD, EXPIRY, params)?;
    assert_abs_diff_eq!(tail.vol(120.0)?, 0.22, epsilon = 1e-8);
    assert_abs_diff_eq!(tail.vol_slope(120.0)?, 0.001, epsilon = 1e-6);
    Ok(())
}

#[test]
fn sabr_tail_continues_the_last_local_fit() -> Result<(), Box<dyn std::error::Error>> {
    let strikes = standard_strikes();
    let smile = volsmile::fit_smile(FORWARD, &strikes, EXPIRY, &sabr_quotes(0.5, -0.3, 0.4))?;
    let last = smile.fit_results().last().ok_or("no fits")?.parameters;
    let tail = SabrTailExtrapolation::new(
        FORWARD,
        last,
        130.0,
        EXPIRY,
        2.5,
        TailSide::Right,
        SabrHaganVolatilityFunction,
    )?;
    assert_abs_diff_eq!(tail.vol(130.0)?, smile.vol(130.0)?.0, epsilon = 1e-6);
    let deep = tail.price(300.0, OptionType::Call)?;
    let near = tail.price(150.0, OptionType::Call)?;
    assert!(deep > 0.0 && deep < near);
    Ok(())
}

// ---------------------------------------------------------------------------
// Batch and concurrency
// ---------------------------------------------------------------------------

#[test]
fn batch_fits_every_slice() -> Result<(), Box<dyn std::error::Error>> {
    let strikes = standard_strikes();
    let slices = SmileBatch::new()
        .beta(0.5)
        .tail_mode(TailFailureMode::Quiet)
        .add_slice(FORWARD, 2.0, &strikes, &market_quotes())
        .add_slice(FORWARD, 0.5, &strikes, &market_quotes())
        .build()?;
    assert_eq!(slices.len(), 2);
    assert!(slices[0].expiry < slices[1].expiry);
    for slice in &slices {
        for k in [50.0, 100.0, 200.0] {
            assert!(slice.smile.vol(k)?.0 > 0.0);
        }
    }
    Ok(())
}

#[test]
fn concurrent_smile_queries() -> Result<(), Box<dyn std::error::Error>> {
    let strikes = standard_strikes();
    let smile = Arc::new(volsmile::fit_smile(FORWARD, &strikes, EXPIRY, &market_quotes())?);
    let expected: Vec<f64> = (60..=140)
        .map(|k| smile.vol(k as f64).map(|v| v.0))
        .collect::<volsmile::Result<_>>()?;
    let expected = Arc::new(expected);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let s = Arc::clone(&smile);
            let e = Arc::clone(&expected);
            thread::spawn(move || -> volsmile::Result<()> {
                for (i, k) in (60..=140).enumerate() {
                    assert_eq!(s.vol(k as f64)?.0, e[i]);
                }
                Ok(())
            })
        })
        .collect();
    for h in handles {
        h.join().expect("thread panicked")?;
    }
    Ok(())
}

#[test]
fn separately_seeded_interpolators_are_independent() -> Result<(), Box<dyn std::error::Error>> {
    let strikes = standard_strikes();
    let vols = market_quotes();
    let handles: Vec<_> = (0..3)
        .map(|_| {
            let (strikes, vols) = (strikes.clone(), vols.clone());
            thread::spawn(move || -> volsmile::Result<f64> {
                let mut interpolator = SmileInterpolator::builder(SabrModelFamily::default())
                    .seed(3)
                    .build()?;
                interpolator.fit(FORWARD, &strikes, EXPIRY, &vols)?.vol(97.0).map(|v| v.0)
            })
        })
        .collect();
    let results: Vec<f64> = handles
        .into_iter()
        .map(|h| h.join().expect("thread panicked"))
        .collect::<volsmile::Result<_>>()?;
    assert!(results.windows(2).all(|w| w[0] == w[1]));
    Ok(())
}
