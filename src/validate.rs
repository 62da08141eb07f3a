//! Input validation helpers.
//!
//! Standardizes validation across the crate using `!is_finite()` to reject
//! NaN, +Inf, and -Inf uniformly.

use crate::error::VolSmileError;

/// Validate that a value is strictly positive and finite (rejects NaN, Inf, zero, negatives).
pub(crate) fn validate_positive(value: f64, name: &str) -> crate::error::Result<f64> {
    if !value.is_finite() || value <= 0.0 {
        return Err(VolSmileError::InvalidInput {
            message: format!("{name} must be positive and finite, got {value}"),
        });
    }
    Ok(value)
}

/// Validate that a value is non-negative and finite (rejects NaN, Inf, negatives).
pub(crate) fn validate_non_negative(value: f64, name: &str) -> crate::error::Result<f64> {
    if !value.is_finite() || value < 0.0 {
        return Err(VolSmileError::InvalidInput {
            message: format!("{name} must be non-negative and finite, got {value}"),
        });
    }
    Ok(value)
}

/// Validate that a value is finite (rejects NaN and Inf; allows zero and negatives).
pub(crate) fn validate_finite(value: f64, name: &str) -> crate::error::Result<f64> {
    if !value.is_finite() {
        return Err(VolSmileError::InvalidInput {
            message: format!("{name} must be finite, got {value}"),
        });
    }
    Ok(value)
}

/// Validate that two slices have the same length.
pub(crate) fn validate_same_len(a: &[f64], b: &[f64], a_name: &str, b_name: &str) -> crate::error::Result<()> {
    if a.len() != b.len() {
        return Err(VolSmileError::InvalidInput {
            message: format!(
                "{a_name} and {b_name} must have the same length, got {} and {}",
                a.len(),
                b.len()
            ),
        });
    }
    Ok(())
}

/// Validate that `xs` is finite and strictly ascending.
pub(crate) fn validate_strictly_ascending(xs: &[f64], name: &str) -> crate::error::Result<()> {
    for (i, &x) in xs.iter().enumerate() {
        validate_finite(x, name)?;
        if i > 0 && x <= xs[i - 1] {
            return Err(VolSmileError::InvalidInput {
                message: format!(
                    "{name} must be strictly ascending, got {} then {x} at index {i}",
                    xs[i - 1]
                ),
            });
        }
    }
    Ok(())
}

/// Validate a smile slice: positive forward and expiry, at least `min_points`
/// positive ascending strikes, and one non-negative vol per strike.
pub(crate) fn validate_smile_inputs(
    forward: f64,
    strikes: &[f64],
    expiry: f64,
    vols: &[f64],
    min_points: usize,
) -> crate::error::Result<()> {
    validate_positive(forward, "forward")?;
    validate_positive(expiry, "expiry")?;
    validate_same_len(strikes, vols, "strikes", "vols")?;
    if strikes.len() < min_points {
        return Err(VolSmileError::InvalidInput {
            message: format!(
                "need at least {min_points} quotes, got {}",
                strikes.len()
            ),
        });
    }
    validate_strictly_ascending(strikes, "strikes")?;
    for &k in strikes {
        validate_positive(k, "strike")?;
    }
    for &v in vols {
        validate_non_negative(v, "implied vol")?;
    }
    Ok(())
}
