//! Validation utilities for sketch parameters and deserialization bounds checking

use crate::common::{Result, SketchError};

/// Validate that a compression parameter is finite and positive
pub fn validate_compression(compression: f64) -> Result<()> {
    if !compression.is_finite() || compression <= 0.0 {
        return Err(SketchError::InvalidInput {
            param: "compression".to_string(),
            value: compression.to_string(),
            constraint: "must be a finite value greater than 0".to_string(),
        });
    }
    Ok(())
}

/// Validate that an observation is a finite value (NaN and ±∞ are rejected)
pub fn validate_observation(x: f64) -> Result<()> {
    if !x.is_finite() {
        return Err(SketchError::InvalidInput {
            param: "x".to_string(),
            value: x.to_string(),
            constraint: "must be finite".to_string(),
        });
    }
    Ok(())
}

/// Validate that a weight is at least 1
pub fn validate_weight(w: u64) -> Result<()> {
    if w == 0 {
        return Err(SketchError::InvalidInput {
            param: "w".to_string(),
            value: w.to_string(),
            constraint: "must be greater than 0".to_string(),
        });
    }
    Ok(())
}

/// Validate that a quantile fraction lies in [0, 1]
pub fn validate_quantile_fraction(q: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&q) {
        return Err(SketchError::InvalidInput {
            param: "q".to_string(),
            value: q.to_string(),
            constraint: "must be in range [0.0, 1.0]".to_string(),
        });
    }
    Ok(())
}

/// Validate minimum required bytes for a deserialization header
pub fn validate_min_size(actual: usize, required: usize) -> Result<()> {
    if actual < required {
        return Err(SketchError::Truncated {
            needed: required,
            available: actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_compression_valid() {
        assert!(validate_compression(1.0).is_ok());
        assert!(validate_compression(100.0).is_ok());
        assert!(validate_compression(0.5).is_ok());
    }

    #[test]
    fn test_validate_compression_invalid() {
        assert!(validate_compression(0.0).is_err());
        assert!(validate_compression(-100.0).is_err());
        assert!(validate_compression(f64::NAN).is_err());
        assert!(validate_compression(f64::INFINITY).is_err());
    }

    #[test]
    fn test_validate_observation() {
        assert!(validate_observation(0.0).is_ok());
        assert!(validate_observation(-1e300).is_ok());
        assert!(validate_observation(f64::NAN).is_err());
        assert!(validate_observation(f64::INFINITY).is_err());
        assert!(validate_observation(f64::NEG_INFINITY).is_err());
    }

    #[test]
    fn test_validate_weight() {
        assert!(validate_weight(1).is_ok());
        assert!(validate_weight(u64::MAX).is_ok());
        assert!(validate_weight(0).is_err());
    }

    #[test]
    fn test_validate_quantile_fraction() {
        assert!(validate_quantile_fraction(0.0).is_ok());
        assert!(validate_quantile_fraction(0.5).is_ok());
        assert!(validate_quantile_fraction(1.0).is_ok());
        assert!(validate_quantile_fraction(-0.01).is_err());
        assert!(validate_quantile_fraction(1.01).is_err());
        assert!(validate_quantile_fraction(f64::NAN).is_err());
    }

    #[test]
    fn test_validate_min_size() {
        assert!(validate_min_size(16, 16).is_ok());
        assert_eq!(
            validate_min_size(10, 16),
            Err(SketchError::Truncated {
                needed: 16,
                available: 10
            })
        );
    }
}
