//! Token bucket configuration.

use serde::{Deserialize, Serialize};
use voxgate_error::ConfigError;

/// Rate limit configuration for one bucket family.
///
/// # Example
///
/// ```toml
/// [rate_limit]
/// burst_capacity = 10
/// refill_per_second = 0.1667  # ~10 requests per minute
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum tokens a bucket can hold (requests admitted instantaneously)
    #[serde(default = "default_burst_capacity")]
    pub burst_capacity: u32,
    /// Tokens added per second of elapsed time
    #[serde(default = "default_refill_per_second")]
    pub refill_per_second: f64,
}

fn default_burst_capacity() -> u32 {
    10
}

fn default_refill_per_second() -> f64 {
    10.0 / 60.0
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst_capacity: default_burst_capacity(),
            refill_per_second: default_refill_per_second(),
        }
    }
}

impl RateLimitConfig {
    /// Create a configuration from explicit capacity and refill rate.
    pub fn new(burst_capacity: u32, refill_per_second: f64) -> Self {
        Self {
            burst_capacity,
            refill_per_second,
        }
    }

    /// Steady-state `requests` per minute with the given burst allowance.
    pub fn per_minute(requests: u32, burst_capacity: u32) -> Self {
        Self::new(burst_capacity, requests as f64 / 60.0)
    }

    /// Default global bucket: ten times the per-identity default.
    pub fn global_default() -> Self {
        Self::per_minute(100, 100)
    }

    /// Validate capacity and refill rate.
    ///
    /// # Errors
    ///
    /// Returns an error if capacity is zero or the refill rate is negative or not finite.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.burst_capacity == 0 {
            return Err(ConfigError::new("burst_capacity must be at least 1"));
        }
        if !self.refill_per_second.is_finite() || self.refill_per_second < 0.0 {
            return Err(ConfigError::new(format!(
                "refill_per_second must be a non-negative number, got {}",
                self.refill_per_second
            )));
        }
        Ok(())
    }

    pub(crate) fn capacity(&self) -> f64 {
        self.burst_capacity as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_minute_rate() {
        let config = RateLimitConfig::per_minute(60, 5);
        assert_eq!(config.burst_capacity, 5);
        assert!((config.refill_per_second - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        assert!(RateLimitConfig::new(0, 1.0).validate().is_err());
        assert!(RateLimitConfig::new(1, -1.0).validate().is_err());
        assert!(RateLimitConfig::new(1, f64::NAN).validate().is_err());
        assert!(RateLimitConfig::new(1, 0.0).validate().is_ok());
    }
}
