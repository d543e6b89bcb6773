//! Character budget configuration.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use voxgate_error::ConfigError;

/// Character caps and window lengths.
///
/// # Example
///
/// ```toml
/// [quota]
/// max_chars_per_request = 5000
/// max_chars_per_day = 50000
/// max_chars_per_month = 1000000
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_builder::Builder)]
#[builder(default)]
pub struct QuotaConfig {
    /// Largest billable text a single request may carry
    #[serde(default = "default_max_chars_per_request")]
    max_chars_per_request: u64,

    /// Characters allowed per daily window
    #[serde(default = "default_max_chars_per_day")]
    max_chars_per_day: u64,

    /// Characters allowed per monthly window
    #[serde(default = "default_max_chars_per_month")]
    max_chars_per_month: u64,

    /// Length of the daily window in seconds
    #[serde(default = "default_daily_window_secs")]
    daily_window_secs: u64,

    /// Length of the monthly window in seconds
    #[serde(default = "default_monthly_window_secs")]
    monthly_window_secs: u64,
}

fn default_max_chars_per_request() -> u64 {
    5_000
}

fn default_max_chars_per_day() -> u64 {
    50_000
}

fn default_max_chars_per_month() -> u64 {
    1_000_000
}

fn default_daily_window_secs() -> u64 {
    86_400
}

fn default_monthly_window_secs() -> u64 {
    30 * 86_400
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            max_chars_per_request: default_max_chars_per_request(),
            max_chars_per_day: default_max_chars_per_day(),
            max_chars_per_month: default_max_chars_per_month(),
            daily_window_secs: default_daily_window_secs(),
            monthly_window_secs: default_monthly_window_secs(),
        }
    }
}

impl QuotaConfig {
    /// Creates a new quota config builder.
    pub fn builder() -> QuotaConfigBuilder {
        QuotaConfigBuilder::default()
    }

    /// Validates that windows are non-empty.
    ///
    /// # Errors
    ///
    /// Returns an error if either window length is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daily_window_secs == 0 || self.monthly_window_secs == 0 {
            return Err(ConfigError::new(format!(
                "quota windows must be non-empty, got daily={}s monthly={}s",
                self.daily_window_secs, self.monthly_window_secs
            )));
        }
        Ok(())
    }

    pub(crate) fn daily_window(&self) -> chrono::Duration {
        window_length(self.daily_window_secs)
    }

    pub(crate) fn monthly_window(&self) -> chrono::Duration {
        window_length(self.monthly_window_secs)
    }
}

fn window_length(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1_000))
}
