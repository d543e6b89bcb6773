//! Cache configuration.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use voxgate_error::ConfigError;

/// Configuration for the synthesis result cache.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Getters,
    derive_setters::Setters,
    derive_builder::Builder,
)]
#[setters(prefix = "with_")]
#[builder(default)]
pub struct CacheConfig {
    /// Whether results are stored (in-flight de-duplication always applies)
    #[serde(default = "default_enabled")]
    enabled: bool,

    /// Maximum cache size (number of entries)
    #[serde(default = "default_max_entries")]
    max_entries: usize,

    /// Maximum total audio bytes held
    #[serde(default = "default_max_bytes")]
    max_bytes: usize,

    /// Entry lifetime in seconds (0 keeps entries until evicted)
    #[serde(default = "default_ttl_secs")]
    ttl_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_max_entries() -> usize {
    1_000
}

fn default_max_bytes() -> usize {
    256 * 1024 * 1024
}

fn default_ttl_secs() -> u64 {
    7 * 86_400
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_entries: default_max_entries(),
            max_bytes: default_max_bytes(),
            ttl_secs: default_ttl_secs(),
        }
    }
}

impl CacheConfig {
    /// Creates a new cache config builder.
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }

    /// Validates size bounds.
    ///
    /// # Errors
    ///
    /// Returns an error if either bound is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::new("cache max_entries must be at least 1"));
        }
        if self.max_bytes == 0 {
            return Err(ConfigError::new("cache max_bytes must be at least 1"));
        }
        Ok(())
    }

    pub(crate) fn ttl(&self) -> Option<chrono::Duration> {
        (self.ttl_secs > 0).then(|| {
            let secs = i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
            chrono::Duration::seconds(secs.min(i64::MAX / 1_000))
        })
    }
}
