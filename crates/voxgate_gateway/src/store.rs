//! Shared guardrail state.

use std::sync::Arc;
use voxgate_cache::{CacheConfig, ResultCache};
use voxgate_core::SharedClock;
use voxgate_quota::{QuotaConfig, QuotaTracker};
use voxgate_rate_limit::{RateLimitConfig, TokenBucketLimiter};

/// The limiter, budget tracker and result cache of one gateway instance.
///
/// Constructed explicitly and injected, so independent instances (for
/// example one per test) never share state. Cloning shares the stores.
#[derive(Debug, Clone)]
pub struct GuardrailStore {
    limiter: Arc<TokenBucketLimiter>,
    quota: Arc<QuotaTracker>,
    cache: ResultCache,
}

impl GuardrailStore {
    /// Build all three stores on one clock.
    pub fn new(
        identity_limit: RateLimitConfig,
        global_limit: RateLimitConfig,
        quota: QuotaConfig,
        cache: CacheConfig,
        clock: SharedClock,
    ) -> Self {
        Self {
            limiter: Arc::new(TokenBucketLimiter::new(
                identity_limit,
                global_limit,
                Arc::clone(&clock),
            )),
            quota: Arc::new(QuotaTracker::new(quota, Arc::clone(&clock))),
            cache: ResultCache::new(cache, clock),
        }
    }

    /// Store with default limits on `clock`.
    pub fn with_defaults(clock: SharedClock) -> Self {
        Self::new(
            RateLimitConfig::default(),
            RateLimitConfig::global_default(),
            QuotaConfig::default(),
            CacheConfig::default(),
            clock,
        )
    }

    /// Request rate limiter.
    pub fn limiter(&self) -> &TokenBucketLimiter {
        &self.limiter
    }

    /// Character budget tracker.
    pub fn quota(&self) -> &QuotaTracker {
        &self.quota
    }

    /// Synthesis result cache.
    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Clear limiter, budget and cache state.
    pub fn reset(&self) {
        self.limiter.reset();
        self.quota.reset();
        self.cache.reset();
    }
}
