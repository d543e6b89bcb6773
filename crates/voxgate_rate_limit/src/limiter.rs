//! Token bucket limiter with refill-on-read.

use crate::RateLimitConfig;
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};
use voxgate_core::{GuardrailDecision, SharedClock, elapsed_secs};

/// Key under which the shared bucket is reported.
pub const GLOBAL_BUCKET: &str = "*";

/// Upper bound on reported retry delays, used when a bucket never refills.
pub const MAX_RETRY_AFTER_SECS: u64 = 86_400;

/// Identity buckets kept before full, idle buckets are pruned.
const PRUNE_THRESHOLD: usize = 10_000;

/// Token bucket for one identity.
#[derive(Debug, Clone)]
struct TokenBucket {
    /// Current available tokens, always within `[0, burst_capacity]`
    tokens: f64,
    /// Last refill time
    last_refill: DateTime<Utc>,
    /// Requests admitted through this bucket
    request_count: u64,
}

impl TokenBucket {
    /// Create a full bucket.
    fn full(limit: &RateLimitConfig, now: DateTime<Utc>) -> Self {
        Self {
            tokens: limit.capacity(),
            last_refill: now,
            request_count: 0,
        }
    }

    /// Refill tokens based on elapsed time.
    fn refill(&mut self, limit: &RateLimitConfig, now: DateTime<Utc>) {
        self.tokens = self.projected_tokens(limit, now);
        if now > self.last_refill {
            self.last_refill = now;
        }
    }

    /// Token count the bucket would hold at `now`, without mutating it.
    fn projected_tokens(&self, limit: &RateLimitConfig, now: DateTime<Utc>) -> f64 {
        let added = elapsed_secs(self.last_refill, now) * limit.refill_per_second;
        (self.tokens + added).clamp(0.0, limit.capacity())
    }

    fn consume(&mut self) {
        self.tokens = (self.tokens - 1.0).max(0.0);
        self.request_count += 1;
    }

    fn is_full(&self, limit: &RateLimitConfig) -> bool {
        self.tokens >= limit.capacity()
    }
}

/// Seconds until `tokens` reaches `target` at the configured refill rate.
fn seconds_until(tokens: f64, target: f64, limit: &RateLimitConfig) -> u64 {
    if tokens >= target {
        return 0;
    }
    if limit.refill_per_second <= 0.0 {
        return MAX_RETRY_AFTER_SECS;
    }
    // Tolerate float noise so exact multiples do not round up a whole second.
    let secs = ((target - tokens) / limit.refill_per_second - 1e-9).ceil();
    (secs as u64).clamp(1, MAX_RETRY_AFTER_SECS)
}

#[derive(Debug)]
struct LimiterState {
    global: TokenBucket,
    identities: HashMap<String, TokenBucket>,
}

/// Observability snapshot for response headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Getters)]
pub struct LimiterStatus {
    /// Per-identity burst capacity
    limit: u32,
    /// Whole requests the caller could make right now
    remaining: u32,
    /// Seconds until the caller's bucket is full again, or until the shared
    /// bucket holds a token if that is later
    reset_after_secs: u64,
}

/// Point-in-time view of a single bucket, for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Getters)]
pub struct BucketSnapshot {
    /// Tokens currently held
    tokens: f64,
    /// Requests admitted so far
    request_count: u64,
}

/// Request-rate limiter keyed by caller identity plus one global bucket.
///
/// The refill and the decrement of both buckets happen inside one critical
/// section, so concurrent checks never lose updates and a request that is
/// refused by either bucket consumes nothing from the other.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use voxgate_core::ManualClock;
/// use voxgate_rate_limit::{RateLimitConfig, TokenBucketLimiter};
///
/// let clock = ManualClock::starting_now();
/// let limiter = TokenBucketLimiter::new(
///     RateLimitConfig::new(2, 1.0),
///     RateLimitConfig::new(100, 10.0),
///     Arc::new(clock),
/// );
///
/// assert!(limiter.check("alice").allowed);
/// assert!(limiter.check("alice").allowed);
/// assert!(!limiter.check("alice").allowed);
/// assert!(limiter.check("bob").allowed);
/// ```
#[derive(Debug)]
pub struct TokenBucketLimiter {
    identity_limit: RateLimitConfig,
    global_limit: RateLimitConfig,
    clock: SharedClock,
    state: Mutex<LimiterState>,
}

impl TokenBucketLimiter {
    /// Create a limiter with per-identity and global bucket configuration.
    pub fn new(
        identity_limit: RateLimitConfig,
        global_limit: RateLimitConfig,
        clock: SharedClock,
    ) -> Self {
        let now = clock.now();
        debug!(
            burst_capacity = identity_limit.burst_capacity,
            refill_per_second = identity_limit.refill_per_second,
            global_burst_capacity = global_limit.burst_capacity,
            "Creating token bucket limiter"
        );
        Self {
            identity_limit,
            global_limit,
            state: Mutex::new(LimiterState {
                global: TokenBucket::full(&global_limit, now),
                identities: HashMap::new(),
            }),
            clock,
        }
    }

    /// Per-identity bucket configuration.
    pub fn identity_limit(&self) -> &RateLimitConfig {
        &self.identity_limit
    }

    /// Global bucket configuration.
    pub fn global_limit(&self) -> &RateLimitConfig {
        &self.global_limit
    }

    /// Check whether `identity` may make a request now, consuming a token from
    /// both buckets if so.
    ///
    /// Denial is a normal decision carrying a positive `retry_after`.
    #[instrument(skip(self))]
    pub fn check(&self, identity: &str) -> GuardrailDecision {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let LimiterState { global, identities } = &mut *state;

        if identities.len() >= PRUNE_THRESHOLD && !identities.contains_key(identity) {
            prune_full(identities, &self.identity_limit, now);
        }

        global.refill(&self.global_limit, now);
        let bucket = identities
            .entry(identity.to_string())
            .or_insert_with(|| TokenBucket::full(&self.identity_limit, now));
        bucket.refill(&self.identity_limit, now);

        if bucket.tokens >= 1.0 && global.tokens >= 1.0 {
            bucket.consume();
            global.consume();
            debug!(
                tokens_remaining = bucket.tokens,
                global_tokens_remaining = global.tokens,
                "Rate limit check passed"
            );
            return GuardrailDecision::allow();
        }

        let retry_after = seconds_until(bucket.tokens, 1.0, &self.identity_limit)
            .max(seconds_until(global.tokens, 1.0, &self.global_limit));
        warn!(
            retry_after_secs = retry_after,
            identity_exhausted = bucket.tokens < 1.0,
            global_exhausted = global.tokens < 1.0,
            "Rate limit exceeded"
        );
        GuardrailDecision::rate_limited(retry_after)
    }

    /// Current limiter status for `identity`. Does not mutate any bucket.
    pub fn status(&self, identity: &str) -> LimiterStatus {
        let now = self.clock.now();
        let state = self.state.lock();

        let tokens = state
            .identities
            .get(identity)
            .map(|b| b.projected_tokens(&self.identity_limit, now))
            .unwrap_or_else(|| self.identity_limit.capacity());
        let global_tokens = state.global.projected_tokens(&self.global_limit, now);

        let identity_reset =
            seconds_until(tokens, self.identity_limit.capacity(), &self.identity_limit);
        let global_reset = seconds_until(global_tokens, 1.0, &self.global_limit);

        LimiterStatus {
            limit: self.identity_limit.burst_capacity,
            remaining: tokens.min(global_tokens).floor() as u32,
            reset_after_secs: identity_reset.max(global_reset),
        }
    }

    /// Snapshot of the bucket for `identity` (or [`GLOBAL_BUCKET`]), if it exists.
    pub fn bucket(&self, identity: &str) -> Option<BucketSnapshot> {
        let state = self.state.lock();
        let bucket = if identity == GLOBAL_BUCKET {
            Some(&state.global)
        } else {
            state.identities.get(identity)
        };
        bucket.map(|b| BucketSnapshot {
            tokens: b.tokens,
            request_count: b.request_count,
        })
    }

    /// Number of identity buckets currently tracked.
    pub fn tracked_identities(&self) -> usize {
        self.state.lock().identities.len()
    }

    /// Clear all bucket state. Test isolation only.
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.identities.clear();
        state.global = TokenBucket::full(&self.global_limit, now);
        debug!("Reset token bucket limiter");
    }
}

/// Drop identity buckets that have refilled completely; a fresh bucket is
/// indistinguishable from them.
fn prune_full(
    identities: &mut HashMap<String, TokenBucket>,
    limit: &RateLimitConfig,
    now: DateTime<Utc>,
) {
    let before = identities.len();
    identities.retain(|_, bucket| {
        bucket.refill(limit, now);
        !bucket.is_full(limit)
    });
    debug!(
        pruned = before - identities.len(),
        remaining = identities.len(),
        "Pruned idle rate limit buckets"
    );
}
