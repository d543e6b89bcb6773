//! Token bucket request-rate admission.
//!
//! Every check consults two buckets: one keyed by caller identity and one
//! shared by all callers. A request is admitted only when both hold at least
//! one token. Buckets refill lazily from elapsed clock time on each check, so
//! no background timers are needed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod limiter;

pub use config::RateLimitConfig;
pub use limiter::{
    BucketSnapshot, GLOBAL_BUCKET, LimiterStatus, MAX_RETRY_AFTER_SECS, TokenBucketLimiter,
};
