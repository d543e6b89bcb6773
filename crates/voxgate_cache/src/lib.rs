//! Content-addressed cache of speech synthesis results.
//!
//! Keys are SHA-256 digests over the normalised request tuple, so identical
//! requests always share an entry. [`ResultCache::get_or_compute`] collapses
//! concurrent misses for one key into a single provider call whose result is
//! handed to every waiter.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod config;
mod entry;
mod key;

pub use cache::{CacheLookup, CacheStats, CacheStatus, ResultCache};
pub use config::{CacheConfig, CacheConfigBuilder};
pub use entry::{CacheEntry, CacheMetadata};
pub use key::CacheKey;
