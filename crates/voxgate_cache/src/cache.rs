//! Result cache with LRU eviction and in-flight de-duplication.

use crate::{CacheConfig, CacheEntry, CacheKey, CacheMetadata};
use bytes::Bytes;
use derive_getters::Getters;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use voxgate_core::SharedClock;
use voxgate_error::{SynthesisError, SynthesisErrorKind};

type Pending = Shared<BoxFuture<'static, Result<Arc<CacheEntry>, SynthesisError>>>;

/// How a `get_or_compute` call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display)]
pub enum CacheStatus {
    /// Served from a stored entry
    #[display("HIT")]
    Hit,
    /// This caller started the computation
    #[display("MISS")]
    Miss,
    /// Joined a computation another caller had already started
    #[display("COALESCED")]
    Coalesced,
}

impl CacheStatus {
    /// Whether the audio came straight from storage.
    pub fn is_hit(self) -> bool {
        matches!(self, Self::Hit)
    }
}

/// A resolved lookup.
#[derive(Debug, Clone, Getters)]
pub struct CacheLookup {
    /// The cached (or freshly computed) entry
    entry: Arc<CacheEntry>,
    /// How the lookup was satisfied
    status: CacheStatus,
}

/// Cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Getters)]
pub struct CacheStats {
    /// Lookups served from storage
    hits: u64,
    /// Lookups that started a computation or found nothing
    misses: u64,
    /// Lookups that joined an in-flight computation
    coalesced: u64,
    /// Entries removed to respect the size bounds
    evictions: u64,
    /// Entries currently stored
    entries: usize,
    /// Audio bytes currently stored
    bytes: usize,
    /// Computations currently running
    in_flight: usize,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<CacheKey, Arc<CacheEntry>>,
    access_order: VecDeque<CacheKey>,
    total_bytes: usize,
    in_flight: HashMap<CacheKey, Pending>,
    generation: u64,
    stats: CacheStats,
}

impl CacheState {
    fn touch(&mut self, key: &CacheKey) {
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            self.access_order.remove(pos);
        }
        self.access_order.push_back(key.clone());
    }

    fn remove(&mut self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        let entry = self.entries.remove(key)?;
        self.total_bytes = self.total_bytes.saturating_sub(entry.size());
        if let Some(pos) = self.access_order.iter().position(|k| k == key) {
            self.access_order.remove(pos);
        }
        Some(entry)
    }

    /// Live entry for `key`, dropping it first if its lifetime has passed.
    fn lookup(
        &mut self,
        key: &CacheKey,
        ttl: Option<chrono::Duration>,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Option<Arc<CacheEntry>> {
        let expired = self.entries.get(key)?.is_expired(ttl, now);
        if expired {
            debug!(key = %key, "Cache entry expired");
            self.remove(key);
            return None;
        }
        self.touch(key);
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, entry: Arc<CacheEntry>, config: &CacheConfig) {
        let key = entry.key().clone();
        if entry.size() > *config.max_bytes() {
            warn!(key = %key, size = entry.size(), "Entry larger than cache, not stored");
            return;
        }

        self.remove(&key);
        self.total_bytes += entry.size();
        self.entries.insert(key.clone(), entry);
        self.access_order.push_back(key);
        self.evict(config);
    }

    /// Evict least recently used entries until both bounds hold.
    /// Keys with a computation in flight are skipped.
    fn evict(&mut self, config: &CacheConfig) {
        while self.entries.len() > *config.max_entries() || self.total_bytes > *config.max_bytes() {
            let Some(victim) = self
                .access_order
                .iter()
                .find(|k| !self.in_flight.contains_key(*k))
                .cloned()
            else {
                break;
            };
            self.remove(&victim);
            self.stats.evictions += 1;
            debug!(key = %victim, "Evicted cache entry");
        }
    }
}

struct Inner {
    config: CacheConfig,
    clock: SharedClock,
    state: Mutex<CacheState>,
}

impl Inner {
    /// Publish a finished computation and retire its in-flight slot.
    fn complete(
        &self,
        key: &CacheKey,
        generation: u64,
        outcome: Result<(Bytes, CacheMetadata), SynthesisError>,
    ) -> Result<Arc<CacheEntry>, SynthesisError> {
        let now = self.clock.now();
        let mut state = self.state.lock();
        let current = state.generation == generation;
        if current {
            state.in_flight.remove(key);
        }

        match outcome {
            Ok((audio, metadata)) => {
                let entry = Arc::new(CacheEntry::new(key.clone(), audio, metadata.stamped(now)));
                if current && *self.config.enabled() {
                    state.insert(Arc::clone(&entry), &self.config);
                }
                Ok(entry)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Computation failed, nothing cached");
                Err(e)
            }
        }
    }
}

/// Content-addressed synthesis result cache.
///
/// Cloning is cheap and clones share storage.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use serde_json::json;
/// use std::sync::Arc;
/// use voxgate_cache::{CacheConfig, CacheKey, CacheMetadata, CacheStatus, ResultCache};
/// use voxgate_core::SystemClock;
///
/// # #[tokio::main]
/// # async fn main() {
/// let cache = ResultCache::new(CacheConfig::default(), Arc::new(SystemClock));
/// let key = CacheKey::compute("hello", "alloy", "wav", "tone", &json!({}));
///
/// let first = cache
///     .get_or_compute(&key, || async {
///         let metadata = CacheMetadata::new("hello", "alloy", "wav", "tone", None);
///         Ok((Bytes::from_static(b"RIFF"), metadata))
///     })
///     .await
///     .unwrap();
/// assert_eq!(*first.status(), CacheStatus::Miss);
///
/// let second = cache.get(&key).unwrap();
/// assert_eq!(second.audio().as_ref(), b"RIFF");
/// # }
/// ```
#[derive(Clone)]
pub struct ResultCache {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl ResultCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig, clock: SharedClock) -> Self {
        debug!(
            enabled = config.enabled(),
            max_entries = config.max_entries(),
            max_bytes = config.max_bytes(),
            ttl_secs = config.ttl_secs(),
            "Creating result cache"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                state: Mutex::new(CacheState::default()),
            }),
        }
    }

    /// Cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    /// Stored entry for `key`, if present and not expired.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        if !*self.inner.config.enabled() {
            return None;
        }
        let now = self.inner.clock.now();
        let ttl = self.inner.config.ttl();
        let mut state = self.inner.state.lock();
        let found = state.lookup(key, ttl, now);
        if found.is_some() {
            state.stats.hits += 1;
        } else {
            state.stats.misses += 1;
        }
        found
    }

    /// Store `audio` under `key`, replacing any previous entry.
    pub fn put(&self, key: CacheKey, audio: Bytes, metadata: CacheMetadata) -> Arc<CacheEntry> {
        let now = self.inner.clock.now();
        let entry = Arc::new(CacheEntry::new(key, audio, metadata.stamped(now)));
        if *self.inner.config.enabled() {
            self.inner
                .state
                .lock()
                .insert(Arc::clone(&entry), &self.inner.config);
        }
        entry
    }

    /// Return the stored entry for `key`, or run `compute` to produce it.
    ///
    /// Concurrent callers for the same key share one computation: the first
    /// caller starts it and later callers await its result. The computation
    /// runs on its own task, so it finishes (and populates the cache) even if
    /// every caller stops waiting. Failures are delivered to all waiters and
    /// never cached. `compute` is called while the in-flight slot is being
    /// registered and should only build the future.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> Result<CacheLookup, SynthesisError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(Bytes, CacheMetadata), SynthesisError>> + Send + 'static,
    {
        let now = self.inner.clock.now();
        let ttl = self.inner.config.ttl();

        let (pending, status) = {
            let mut state = self.inner.state.lock();

            let stored = if *self.inner.config.enabled() {
                state.lookup(key, ttl, now)
            } else {
                None
            };
            if let Some(entry) = stored {
                state.stats.hits += 1;
                debug!("Cache hit");
                return Ok(CacheLookup {
                    entry,
                    status: CacheStatus::Hit,
                });
            }

            if let Some(pending) = state.in_flight.get(key).cloned() {
                state.stats.coalesced += 1;
                debug!("Joining in-flight computation");
                (pending, CacheStatus::Coalesced)
            } else {
                state.stats.misses += 1;
                let pending = self.spawn_compute(key.clone(), state.generation, compute());
                state.in_flight.insert(key.clone(), pending.clone());
                debug!("Cache miss, computation started");
                (pending, CacheStatus::Miss)
            }
        };

        let entry = pending.await?;
        Ok(CacheLookup { entry, status })
    }

    fn spawn_compute<Fut>(&self, key: CacheKey, generation: u64, work: Fut) -> Pending
    where
        Fut: Future<Output = Result<(Bytes, CacheMetadata), SynthesisError>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let outcome = match AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(SynthesisError::new(SynthesisErrorKind::Cancelled(
                    "synthesis task panicked".to_string(),
                ))),
            };
            inner.complete(&key, generation, outcome)
        });

        async move {
            match handle.await {
                Ok(result) => result,
                Err(e) => Err(SynthesisError::new(SynthesisErrorKind::Cancelled(
                    e.to_string(),
                ))),
            }
        }
        .boxed()
        .shared()
    }

    /// Whether a computation for `key` is running.
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.inner.state.lock().in_flight.contains_key(key)
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let state = self.inner.state.lock();
        CacheStats {
            entries: state.entries.len(),
            bytes: state.total_bytes,
            in_flight: state.in_flight.len(),
            ..state.stats.clone()
        }
    }

    /// Drop every entry and forget running computations.
    ///
    /// Computations started before the reset still complete for their
    /// waiters but do not write into the cache.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        let generation = state.generation.wrapping_add(1);
        *state = CacheState {
            generation,
            ..CacheState::default()
        };
        debug!(generation, "Reset result cache");
    }
}
