//! Cached synthesis results.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::Serialize;

use crate::CacheKey;

/// Description of how a cached clip was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Getters)]
pub struct CacheMetadata {
    /// Text that was synthesised
    source_text: String,
    /// Provider voice identifier
    voice_id: String,
    /// Audio container format
    format: String,
    /// Provider model identifier
    model: String,
    /// Clip length, when the provider reports it
    duration_seconds: Option<f64>,
    /// When the entry was written to the cache
    created_at: Option<DateTime<Utc>>,
}

impl CacheMetadata {
    /// Describe a clip. `created_at` is stamped when the entry is stored.
    pub fn new(
        source_text: impl Into<String>,
        voice_id: impl Into<String>,
        format: impl Into<String>,
        model: impl Into<String>,
        duration_seconds: Option<f64>,
    ) -> Self {
        Self {
            source_text: source_text.into(),
            voice_id: voice_id.into(),
            format: format.into(),
            model: model.into(),
            duration_seconds,
            created_at: None,
        }
    }

    pub(crate) fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }
}

/// Immutable cache entry.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct CacheEntry {
    /// Content address
    key: CacheKey,
    /// Audio payload
    audio: Bytes,
    /// Provenance
    metadata: CacheMetadata,
}

impl CacheEntry {
    pub(crate) fn new(key: CacheKey, audio: Bytes, metadata: CacheMetadata) -> Self {
        Self {
            key,
            audio,
            metadata,
        }
    }

    /// Size of the audio payload in bytes.
    pub fn size(&self) -> usize {
        self.audio.len()
    }

    pub(crate) fn is_expired(&self, ttl: Option<chrono::Duration>, now: DateTime<Utc>) -> bool {
        match (ttl, self.metadata.created_at) {
            (Some(ttl), Some(created_at)) => created_at
                .checked_add_signed(ttl)
                .is_some_and(|expires| now >= expires),
            _ => false,
        }
    }
}
