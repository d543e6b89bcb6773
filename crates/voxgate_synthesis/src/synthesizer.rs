//! The text-to-speech provider seam.

use crate::SynthesisRequest;
use async_trait::async_trait;
use bytes::Bytes;
use derive_getters::Getters;
use std::sync::Arc;
use voxgate_error::SynthesisError;

/// Audio produced by a provider.
#[derive(Debug, Clone, PartialEq, Getters)]
pub struct SynthesizedAudio {
    /// Encoded audio in the requested format
    audio: Bytes,
    /// Clip length, when known
    duration_seconds: Option<f64>,
}

impl SynthesizedAudio {
    /// Wrap encoded audio.
    pub fn new(audio: Bytes, duration_seconds: Option<f64>) -> Self {
        Self {
            audio,
            duration_seconds,
        }
    }
}

/// A text-to-speech provider.
///
/// Failures are reported as-is and never retried by voxgate.
#[async_trait]
pub trait Synthesizer: Send + Sync + std::fmt::Debug {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Render `request` as audio.
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesizedAudio, SynthesisError>;
}

#[async_trait]
impl<S: Synthesizer + ?Sized> Synthesizer for Arc<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesizedAudio, SynthesisError> {
        (**self).synthesize(request).await
    }
}
