//! The cached synthesis endpoint.

use crate::{SynthesisRequest, Synthesizer};
use async_trait::async_trait;
use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use http::HeaderValue;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use voxgate_cache::{CacheMetadata, ResultCache};
use voxgate_error::{SynthesisError, VoxgateResult};
use voxgate_gateway::{
    CACHE_CONTROL_HIT, CACHE_CONTROL_MISS, GatewayRequest, GatewayResponse, Handler, X_CACHE,
};

/// Serves synthesis requests from the cache, calling the provider on a miss.
///
/// Concurrent identical requests share one provider call.
#[derive(Debug)]
pub struct SynthesisHandler<S: ?Sized> {
    synthesizer: Arc<S>,
    cache: ResultCache,
}

impl<S: ?Sized> Clone for SynthesisHandler<S> {
    fn clone(&self) -> Self {
        Self {
            synthesizer: Arc::clone(&self.synthesizer),
            cache: self.cache.clone(),
        }
    }
}

impl<S: Synthesizer + ?Sized + 'static> SynthesisHandler<S> {
    /// Handler using `synthesizer` behind `cache`.
    pub fn new(synthesizer: Arc<S>, cache: ResultCache) -> Self {
        info!(provider = synthesizer.name(), "Synthesis handler ready");
        Self { synthesizer, cache }
    }

    /// The provider.
    pub fn synthesizer(&self) -> &S {
        &self.synthesizer
    }
}

#[async_trait]
impl<S: Synthesizer + ?Sized + 'static> Handler for SynthesisHandler<S> {
    #[instrument(skip_all)]
    async fn handle(&self, request: GatewayRequest) -> VoxgateResult<GatewayResponse> {
        let synthesis = SynthesisRequest::from_json(request.body())?;
        let key = synthesis.cache_key();
        let content_type = synthesis.format.content_type();

        let synthesizer = Arc::clone(&self.synthesizer);
        let lookup = self
            .cache
            .get_or_compute(&key, move || async move {
                let audio = synthesizer.synthesize(&synthesis).await?;
                let metadata = CacheMetadata::new(
                    synthesis.text.clone(),
                    synthesis.voice.clone(),
                    synthesis.format.to_string(),
                    synthesis.model.clone(),
                    *audio.duration_seconds(),
                );
                Ok::<_, SynthesisError>((audio.audio().clone(), metadata))
            })
            .await?;

        let hit = lookup.status().is_hit();
        debug!(key = %key, status = %lookup.status(), "Synthesis served");

        let mut response = http::Response::new(lookup.entry().audio().clone());
        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
        headers.insert(
            X_CACHE,
            HeaderValue::from_static(if hit { "HIT" } else { "MISS" }),
        );
        headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static(if hit { CACHE_CONTROL_HIT } else { CACHE_CONTROL_MISS }),
        );
        Ok(response)
    }
}
