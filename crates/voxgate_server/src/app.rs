//! Router and shared state.

use crate::{ProviderKind, VoxgateConfig};
use axum::body::Body;
use axum::extract::{Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use voxgate_core::SharedClock;
use voxgate_error::{ConfigError, VoxgateResult};
use voxgate_gateway::{
    ANONYMOUS_IDENTITY, AdmissionGateway, GuardedHandler, GuardrailStore, error_response,
};
use voxgate_synthesis::{
    HttpProviderConfig, HttpSynthesizer, SynthesisHandler, Synthesizer, ToneSynthesizer,
};

/// State shared by every route.
#[derive(Debug, Clone)]
pub struct AppState {
    gateway: AdmissionGateway,
    synthesize: GuardedHandler<SynthesisHandler<dyn Synthesizer>>,
    max_body_bytes: usize,
}

impl AppState {
    /// The admission gateway.
    pub fn gateway(&self) -> &AdmissionGateway {
        &self.gateway
    }
}

/// Instantiate the configured speech provider.
///
/// # Errors
///
/// Returns an error if the HTTP provider has no base URL or its client
/// cannot be built.
pub fn build_synthesizer(config: &VoxgateConfig) -> VoxgateResult<Arc<dyn Synthesizer>> {
    let provider = config.provider();
    let synthesizer: Arc<dyn Synthesizer> = match provider.kind() {
        ProviderKind::Tone => Arc::new(ToneSynthesizer::new(provider.tone().clone())),
        ProviderKind::Http => {
            let base_url = provider
                .base_url()
                .clone()
                .filter(|url| !url.is_empty())
                .ok_or_else(|| {
                    ConfigError::new("provider base_url is required for kind = \"http\"")
                })?;
            Arc::new(HttpSynthesizer::new(HttpProviderConfig::new(
                base_url,
                provider.api_key().clone(),
                *provider.timeout_secs(),
            ))?)
        }
    };
    info!(provider = synthesizer.name(), "Speech provider ready");
    Ok(synthesizer)
}

/// Wire stores, gateway and provider from `config`.
///
/// # Errors
///
/// Returns an error if the provider cannot be built.
pub fn build_state(config: &VoxgateConfig, clock: SharedClock) -> VoxgateResult<AppState> {
    let store = GuardrailStore::new(
        *config.rate_limit().identity(),
        *config.rate_limit().global(),
        config.quota().clone(),
        config.cache().clone(),
        clock,
    );
    let synthesizer = build_synthesizer(config)?;
    let gateway = AdmissionGateway::new(store.clone(), config.gateway().clone());
    let synthesize = gateway.wrap(SynthesisHandler::new(synthesizer, store.cache().clone()));

    Ok(AppState {
        gateway,
        synthesize,
        max_body_bytes: *config.server().max_body_bytes(),
    })
}

/// Creates the HTTP router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/synthesize", post(synthesize))
        .route("/health", get(health_check))
        .route("/status", get(status))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

/// Guarded synthesis endpoint.
async fn synthesize(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let bytes: Bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, limit = state.max_body_bytes, "Request body rejected");
            return error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "payload_too_large",
                format!("Request body exceeds {} bytes", state.max_body_bytes),
            )
            .map(Body::from)
            .into_response();
        }
    };

    state
        .synthesize
        .process(http::Request::from_parts(parts, bytes))
        .await
        .map(Body::from)
        .into_response()
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    identity: Option<String>,
}

/// Limiter, budget and cache snapshot. Never consumes allowance.
///
/// Reports only the caller's own identity; a query naming anyone else is ignored.
async fn status(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let mut caller = http::Request::new(Bytes::new());
    *caller.headers_mut() = headers;
    let identity = state
        .gateway
        .resolve_identity(&caller)
        .unwrap_or_else(|| ANONYMOUS_IDENTITY.to_string());

    if let Some(requested) = query.identity.filter(|requested| *requested != identity) {
        warn!(
            requested = %requested,
            identity = %identity,
            "Status query for another identity ignored"
        );
    }
    (StatusCode::OK, Json(state.gateway.status(&identity)))
}
