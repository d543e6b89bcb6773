//! The admission pipeline.

use crate::response::{
    annotate_budget, annotate_rate_limit, denial_response, handler_error_response,
    identity_required_response, internal_error_response,
};
use crate::{
    ANONYMOUS_IDENTITY, CharCountExtractor, GatewayConfig, GatewayRequest, GatewayResponse,
    GuardrailStore, Handler, HeaderIdentityResolver, IdentityResolver, RouteExtractors,
};
use async_trait::async_trait;
use derive_getters::Getters;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};
use voxgate_cache::CacheStats;
use voxgate_error::{
    GatewayError, GatewayErrorKind, GuardrailError, GuardrailErrorKind, VoxgateResult,
};
use voxgate_quota::QuotaStatus;
use voxgate_rate_limit::LimiterStatus;

/// Read-only view of one caller's allowance and the cache.
#[derive(Debug, Clone, Serialize, Getters)]
pub struct GatewayStatus {
    /// Identity the snapshot describes
    identity: String,
    /// Request rate allowance
    rate_limit: LimiterStatus,
    /// Character budget
    budget: QuotaStatus,
    /// Result cache counters
    cache: CacheStats,
}

#[derive(Debug)]
struct Admission {
    config: GatewayConfig,
    store: GuardrailStore,
    extractors: RouteExtractors,
    resolver: Arc<dyn IdentityResolver>,
}

/// Applies guardrails in front of handlers.
///
/// Built once with its configuration; route extractors are resolved at
/// construction, so the request path never guesses at payload shape.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use voxgate_core::SystemClock;
/// use voxgate_error::VoxgateError;
/// use voxgate_gateway::{
///     handler_fn, AdmissionGateway, GatewayConfig, GatewayRequest, GuardrailStore,
/// };
///
/// let store = GuardrailStore::with_defaults(Arc::new(SystemClock));
/// let gateway = AdmissionGateway::new(store, GatewayConfig::default());
/// let guarded = gateway.wrap(handler_fn(|_req: GatewayRequest| async {
///     Ok::<_, VoxgateError>(http::Response::new(bytes::Bytes::from_static(b"ok")))
/// }));
/// # let _ = guarded;
/// ```
#[derive(Debug, Clone)]
pub struct AdmissionGateway {
    admission: Arc<Admission>,
}

impl AdmissionGateway {
    /// Gateway over `store` with header-based identity resolution.
    pub fn new(store: GuardrailStore, config: GatewayConfig) -> Self {
        Self::with_parts(
            store,
            config,
            Arc::new(HeaderIdentityResolver::default()),
            None,
        )
    }

    /// Gateway with a custom identity policy and optional extra extractors.
    ///
    /// Extractors in `extra` replace those derived from the config for the same route.
    pub fn with_parts(
        store: GuardrailStore,
        config: GatewayConfig,
        resolver: Arc<dyn IdentityResolver>,
        extra: Option<Vec<(String, CharCountExtractor)>>,
    ) -> Self {
        let mut extractors = RouteExtractors::from_fields(config.billable_fields());
        for (route, extractor) in extra.into_iter().flatten() {
            extractors.insert(route, extractor);
        }
        info!(
            rate_limiting = config.enable_rate_limiting(),
            budget_guardrails = config.enable_budget_guardrails(),
            require_identity = config.require_identity(),
            ?extractors,
            "Admission gateway configured"
        );
        Self {
            admission: Arc::new(Admission {
                config,
                store,
                extractors,
                resolver,
            }),
        }
    }

    /// Guard `handler`.
    pub fn wrap<H: Handler>(&self, handler: H) -> GuardedHandler<H> {
        GuardedHandler {
            admission: Arc::clone(&self.admission),
            handler: Arc::new(handler),
        }
    }

    /// Gateway configuration.
    pub fn config(&self) -> &GatewayConfig {
        &self.admission.config
    }

    /// Underlying stores.
    pub fn store(&self) -> &GuardrailStore {
        &self.admission.store
    }

    /// Resolve the caller of `request` using the configured policy.
    pub fn resolve_identity(&self, request: &GatewayRequest) -> Option<String> {
        self.admission.resolver.resolve(request)
    }

    /// Snapshot for `identity`. Never consumes tokens or budget.
    pub fn status(&self, identity: &str) -> GatewayStatus {
        let store = &self.admission.store;
        GatewayStatus {
            identity: identity.to_string(),
            rate_limit: store.limiter().status(identity),
            budget: store.quota().status(identity),
            cache: store.cache().stats(),
        }
    }
}

/// A handler behind the admission pipeline.
///
/// Cloning shares the handler and the gateway state.
#[derive(Debug)]
pub struct GuardedHandler<H> {
    admission: Arc<Admission>,
    handler: Arc<H>,
}

impl<H> Clone for GuardedHandler<H> {
    fn clone(&self) -> Self {
        Self {
            admission: Arc::clone(&self.admission),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<H: Handler> GuardedHandler<H> {
    /// Run `request` through the pipeline.
    ///
    /// Always yields a response: denials, handler errors and handler panics
    /// are all rendered as JSON error responses.
    #[instrument(
        skip_all,
        fields(path = %request.uri().path(), identity = tracing::field::Empty)
    )]
    pub async fn process(&self, request: GatewayRequest) -> GatewayResponse {
        let admission = &self.admission;
        let config = &admission.config;
        let store = &admission.store;

        let identity = match admission.resolver.resolve(&request) {
            Some(identity) => identity,
            None if *config.require_identity() => {
                let err = GuardrailError::new(GuardrailErrorKind::IdentityRequired);
                warn!(error = %err, "Request without identity refused");
                return identity_required_response(&err);
            }
            None => ANONYMOUS_IDENTITY.to_string(),
        };
        tracing::Span::current().record("identity", identity.as_str());

        if *config.enable_rate_limiting() {
            let decision = store.limiter().check(&identity);
            if let Err(err) = decision.clone().into_result() {
                warn!(error = %err, retryable = err.kind().is_retryable(), "Admission denied");
                let mut response = denial_response(&decision);
                self.annotate(&mut response, &identity);
                return response;
            }
        }

        let char_count = if *config.enable_budget_guardrails() {
            let path = request.uri().path();
            let count = admission.extractors.char_count(path, request.body());
            if count.is_none() && admission.extractors.contains(path) {
                debug!("Billable text unreadable, budget check skipped");
            }
            count
        } else {
            None
        };

        let reservation = match char_count {
            Some(chars) => match store.quota().try_reserve(&identity, chars) {
                Ok(reservation) => Some(reservation),
                Err(decision) => {
                    if let Err(err) = decision.clone().into_result() {
                        warn!(
                            error = %err,
                            retryable = err.kind().is_retryable(),
                            "Admission denied"
                        );
                    }
                    let mut response = denial_response(&decision);
                    self.annotate(&mut response, &identity);
                    return response;
                }
            },
            None => None,
        };

        let outcome = AssertUnwindSafe(self.handler.handle(request))
            .catch_unwind()
            .await;

        let succeeded = matches!(&outcome, Ok(Ok(response)) if response.status().is_success());
        if let Some(reservation) = reservation {
            if succeeded {
                reservation.commit();
            } else {
                reservation.release();
            }
        }

        let mut response = match outcome {
            Ok(Ok(response)) => {
                if !succeeded {
                    debug!(status = %response.status(), "Handler declined, budget not charged");
                }
                response
            }
            Ok(Err(e)) => {
                error!(error = %e, "Handler failed");
                handler_error_response(&e)
            }
            Err(panic) => {
                let detail = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                let err = GatewayError::new(GatewayErrorKind::HandlerPanicked(detail));
                error!(error = %err, "Handler panicked");
                internal_error_response()
            }
        };

        self.annotate(&mut response, &identity);
        response
    }

    fn annotate(&self, response: &mut GatewayResponse, identity: &str) {
        let config = &self.admission.config;
        let store = &self.admission.store;
        if *config.enable_rate_limiting() {
            annotate_rate_limit(response.headers_mut(), &store.limiter().status(identity));
        }
        if *config.enable_budget_guardrails() {
            annotate_budget(response.headers_mut(), &store.quota().status(identity));
        }
    }
}

#[async_trait]
impl<H: Handler> Handler for GuardedHandler<H> {
    async fn handle(&self, request: GatewayRequest) -> VoxgateResult<GatewayResponse> {
        Ok(self.process(request).await)
    }
}
