//! Tests for the admission pipeline.

use async_trait::async_trait;
use bytes::Bytes;
use http::StatusCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use voxgate_cache::CacheConfig;
use voxgate_core::ManualClock;
use voxgate_error::{
    GatewayError, GatewayErrorKind, SynthesisError, SynthesisErrorKind, VoxgateResult,
};
use voxgate_gateway::{
    AdmissionGateway, GatewayConfig, GatewayRequest, GatewayResponse, GuardedHandler,
    GuardrailStore, Handler, X_BUDGET_REMAINING_DAILY, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING,
};
use voxgate_quota::QuotaConfig;
use voxgate_rate_limit::RateLimitConfig;

#[derive(Debug, Clone, Copy)]
enum Behaviour {
    Succeed,
    SlowSucceed,
    Decline,
    FailUpstream,
    FailInternal,
    Panic,
}

#[derive(Debug)]
struct CountingHandler {
    calls: AtomicUsize,
    behaviour: Behaviour,
}

impl CountingHandler {
    fn new(behaviour: Behaviour) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            behaviour,
        }
    }
}

#[async_trait]
impl Handler for CountingHandler {
    async fn handle(&self, _request: GatewayRequest) -> VoxgateResult<GatewayResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            Behaviour::Succeed => Ok(http::Response::new(Bytes::from_static(b"audio"))),
            Behaviour::SlowSucceed => {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(http::Response::new(Bytes::from_static(b"audio")))
            }
            Behaviour::Decline => {
                let mut response = http::Response::new(Bytes::new());
                *response.status_mut() = StatusCode::NOT_FOUND;
                Ok(response)
            }
            Behaviour::FailUpstream => Err(SynthesisError::new(SynthesisErrorKind::Upstream(
                "503".into(),
            ))
            .into()),
            Behaviour::FailInternal => Err(GatewayError::new(GatewayErrorKind::Internal(
                "database password is hunter2".into(),
            ))
            .into()),
            Behaviour::Panic => panic!("handler blew up"),
        }
    }
}

struct Harness {
    guarded: GuardedHandler<Arc<CountingHandler>>,
    handler: Arc<CountingHandler>,
    gateway: AdmissionGateway,
    clock: ManualClock,
}

fn harness(burst: u32, quota: QuotaConfig, config: GatewayConfig, behaviour: Behaviour) -> Harness {
    let clock = ManualClock::starting_now();
    let store = GuardrailStore::new(
        RateLimitConfig::new(burst, 1.0),
        RateLimitConfig::new(10_000, 100.0),
        quota,
        CacheConfig::default(),
        Arc::new(clock.clone()),
    );
    let gateway = AdmissionGateway::new(store, config);
    let handler = Arc::new(CountingHandler::new(behaviour));
    Harness {
        guarded: gateway.wrap(Arc::clone(&handler)),
        handler,
        gateway,
        clock,
    }
}

fn simple(behaviour: Behaviour) -> Harness {
    harness(100, QuotaConfig::default(), GatewayConfig::default(), behaviour)
}

fn synth_request(user: &str, text: &str) -> GatewayRequest {
    let body = serde_json::json!({"text": text, "voice": "alloy", "format": "wav"});
    http::Request::builder()
        .method("POST")
        .uri("/api/synthesize")
        .header("x-user-id", user)
        .body(Bytes::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

fn body_json(response: &GatewayResponse) -> serde_json::Value {
    serde_json::from_slice(response.body()).unwrap()
}

impl Harness {
    fn calls(&self) -> usize {
        self.handler.calls.load(Ordering::SeqCst)
    }
}

#[tokio::test]
async fn test_rate_limit_denial_never_reaches_handler() {
    let h = harness(10, QuotaConfig::default(), GatewayConfig::default(), Behaviour::Succeed);

    for _ in 0..10 {
        let response = h.guarded.process(synth_request("alice", "hi")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
    let denied = h.guarded.process(synth_request("alice", "hi")).await;

    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(h.calls(), 10);
    let retry: u64 = denied.headers()["retry-after"].to_str().unwrap().parse().unwrap();
    assert!(retry > 0);
    assert_eq!(body_json(&denied)["error"], "rate_limit_exceeded");
    assert_eq!(denied.headers()[X_RATELIMIT_REMAINING], "0");
}

#[tokio::test]
async fn test_oversized_request_never_reaches_handler() {
    let quota = QuotaConfig::builder().max_chars_per_request(10).build().unwrap();
    let h = harness(100, quota, GatewayConfig::default(), Behaviour::Succeed);

    let denied = h.guarded.process(synth_request("alice", "this is far too long")).await;

    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_json(&denied)["error"], "budget_exceeded_per_request");
    assert_eq!(h.calls(), 0);
}

#[tokio::test]
async fn test_daily_budget_scenario() {
    let quota = QuotaConfig::builder()
        .max_chars_per_request(500)
        .max_chars_per_day(1_000)
        .build()
        .unwrap();
    let h = harness(100, quota, GatewayConfig::default(), Behaviour::Succeed);
    let text = "x".repeat(400);

    let first = h.guarded.process(synth_request("alice", &text)).await;
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()[X_BUDGET_REMAINING_DAILY], "600");

    let second = h.guarded.process(synth_request("alice", &text)).await;
    assert_eq!(second.status(), StatusCode::OK);

    let third = h.guarded.process(synth_request("alice", &text)).await;
    assert_eq!(third.status(), StatusCode::TOO_MANY_REQUESTS);
    let body = body_json(&third);
    assert_eq!(body["error"], "budget_exceeded_daily");
    assert_eq!(body["remaining_daily"], 200);
    assert!(body["resets_at"].is_string());
    assert_eq!(h.calls(), 2);

    h.clock.advance(Duration::from_secs(86_400));
    let after_reset = h.guarded.process(synth_request("alice", &text)).await;
    assert_eq!(after_reset.status(), StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_requests_cannot_overshoot_daily_cap() {
    let quota = QuotaConfig::builder()
        .max_chars_per_request(500)
        .max_chars_per_day(1_000)
        .build()
        .unwrap();
    let h = Arc::new(harness(100, quota, GatewayConfig::default(), Behaviour::SlowSucceed));
    let text = "x".repeat(400);

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let h = Arc::clone(&h);
            let text = text.clone();
            tokio::spawn(async move { h.guarded.process(synth_request("alice", &text)).await })
        })
        .collect();

    let mut admitted = 0;
    for task in tasks {
        let response = task.await.unwrap();
        if response.status() == StatusCode::OK {
            admitted += 1;
        } else {
            assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
            assert_eq!(body_json(&response)["error"], "budget_exceeded_daily");
        }
    }

    assert_eq!(admitted, 2);
    assert_eq!(h.calls(), 2);
    let budget = h.gateway.status("user:alice").budget().clone();
    assert_eq!(*budget.daily_used(), 800);
    assert_eq!(*budget.daily_reserved(), 0);
}

#[tokio::test]
async fn test_characters_counted_as_unicode_scalars() {
    let h = simple(Behaviour::Succeed);

    h.guarded.process(synth_request("alice", "ñandú")).await;

    assert_eq!(*h.gateway.status("user:alice").budget().daily_used(), 5);
}

#[tokio::test]
async fn test_failed_handler_costs_no_budget() {
    for behaviour in [Behaviour::Decline, Behaviour::FailUpstream, Behaviour::FailInternal] {
        let h = simple(behaviour);

        h.guarded.process(synth_request("alice", "hello")).await;

        assert_eq!(h.calls(), 1);
        assert_eq!(*h.gateway.status("user:alice").budget().daily_used(), 0);
    }
}

#[tokio::test]
async fn test_upstream_failure_maps_to_bad_gateway() {
    let h = simple(Behaviour::FailUpstream);

    let response = h.guarded.process(synth_request("alice", "hello")).await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(body_json(&response)["error"], "upstream_error");
}

#[tokio::test]
async fn test_internal_error_does_not_leak_details() {
    let h = simple(Behaviour::FailInternal);

    let response = h.guarded.process(synth_request("alice", "hello")).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let text = String::from_utf8(response.body().to_vec()).unwrap();
    assert!(!text.contains("hunter2"));
    assert_eq!(body_json(&response)["error"], "internal_error");
}

#[tokio::test]
async fn test_handler_panic_becomes_internal_error() {
    let h = simple(Behaviour::Panic);

    let first = h.guarded.process(synth_request("alice", "hello")).await;
    let second = h.guarded.process(synth_request("alice", "hello")).await;

    assert_eq!(first.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(second.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.calls(), 2);
    let budget = h.gateway.status("user:alice").budget().clone();
    assert_eq!(*budget.daily_used(), 0);
    assert_eq!(*budget.daily_reserved(), 0);
}

#[tokio::test]
async fn test_unreadable_payload_skips_budget_check() {
    let quota = QuotaConfig::builder().max_chars_per_request(1).build().unwrap();
    let h = harness(100, quota, GatewayConfig::default(), Behaviour::Succeed);
    let request = http::Request::builder()
        .method("POST")
        .uri("/api/synthesize")
        .header("x-user-id", "alice")
        .body(Bytes::from_static(b"definitely not json"))
        .unwrap();

    let response = h.guarded.process(request).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(h.calls(), 1);
}

#[tokio::test]
async fn test_identity_required() {
    let config = GatewayConfig::builder().require_identity(true).build().unwrap();
    let h = harness(100, QuotaConfig::default(), config, Behaviour::Succeed);
    let anonymous = http::Request::builder()
        .method("POST")
        .uri("/api/synthesize")
        .body(Bytes::from_static(br#"{"text": "hi"}"#))
        .unwrap();

    let response = h.guarded.process(anonymous).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(&response)["error"], "identity_required");
    assert_eq!(h.calls(), 0);
}

#[tokio::test]
async fn test_anonymous_callers_share_a_bucket() {
    let h = harness(2, QuotaConfig::default(), GatewayConfig::default(), Behaviour::Succeed);
    let anonymous = || {
        http::Request::builder()
            .uri("/api/synthesize")
            .body(Bytes::from_static(br#"{"text": "hi"}"#))
            .unwrap()
    };

    assert_eq!(h.guarded.process(anonymous()).await.status(), StatusCode::OK);
    assert_eq!(h.guarded.process(anonymous()).await.status(), StatusCode::OK);
    assert_eq!(
        h.guarded.process(anonymous()).await.status(),
        StatusCode::TOO_MANY_REQUESTS
    );
}

#[tokio::test]
async fn test_disabled_guardrails_pass_everything() {
    let config = GatewayConfig::builder()
        .enable_rate_limiting(false)
        .enable_budget_guardrails(false)
        .build()
        .unwrap();
    let quota = QuotaConfig::builder().max_chars_per_request(1).build().unwrap();
    let h = harness(1, quota, config, Behaviour::Succeed);

    for _ in 0..5 {
        let response = h.guarded.process(synth_request("alice", "longer text")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(X_RATELIMIT_LIMIT).is_none());
    }
    assert_eq!(h.calls(), 5);
}

#[tokio::test]
async fn test_success_is_annotated() {
    let h = harness(10, QuotaConfig::default(), GatewayConfig::default(), Behaviour::Succeed);

    let response = h.guarded.process(synth_request("alice", "hello")).await;

    assert_eq!(response.headers()[X_RATELIMIT_LIMIT], "10");
    assert_eq!(response.headers()[X_RATELIMIT_REMAINING], "9");
    assert_eq!(response.headers()[X_BUDGET_REMAINING_DAILY], "49995");
}

#[tokio::test]
async fn test_guarded_handler_is_a_handler() {
    let h = simple(Behaviour::Succeed);
    let outer: &dyn Handler = &h.guarded;

    let response = outer.handle(synth_request("alice", "hi")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_status_and_reset() {
    let h = simple(Behaviour::Succeed);
    h.guarded.process(synth_request("alice", "hello")).await;

    let before = h.gateway.status("user:alice");
    let again = h.gateway.status("user:alice");
    assert_eq!(before.rate_limit(), again.rate_limit());
    assert_eq!(*before.budget().daily_used(), 5);

    h.gateway.store().reset();
    assert_eq!(*h.gateway.status("user:alice").budget().daily_used(), 0);
}
