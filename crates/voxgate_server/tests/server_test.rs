//! End-to-end tests for the HTTP surface.

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use std::io::Write;
use std::sync::Arc;
use tower::ServiceExt;
use voxgate_core::ManualClock;
use voxgate_rate_limit::RateLimitConfig;
use voxgate_server::{ProviderConfig, RateLimitSection, VoxgateConfig, build_state, router};

fn app(config: &VoxgateConfig) -> Router {
    let clock = ManualClock::starting_now();
    router(build_state(config, Arc::new(clock)).unwrap())
}

fn synthesize(user: &str, body: Value) -> Request<Body> {
    Request::post("/api/synthesize")
        .header("content-type", "application/json")
        .header("x-user-id", user)
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let app = app(&VoxgateConfig::default());
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_tone_synthesis_then_cache_hit() {
    let app = app(&VoxgateConfig::default());

    let first = app
        .clone()
        .oneshot(synthesize("alice", json!({"text": "hello world"})))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-cache"], "MISS");
    assert_eq!(first.headers()["content-type"], "audio/wav");
    assert_eq!(first.headers()["x-budget-remaining-daily"], "49989");
    let audio = to_bytes(first.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&audio[..4], b"RIFF");

    let second = app
        .oneshot(synthesize("bob", json!({"text": "hello world"})))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["x-cache"], "HIT");
    assert_eq!(
        second.headers()["cache-control"],
        "public, max-age=31536000, immutable"
    );
}

#[tokio::test]
async fn test_burst_exhaustion_returns_429() {
    let config = VoxgateConfig::default().with_rate_limit(RateLimitSection::new(
        RateLimitConfig::new(2, 0.0),
        RateLimitConfig::global_default(),
    ));
    let app = app(&config);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(synthesize("carol", json!({"text": "hi"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let denied = app
        .clone()
        .oneshot(synthesize("carol", json!({"text": "hi"})))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(denied.headers().contains_key("retry-after"));
    assert_eq!(json_body(denied).await["error"], "rate_limit_exceeded");

    let other = app
        .oneshot(synthesize("dave", json!({"text": "hi"})))
        .await
        .unwrap();
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unsupported_format_is_a_client_error() {
    let app = app(&VoxgateConfig::default());
    let response = app
        .oneshot(synthesize("erin", json!({"text": "hi", "format": "mp3"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_request");
}

#[tokio::test]
async fn test_status_reports_usage_without_consuming() {
    let app = app(&VoxgateConfig::default());
    app.clone()
        .oneshot(synthesize("frank", json!({"text": "twelve chars"})))
        .await
        .unwrap();

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(
                Request::get("/status")
                    .header("x-user-id", "frank")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["identity"], "user:frank");
        assert_eq!(body["budget"]["daily_used"], 12);
        assert_eq!(body["rate_limit"]["remaining"], 9);
        assert_eq!(body["cache"]["entries"], 1);
    }

    let response = app
        .oneshot(
            Request::get("/status?identity=user:frank")
                .header("x-user-id", "frank")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["identity"], "user:frank");
    assert_eq!(body["budget"]["daily_used"], 12);
}

#[tokio::test]
async fn test_status_ignores_query_for_another_identity() {
    let app = app(&VoxgateConfig::default());
    app.clone()
        .oneshot(synthesize("frank", json!({"text": "twelve chars"})))
        .await
        .unwrap();

    let anonymous = app
        .clone()
        .oneshot(
            Request::get("/status?identity=user:frank")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(anonymous).await;
    assert_eq!(body["identity"], "anonymous");
    assert_eq!(body["budget"]["daily_used"], 0);

    let other_user = app
        .oneshot(
            Request::get("/status?identity=user:frank")
                .header("x-user-id", "mallory")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = json_body(other_user).await;
    assert_eq!(body["identity"], "user:mallory");
    assert_eq!(body["budget"]["daily_used"], 0);
}

#[tokio::test]
async fn test_malformed_json_is_a_client_error() {
    let app = app(&VoxgateConfig::default());
    let request = Request::post("/api/synthesize")
        .header("content-type", "application/json")
        .header("x-user-id", "hank")
        .body(Body::from("{\"text\": "))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"], "invalid_request");
    assert!(
        body["message"]
            .as_str()
            .unwrap()
            .starts_with("Malformed synthesis request")
    );
}

#[tokio::test]
async fn test_oversized_body_is_rejected() {
    let app = app(&VoxgateConfig::default());
    let text = "a".repeat(70 * 1024);
    let response = app
        .oneshot(synthesize("gina", json!({ "text": text })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(response).await["error"], "payload_too_large");
}

#[test]
fn test_config_file_overrides_defaults() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(
        file,
        r#"
[quota]
max_chars_per_day = 1234

[rate_limit.identity]
burst_capacity = 3
"#
    )
    .unwrap();

    let config = VoxgateConfig::from_file(file.path()).unwrap();
    assert_eq!(*config.quota().max_chars_per_day(), 1234);
    assert_eq!(*config.quota().max_chars_per_month(), 1_000_000);
    assert_eq!(config.rate_limit().identity().burst_capacity, 3);

    let layered = VoxgateConfig::load_with(None, Some(file.path())).unwrap();
    assert_eq!(*layered.quota().max_chars_per_day(), 1234);
    assert_eq!(*layered.cache().max_entries(), 1000);
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    writeln!(file, "[rate_limit.identity]\nburst_capacity = 0").unwrap();

    assert!(VoxgateConfig::from_file(file.path()).is_err());
}

#[test]
fn test_ci_profile_relaxes_limits() {
    let config = VoxgateConfig::load(Some("ci")).unwrap();
    assert_eq!(config.rate_limit().identity().burst_capacity, 10_000);
    assert_eq!(*config.quota().max_chars_per_day(), 10_000_000);
}

#[test]
fn test_unknown_profile_is_an_error() {
    assert!(VoxgateConfig::load(Some("staging")).is_err());
}

#[test]
fn test_http_provider_requires_base_url() {
    let config = VoxgateConfig::default().with_provider(ProviderConfig::http("", None));
    assert!(build_state(&config, Arc::new(ManualClock::starting_now())).is_err());
}
