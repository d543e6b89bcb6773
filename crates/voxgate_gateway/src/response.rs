//! Response construction and annotation.

use crate::GatewayResponse;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{CONTENT_TYPE, RETRY_AFTER};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;
use tracing::error;
use voxgate_core::GuardrailDecision;
use voxgate_error::{GuardrailError, SynthesisErrorKind, VoxgateError, VoxgateErrorKind};
use voxgate_quota::QuotaStatus;
use voxgate_rate_limit::LimiterStatus;

/// Per-identity burst capacity.
pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Requests the caller could make right now.
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Seconds until the caller's bucket is full.
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");
/// Characters left in the daily window.
pub const X_BUDGET_REMAINING_DAILY: HeaderName =
    HeaderName::from_static("x-budget-remaining-daily");
/// Characters left in the monthly window.
pub const X_BUDGET_REMAINING_MONTHLY: HeaderName =
    HeaderName::from_static("x-budget-remaining-monthly");
/// `HIT` or `MISS`.
pub const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Cache-Control for audio served from the cache.
pub const CACHE_CONTROL_HIT: &str = "public, max-age=31536000, immutable";
/// Cache-Control for freshly synthesised audio.
pub const CACHE_CONTROL_MISS: &str = "public, max-age=300";

/// JSON body of every refused or failed request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DenialBody {
    /// Machine-readable code
    pub error: String,
    /// Human-readable explanation
    pub message: String,
    /// Seconds to wait before retrying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Characters left in the daily window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_daily: Option<u64>,
    /// Characters left in the monthly window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_monthly: Option<u64>,
    /// When the exhausted window resets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
}

impl DenialBody {
    fn plain(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            retry_after: None,
            remaining_daily: None,
            remaining_monthly: None,
            resets_at: None,
        }
    }

    pub(crate) fn from_decision(decision: &GuardrailDecision) -> Self {
        Self {
            error: decision
                .reason
                .map(|r| r.code().to_string())
                .unwrap_or_else(|| "denied".to_string()),
            message: decision.message().unwrap_or_else(|| "Request denied".to_string()),
            retry_after: decision.retry_after,
            remaining_daily: decision.remaining_daily,
            remaining_monthly: decision.remaining_monthly,
            resets_at: decision.resets_at,
        }
    }
}

/// Serialise `body` as a JSON response with `status`.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> GatewayResponse {
    let bytes = serde_json::to_vec(body)
        .map(Bytes::from)
        .unwrap_or_else(|e| {
            error!(error = %e, "Failed to serialise response body");
            Bytes::from_static(br#"{"error":"internal_error","message":"Internal server error"}"#)
        });
    let mut response = http::Response::new(bytes);
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// JSON error response with a code and message.
pub fn error_response(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
) -> GatewayResponse {
    json_response(status, &DenialBody::plain(code, message))
}

/// 429 response for a refused admission decision.
pub(crate) fn denial_response(decision: &GuardrailDecision) -> GatewayResponse {
    let mut response = json_response(
        StatusCode::TOO_MANY_REQUESTS,
        &DenialBody::from_decision(decision),
    );
    if let Some(retry_after) = decision.retry_after {
        response
            .headers_mut()
            .insert(RETRY_AFTER, HeaderValue::from(retry_after));
    }
    response
}

pub(crate) fn identity_required_response(err: &GuardrailError) -> GatewayResponse {
    error_response(StatusCode::UNAUTHORIZED, "identity_required", err.kind().to_string())
}

/// Map a handler error to a response that reveals nothing internal.
pub(crate) fn handler_error_response(err: &VoxgateError) -> GatewayResponse {
    match err.kind() {
        VoxgateErrorKind::Synthesis(e) => match e.kind() {
            SynthesisErrorKind::InvalidRequest(msg)
            | SynthesisErrorKind::UnsupportedFormat(msg) => {
                error_response(StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            _ => error_response(
                StatusCode::BAD_GATEWAY,
                "upstream_error",
                "Speech synthesis failed",
            ),
        },
        VoxgateErrorKind::Json(e) => {
            error_response(StatusCode::BAD_REQUEST, "invalid_request", e.message.clone())
        }
        _ => internal_error_response(),
    }
}

pub(crate) fn internal_error_response() -> GatewayResponse {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        "Internal server error",
    )
}

pub(crate) fn annotate_rate_limit(headers: &mut HeaderMap, status: &LimiterStatus) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(*status.limit()));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(*status.remaining()));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(*status.reset_after_secs()));
}

pub(crate) fn annotate_budget(headers: &mut HeaderMap, status: &QuotaStatus) {
    headers.insert(X_BUDGET_REMAINING_DAILY, HeaderValue::from(*status.daily_remaining()));
    headers.insert(
        X_BUDGET_REMAINING_MONTHLY,
        HeaderValue::from(*status.monthly_remaining()),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxgate_core::DenialReason;
    use voxgate_error::{JsonError, SynthesisError};

    fn body_json(response: &GatewayResponse) -> serde_json::Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[test]
    fn test_rate_limit_denial_has_retry_after() {
        let response = denial_response(&GuardrailDecision::rate_limited(6));

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "6");
        let body = body_json(&response);
        assert_eq!(body["error"], "rate_limit_exceeded");
        assert_eq!(body["retry_after"], 6);
        assert!(body.get("remaining_daily").is_none());
    }

    #[test]
    fn test_budget_denial_carries_remaining() {
        let decision = GuardrailDecision::budget_denied(DenialReason::DailyCap, None)
            .with_remaining(200, 9_200);
        let body = body_json(&denial_response(&decision));

        assert_eq!(body["error"], "budget_exceeded_daily");
        assert_eq!(body["remaining_daily"], 200);
        assert_eq!(body["remaining_monthly"], 9_200);
    }

    #[test]
    fn test_upstream_error_is_opaque() {
        let err: VoxgateError = SynthesisError::new(SynthesisErrorKind::Upstream(
            "401 from provider with key sk-secret".into(),
        ))
        .into();
        let response = handler_error_response(&err);

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let text = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(!text.contains("sk-secret"));
        assert!(text.contains("upstream_error"));
    }

    #[test]
    fn test_json_error_is_400_without_location() {
        let err: VoxgateError = JsonError::new("missing field `text`").into();
        let response = handler_error_response(&err);

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(&response);
        assert_eq!(body["error"], "invalid_request");
        assert_eq!(body["message"], "missing field `text`");
    }

    #[test]
    fn test_identity_required_uses_guardrail_message() {
        let err = GuardrailError::new(voxgate_error::GuardrailErrorKind::IdentityRequired);
        let response = identity_required_response(&err);

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(&response);
        assert_eq!(body["error"], "identity_required");
        assert_eq!(body["message"], "Caller identity is required");
    }

    #[test]
    fn test_invalid_request_is_400() {
        let err: VoxgateError =
            SynthesisError::new(SynthesisErrorKind::UnsupportedFormat("flac".into())).into();
        assert_eq!(handler_error_response(&err).status(), StatusCode::BAD_REQUEST);
    }
}
