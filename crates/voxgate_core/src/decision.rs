//! Admission decisions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use voxgate_error::{GuardrailError, GuardrailErrorKind};

/// Why an admission check refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// Per-identity or global request rate exhausted
    #[display("Rate limit exceeded")]
    RateLimited,
    /// Request text is longer than the per-request cap
    #[display(
        "Request of {} characters exceeds maximum characters per request ({})",
        requested,
        limit
    )]
    PerRequestCap {
        /// Characters in the request
        requested: u64,
        /// Per-request character cap
        limit: u64,
    },
    /// Daily character budget exhausted
    #[display("Daily character limit exceeded")]
    DailyCap,
    /// Monthly character budget exhausted
    #[display("Monthly character limit exceeded")]
    MonthlyCap,
}

impl DenialReason {
    /// Stable machine-readable code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            DenialReason::RateLimited => "rate_limit_exceeded",
            DenialReason::PerRequestCap { .. } => "budget_exceeded_per_request",
            DenialReason::DailyCap => "budget_exceeded_daily",
            DenialReason::MonthlyCap => "budget_exceeded_monthly",
        }
    }
}

/// Result of an admission check.
///
/// Computed fresh for every request and never stored. A denial is an ordinary
/// value, not an error; use [`GuardrailDecision::into_result`] to propagate it
/// with `?`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardrailDecision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Why the request was refused
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
    /// Seconds to wait before retrying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Characters left in the daily window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_daily: Option<u64>,
    /// Characters left in the monthly window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_monthly: Option<u64>,
    /// When the window responsible for a budget denial resets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resets_at: Option<DateTime<Utc>>,
}

impl GuardrailDecision {
    /// An admitting decision with no metadata.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            retry_after: None,
            remaining_daily: None,
            remaining_monthly: None,
            resets_at: None,
        }
    }

    /// A rate-limit denial.
    pub fn rate_limited(retry_after: u64) -> Self {
        Self {
            allowed: false,
            reason: Some(DenialReason::RateLimited),
            retry_after: Some(retry_after),
            ..Self::allow()
        }
    }

    /// A budget denial.
    pub fn budget_denied(reason: DenialReason, resets_at: Option<DateTime<Utc>>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            resets_at,
            ..Self::allow()
        }
    }

    /// Attach remaining-quota figures.
    pub fn with_remaining(mut self, daily: u64, monthly: u64) -> Self {
        self.remaining_daily = Some(daily);
        self.remaining_monthly = Some(monthly);
        self
    }

    /// Human-readable reason, if denied.
    pub fn message(&self) -> Option<String> {
        self.reason.map(|r| r.to_string())
    }

    /// Convert a denial into a [`GuardrailError`].
    ///
    /// # Errors
    ///
    /// Returns an error carrying the denial metadata when `allowed` is false.
    #[track_caller]
    pub fn into_result(self) -> Result<(), GuardrailError> {
        let Some(reason) = self.reason.filter(|_| !self.allowed) else {
            return Ok(());
        };
        let resets_at = self.resets_at.map(|t| t.timestamp()).unwrap_or_default();
        let kind = match reason {
            DenialReason::RateLimited => GuardrailErrorKind::RateLimitExceeded {
                retry_after_secs: self.retry_after.unwrap_or_default(),
            },
            DenialReason::PerRequestCap { requested, limit } => {
                GuardrailErrorKind::BudgetExceededPerRequest { requested, limit }
            }
            DenialReason::DailyCap => GuardrailErrorKind::BudgetExceededDaily {
                remaining: self.remaining_daily.unwrap_or_default(),
                resets_at,
            },
            DenialReason::MonthlyCap => GuardrailErrorKind::BudgetExceededMonthly {
                remaining: self.remaining_monthly.unwrap_or_default(),
                resets_at,
            },
        };
        Err(GuardrailError::new(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_converts_to_ok() {
        assert!(GuardrailDecision::allow().into_result().is_ok());
    }

    #[test]
    fn test_daily_denial_keeps_remaining() {
        let decision = GuardrailDecision::budget_denied(DenialReason::DailyCap, None)
            .with_remaining(200, 9_000);

        let err = decision.into_result().unwrap_err();
        assert_eq!(
            err.kind(),
            &GuardrailErrorKind::BudgetExceededDaily {
                remaining: 200,
                resets_at: 0
            }
        );
    }

    #[test]
    fn test_per_request_message() {
        let reason = DenialReason::PerRequestCap {
            requested: 6000,
            limit: 5000,
        };
        assert!(reason.to_string().contains("exceeds maximum characters per request"));
        assert_eq!(reason.code(), "budget_exceeded_per_request");
    }
}
