//! Admission guardrail error types.
//!
//! Denials are normally returned as values (`GuardrailDecision`). These types
//! exist for callers that want to propagate a denial with `?`.

/// Specific guardrail denial conditions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum GuardrailErrorKind {
    /// Request rate exceeded for an identity or globally
    #[display("Rate limit exceeded, retry after {} seconds", retry_after_secs)]
    RateLimitExceeded {
        /// Seconds until a token becomes available
        retry_after_secs: u64,
    },

    /// Single request carries more characters than allowed
    #[display(
        "Request of {} characters exceeds maximum characters per request ({})",
        requested,
        limit
    )]
    BudgetExceededPerRequest {
        /// Characters in the request
        requested: u64,
        /// Per-request character cap
        limit: u64,
    },

    /// Daily character budget exhausted
    #[display("Daily character limit exceeded ({} remaining)", remaining)]
    BudgetExceededDaily {
        /// Characters still available in the daily window
        remaining: u64,
        /// Unix timestamp (seconds) when the daily window resets
        resets_at: i64,
    },

    /// Monthly character budget exhausted
    #[display("Monthly character limit exceeded ({} remaining)", remaining)]
    BudgetExceededMonthly {
        /// Characters still available in the monthly window
        remaining: u64,
        /// Unix timestamp (seconds) when the monthly window resets
        resets_at: i64,
    },

    /// Caller identity could not be resolved and identity is required
    #[display("Caller identity is required")]
    IdentityRequired,
}

impl GuardrailErrorKind {
    /// Whether the caller may retry after waiting.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            GuardrailErrorKind::BudgetExceededPerRequest { .. }
                | GuardrailErrorKind::IdentityRequired
        )
    }
}

/// Guardrail error with location tracking.
///
/// # Examples
///
/// ```
/// use voxgate_error::{GuardrailError, GuardrailErrorKind};
///
/// let err = GuardrailError::new(GuardrailErrorKind::RateLimitExceeded { retry_after_secs: 6 });
/// assert!(format!("{}", err).contains("retry after 6"));
/// ```
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Guardrail Error: {} at line {} in {}", kind, line, file)]
pub struct GuardrailError {
    /// The specific error kind
    pub kind: GuardrailErrorKind,
    /// Line number where error occurred
    pub line: u32,
    /// File where error occurred
    pub file: &'static str,
}

impl GuardrailError {
    /// Create a new guardrail error with location tracking.
    #[track_caller]
    pub fn new(kind: GuardrailErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &GuardrailErrorKind {
        &self.kind
    }
}
