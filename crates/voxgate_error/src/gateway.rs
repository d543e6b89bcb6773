//! Gateway boundary error types.

/// Error kinds raised at the admission gateway boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, derive_more::Display)]
pub enum GatewayErrorKind {
    /// Wrapped handler failed for a reason that must not reach the caller
    #[display("Internal error: {}", _0)]
    Internal(String),

    /// Wrapped handler panicked
    #[display("Handler panicked: {}", _0)]
    HandlerPanicked(String),
}

/// Gateway error with location tracking.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Gateway Error: {} at line {} in {}", kind, line, file)]
pub struct GatewayError {
    /// The error kind
    pub kind: GatewayErrorKind,
    /// Line number where error occurred
    pub line: u32,
    /// File where error occurred
    pub file: &'static str,
}

impl GatewayError {
    /// Create a new GatewayError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: GatewayErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &GatewayErrorKind {
        &self.kind
    }
}
