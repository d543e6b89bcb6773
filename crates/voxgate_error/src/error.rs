//! Top-level error wrapper types.

use crate::{ConfigError, GatewayError, GuardrailError, JsonError, SynthesisError};

/// Aggregate of every error family in the workspace.
///
/// # Examples
///
/// ```
/// use voxgate_error::{VoxgateError, SynthesisError, SynthesisErrorKind};
///
/// let err: VoxgateError = SynthesisError::new(SynthesisErrorKind::Http("refused".into())).into();
/// assert!(format!("{}", err).contains("Synthesis Error"));
/// ```
#[derive(Debug, derive_more::From, derive_more::Display, derive_more::Error)]
pub enum VoxgateErrorKind {
    /// Configuration error
    #[from(ConfigError)]
    Config(ConfigError),
    /// JSON serialization/deserialization error
    #[from(JsonError)]
    Json(JsonError),
    /// Admission denial propagated as an error
    #[from(GuardrailError)]
    Guardrail(GuardrailError),
    /// Speech provider error
    #[from(SynthesisError)]
    Synthesis(SynthesisError),
    /// Gateway boundary error
    #[from(GatewayError)]
    Gateway(GatewayError),
}

/// Voxgate error with kind discrimination.
///
/// # Examples
///
/// ```
/// use voxgate_error::{VoxgateResult, ConfigError};
///
/// fn might_fail() -> VoxgateResult<()> {
///     Err(ConfigError::new("Missing field"))?
/// }
///
/// assert!(might_fail().is_err());
/// ```
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("Voxgate Error: {}", _0)]
pub struct VoxgateError(Box<VoxgateErrorKind>);

impl VoxgateError {
    /// Create a new error from a kind.
    pub fn new(kind: VoxgateErrorKind) -> Self {
        Self(Box::new(kind))
    }

    /// Get the error kind.
    pub fn kind(&self) -> &VoxgateErrorKind {
        &self.0
    }
}

// Generic From implementation for any type that converts to VoxgateErrorKind
impl<T> From<T> for VoxgateError
where
    T: Into<VoxgateErrorKind>,
{
    fn from(err: T) -> Self {
        Self::new(err.into())
    }
}

/// Result type for voxgate operations.
pub type VoxgateResult<T> = std::result::Result<T, VoxgateError>;
