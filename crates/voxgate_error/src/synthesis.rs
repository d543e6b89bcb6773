//! Speech synthesis error types.

/// Error kinds for calls to the speech synthesis provider.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::Display)]
pub enum SynthesisErrorKind {
    /// Provider answered with a failure status
    #[display("Upstream synthesis failed: {}", _0)]
    Upstream(String),

    /// Transport-level failure reaching the provider
    #[display("HTTP request failed: {}", _0)]
    Http(String),

    /// Request payload is not a valid synthesis request
    #[display("Invalid synthesis request: {}", _0)]
    InvalidRequest(String),

    /// Provider cannot produce the requested audio format
    #[display("Unsupported audio format: {}", _0)]
    UnsupportedFormat(String),

    /// Audio could not be encoded
    #[display("Audio encoding failed: {}", _0)]
    Encoding(String),

    /// Text input or audio output file could not be accessed
    #[display("File access failed: {}", _0)]
    FileIo(String),

    /// Synthesis task ended without producing a result
    #[display("Synthesis cancelled: {}", _0)]
    Cancelled(String),
}

/// Synthesis error with location tracking.
///
/// Cloneable so that a single in-flight synthesis result can be handed to
/// every caller waiting on it.
#[derive(Debug, Clone, derive_more::Display, derive_more::Error)]
#[display("Synthesis Error: {} at line {} in {}", kind, line, file)]
pub struct SynthesisError {
    /// The error kind
    pub kind: SynthesisErrorKind,
    /// Line number where error occurred
    pub line: u32,
    /// File where error occurred
    pub file: &'static str,
}

impl SynthesisError {
    /// Create a new SynthesisError with automatic location tracking.
    #[track_caller]
    pub fn new(kind: SynthesisErrorKind) -> Self {
        let location = std::panic::Location::caller();
        Self {
            kind,
            line: location.line(),
            file: location.file(),
        }
    }

    /// Get the error kind.
    pub fn kind(&self) -> &SynthesisErrorKind {
        &self.kind
    }
}
