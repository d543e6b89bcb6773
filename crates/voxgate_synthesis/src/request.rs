//! Inbound synthesis requests.

use crate::AudioFormat;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use voxgate_cache::CacheKey;
use voxgate_error::{JsonError, SynthesisError, SynthesisErrorKind, VoxgateResult};

/// Body of `POST /api/synthesize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    /// Text to speak; the billable field
    pub text: String,
    /// Provider voice
    #[serde(default = "default_voice")]
    pub voice: String,
    /// Output container
    #[serde(default)]
    pub format: AudioFormat,
    /// Provider model
    #[serde(default = "default_model")]
    pub model: String,
    /// Extra provider parameters, part of the cache identity
    #[serde(default)]
    pub params: Map<String, JsonValue>,
}

fn default_voice() -> String {
    "alloy".to_string()
}

fn default_model() -> String {
    "tts-1".to_string()
}

impl SynthesisRequest {
    /// Request for `text` with default voice, format and model.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: default_voice(),
            format: AudioFormat::default(),
            model: default_model(),
            params: Map::new(),
        }
    }

    /// Parse and validate a JSON body.
    ///
    /// # Errors
    ///
    /// A [`JsonError`] if the body does not decode, `InvalidRequest` if the
    /// text or voice is blank.
    pub fn from_json(body: &[u8]) -> VoxgateResult<Self> {
        let request: Self = serde_json::from_slice(body)
            .map_err(|e| JsonError::new(format!("Malformed synthesis request: {}", e)))?;
        request.validate()?;
        Ok(request)
    }

    /// Reject requests with nothing to say.
    pub fn validate(&self) -> Result<(), SynthesisError> {
        if self.text.trim().is_empty() {
            return Err(SynthesisError::new(SynthesisErrorKind::InvalidRequest(
                "text must not be empty".to_string(),
            )));
        }
        if self.voice.trim().is_empty() {
            return Err(SynthesisError::new(SynthesisErrorKind::InvalidRequest(
                "voice must not be empty".to_string(),
            )));
        }
        Ok(())
    }

    /// Billable characters (Unicode scalar values).
    pub fn char_count(&self) -> u64 {
        self.text.chars().count() as u64
    }

    /// Content address of the audio this request produces.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::compute(
            &self.text,
            &self.voice,
            &self.format.to_string(),
            &self.model,
            &JsonValue::Object(self.params.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxgate_error::VoxgateErrorKind;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let request = SynthesisRequest::from_json(br#"{"text": "valori zenith"}"#).unwrap();
        assert_eq!(request.voice, "alloy");
        assert_eq!(request.format, AudioFormat::Wav);
        assert_eq!(request.model, "tts-1");
        assert!(request.params.is_empty());
    }

    #[test]
    fn test_blank_text_rejected() {
        let err = SynthesisRequest::from_json(br#"{"text": "   "}"#).unwrap_err();
        match err.kind() {
            VoxgateErrorKind::Synthesis(e) => {
                assert!(matches!(e.kind(), SynthesisErrorKind::InvalidRequest(_)))
            }
            other => panic!("expected synthesis error, got {}", other),
        }
    }

    #[test]
    fn test_unknown_format_rejected() {
        let err = SynthesisRequest::from_json(br#"{"text": "a", "format": "midi"}"#).unwrap_err();
        assert!(matches!(err.kind(), VoxgateErrorKind::Json(_)));
    }

    #[test]
    fn test_malformed_body_is_a_json_error() {
        let err = SynthesisRequest::from_json(b"{not json").unwrap_err();
        match err.kind() {
            VoxgateErrorKind::Json(e) => {
                assert!(e.message.starts_with("Malformed synthesis request"))
            }
            other => panic!("expected JSON error, got {}", other),
        }
    }

    #[test]
    fn test_cache_key_ignores_param_order() {
        let a = br#"{"text": "a", "params": {"speed": 1.2, "pitch": 0}}"#;
        let b = br#"{"text": "a", "params": {"pitch": 0, "speed": 1.2}}"#;
        let a = SynthesisRequest::from_json(a).unwrap();
        let b = SynthesisRequest::from_json(b).unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn test_cache_key_is_case_sensitive() {
        assert_ne!(
            SynthesisRequest::new("Hello").cache_key(),
            SynthesisRequest::new("hello").cache_key()
        );
    }
}
