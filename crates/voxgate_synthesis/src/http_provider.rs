//! OpenAI-compatible HTTP speech provider.

use crate::{SynthesisRequest, SynthesizedAudio, Synthesizer};
use async_trait::async_trait;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::time::Duration;
use tracing::{debug, error, instrument};
use voxgate_error::{SynthesisError, SynthesisErrorKind};

/// Connection settings for an HTTP speech provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct HttpProviderConfig {
    /// Provider root, without the `/v1/audio/speech` path
    base_url: String,
    /// Bearer token
    #[serde(default)]
    api_key: Option<String>,
    /// Whole-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

impl std::fmt::Debug for HttpProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl HttpProviderConfig {
    /// Settings for the provider at `base_url`.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout_secs: u64) -> Self {
        Self {
            base_url: base_url.into(),
            api_key,
            timeout_secs,
        }
    }
}

/// Calls `POST {base_url}/v1/audio/speech`.
///
/// Non-success statuses become `Upstream` errors carrying only the status;
/// connection failures become `Http` errors. Nothing is retried.
#[derive(Debug, Clone)]
pub struct HttpSynthesizer {
    config: HttpProviderConfig,
    client: reqwest::Client,
}

impl HttpSynthesizer {
    /// Build a client for `config`.
    ///
    /// # Errors
    ///
    /// `Http` if the TLS backend cannot be initialised.
    #[instrument(skip(config), fields(base_url = %config.base_url))]
    pub fn new(config: HttpProviderConfig) -> Result<Self, SynthesisError> {
        debug!("Creating HTTP synthesizer");
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                SynthesisError::new(SynthesisErrorKind::Http(format!(
                    "Failed to build HTTP client: {}",
                    e
                )))
            })?;
        Ok(Self { config, client })
    }

    /// Provider settings.
    pub fn config(&self) -> &HttpProviderConfig {
        &self.config
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/audio/speech", self.config.base_url.trim_end_matches('/'))
    }

    /// Provider request body. Core fields take precedence over `params`.
    fn body(request: &SynthesisRequest) -> JsonValue {
        let mut body: Map<String, JsonValue> = request.params.clone();
        body.insert("model".into(), JsonValue::String(request.model.clone()));
        body.insert("input".into(), JsonValue::String(request.text.clone()));
        body.insert("voice".into(), JsonValue::String(request.voice.clone()));
        body.insert(
            "response_format".into(),
            JsonValue::String(request.format.to_string()),
        );
        JsonValue::Object(body)
    }
}

#[async_trait]
impl Synthesizer for HttpSynthesizer {
    fn name(&self) -> &str {
        "http"
    }

    #[instrument(skip(self, request), fields(model = %request.model, voice = %request.voice))]
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesizedAudio, SynthesisError> {
        let url = self.endpoint();
        debug!(url = %url, "Sending speech request");

        let mut req = self.client.post(&url).json(&Self::body(request));
        if let Some(api_key) = &self.config.api_key {
            req = req.bearer_auth(api_key);
        }

        let response = req.send().await.map_err(|e| {
            error!("Speech request failed: {}", e);
            SynthesisError::new(SynthesisErrorKind::Http(format!("Request failed: {}", e)))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            error!("Provider returned error: {}", status);
            return Err(SynthesisError::new(SynthesisErrorKind::Upstream(format!(
                "Provider returned: {}",
                status
            ))));
        }

        let audio = response.bytes().await.map_err(|e| {
            error!("Failed to read audio: {}", e);
            SynthesisError::new(SynthesisErrorKind::Http(format!(
                "Failed to read response body: {}",
                e
            )))
        })?;

        debug!(bytes = audio.len(), "Speech request successful");
        Ok(SynthesizedAudio::new(audio, None))
    }
}
