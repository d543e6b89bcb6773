//! Layered configuration.
//!
//! Sources, in increasing precedence:
//! - Bundled defaults (include_str! from voxgate.toml)
//! - `~/.config/voxgate/voxgate.toml`
//! - `./voxgate.toml`, or the file named with `--config`
//! - The `test`/`ci` profile overlay (voxgate.ci.toml)
//! - `VOXGATE__SECTION__KEY` environment variables

use config::{Config, Environment, File, FileFormat};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument};
use voxgate_cache::CacheConfig;
use voxgate_core::TelemetryConfig;
use voxgate_error::{ConfigError, VoxgateResult};
use voxgate_gateway::GatewayConfig;
use voxgate_quota::QuotaConfig;
use voxgate_rate_limit::RateLimitConfig;
use voxgate_synthesis::ToneConfig;

const DEFAULT_CONFIG: &str = include_str!("../../../voxgate.toml");
const CI_OVERLAY: &str = include_str!("../../../voxgate.ci.toml");

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
pub struct ServerConfig {
    /// Socket address to listen on
    #[serde(default = "default_bind_address")]
    bind_address: String,
    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    max_body_bytes: usize,
}

fn default_bind_address() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// Override the listen address.
    pub fn set_bind_address(&mut self, bind_address: impl Into<String>) {
        self.bind_address = bind_address.into();
    }
}

/// Per-identity and global token buckets.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Getters)]
pub struct RateLimitSection {
    /// Bucket for each caller
    #[serde(default)]
    identity: RateLimitConfig,
    /// Bucket shared by all callers
    #[serde(default = "RateLimitConfig::global_default")]
    global: RateLimitConfig,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            identity: RateLimitConfig::default(),
            global: RateLimitConfig::global_default(),
        }
    }
}

/// Which speech provider backs the synthesis endpoint.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ProviderKind {
    /// Offline sine-tone renderer
    #[default]
    Tone,
    /// OpenAI-compatible HTTP endpoint
    Http,
}

/// Speech provider settings.
#[derive(Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct ProviderConfig {
    /// Provider implementation
    #[serde(default)]
    kind: ProviderKind,
    /// Root URL of the HTTP provider
    #[serde(default)]
    base_url: Option<String>,
    /// Bearer token for the HTTP provider
    #[serde(default)]
    api_key: Option<String>,
    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    /// Tone renderer settings
    #[serde(default)]
    tone: ToneConfig,
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            base_url: None,
            api_key: None,
            timeout_secs: default_timeout_secs(),
            tone: ToneConfig::default(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("tone", &self.tone)
            .finish()
    }
}

impl ProviderConfig {
    /// HTTP provider at `base_url`.
    pub fn http(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            kind: ProviderKind::Http,
            base_url: Some(base_url.into()),
            api_key,
            ..Self::default()
        }
    }
}

/// Complete voxgate configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Getters)]
pub struct VoxgateConfig {
    /// Listener
    #[serde(default)]
    server: ServerConfig,
    /// Token buckets
    #[serde(default)]
    rate_limit: RateLimitSection,
    /// Character budgets
    #[serde(default)]
    quota: QuotaConfig,
    /// Result cache
    #[serde(default)]
    cache: CacheConfig,
    /// Guardrail switches and billable fields
    #[serde(default)]
    gateway: GatewayConfig,
    /// Speech provider
    #[serde(default)]
    provider: ProviderConfig,
    /// Logging
    #[serde(default)]
    telemetry: TelemetryConfig,
}

impl VoxgateConfig {
    /// Load the layered configuration.
    ///
    /// `profile` of `test` or `ci` applies the relaxed-limits overlay.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or the result is invalid.
    pub fn load(profile: Option<&str>) -> VoxgateResult<Self> {
        Self::load_with(profile, None)
    }

    /// Load the layered configuration, using `file` in place of the
    /// home-directory and working-directory files.
    #[instrument]
    pub fn load_with(profile: Option<&str>, file: Option<&Path>) -> VoxgateResult<Self> {
        debug!(
            "Loading configuration with precedence: \
             env > profile > local file > home dir > bundled defaults"
        );

        let mut builder =
            Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));

        match file {
            Some(path) => {
                builder = builder.add_source(File::from(path.to_path_buf()).required(true));
            }
            None => {
                if let Some(home) = dirs::home_dir() {
                    let home_config = home.join(".config/voxgate/voxgate.toml");
                    builder = builder.add_source(File::from(home_config).required(false));
                }
                builder = builder.add_source(File::with_name("voxgate").required(false));
            }
        }

        match profile {
            Some("test") | Some("ci") => {
                info!(profile, "Applying relaxed-limits profile");
                builder = builder.add_source(File::from_str(CI_OVERLAY, FileFormat::Toml));
            }
            Some(other) if other != "default" => {
                return Err(ConfigError::new(format!("Unknown profile: {}", other)).into());
            }
            _ => {}
        }

        builder = builder.add_source(
            Environment::with_prefix("VOXGATE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder
            .build()
            .map_err(|e| ConfigError::new(format!("Failed to build configuration: {}", e)))?
            .try_deserialize()
            .map_err(|e| ConfigError::new(format!("Failed to parse configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load a single TOML file; absent fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> VoxgateResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::new(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&text).map_err(|e| {
            ConfigError::new(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rate_limit.identity.validate()?;
        self.rate_limit.global.validate()?;
        self.quota.validate()?;
        self.cache.validate()?;

        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::new("server max_body_bytes must be at least 1"));
        }
        if self.provider.kind == ProviderKind::Http
            && self.provider.base_url.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::new("provider base_url is required for kind = \"http\""));
        }
        if *self.provider.tone.sample_rate() == 0 {
            return Err(ConfigError::new("tone sample_rate must be at least 1"));
        }
        Ok(())
    }

    /// Mutable listener settings, for command-line overrides.
    pub fn server_mut(&mut self) -> &mut ServerConfig {
        &mut self.server
    }

    /// Replace the provider settings.
    pub fn with_provider(mut self, provider: ProviderConfig) -> Self {
        self.provider = provider;
        self
    }

    /// Replace the gateway settings.
    pub fn with_gateway(mut self, gateway: GatewayConfig) -> Self {
        self.gateway = gateway;
        self
    }

    /// Replace the rate limits.
    pub fn with_rate_limit(mut self, rate_limit: RateLimitSection) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    /// Replace the character budgets.
    pub fn with_quota(mut self, quota: QuotaConfig) -> Self {
        self.quota = quota;
        self
    }

    /// Effective configuration as TOML with secrets masked.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn to_redacted_toml(&self) -> Result<String, ConfigError> {
        let mut shown = self.clone();
        if shown.provider.api_key.is_some() {
            shown.provider.api_key = Some("<redacted>".to_string());
        }
        toml::to_string_pretty(&shown)
            .map_err(|e| ConfigError::new(format!("Failed to render configuration: {}", e)))
    }
}

impl RateLimitSection {
    /// Section with explicit buckets.
    pub fn new(identity: RateLimitConfig, global: RateLimitConfig) -> Self {
        Self { identity, global }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_defaults_parse() {
        let config: VoxgateConfig = toml::from_str(DEFAULT_CONFIG).unwrap();
        config.validate().unwrap();
        assert_eq!(config.rate_limit().identity().burst_capacity, 10);
        assert_eq!(*config.quota().max_chars_per_day(), 50_000);
        assert_eq!(*config.provider().kind(), ProviderKind::Tone);
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: VoxgateConfig = toml::from_str("").unwrap();
        assert_eq!(config, VoxgateConfig::default());
    }

    #[test]
    fn test_http_provider_needs_base_url() {
        let mut config = VoxgateConfig::default();
        config.provider.kind = ProviderKind::Http;
        assert!(config.validate().is_err());

        let config = config.with_provider(ProviderConfig::http("http://tts.local", None));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redacted_toml_hides_key() {
        let config = VoxgateConfig::default()
            .with_provider(ProviderConfig::http("http://tts.local", Some("sk-live".into())));
        let rendered = config.to_redacted_toml().unwrap();
        assert!(!rendered.contains("sk-live"));
        assert!(rendered.contains("<redacted>"));
    }
}
