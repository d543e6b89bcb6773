//! Gateway configuration.

use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which guardrails the gateway applies and where billable text lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters, derive_builder::Builder)]
#[builder(default)]
pub struct GatewayConfig {
    /// Apply the token bucket limiter
    #[serde(default = "default_true")]
    enable_rate_limiting: bool,

    /// Apply the character budget
    #[serde(default = "default_true")]
    enable_budget_guardrails: bool,

    /// Refuse callers whose identity cannot be resolved
    #[serde(default)]
    require_identity: bool,

    /// Route path to the JSON field holding billable text
    #[serde(default = "default_billable_fields")]
    billable_fields: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_billable_fields() -> BTreeMap<String, String> {
    BTreeMap::from([("/api/synthesize".to_string(), "text".to_string())])
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enable_rate_limiting: true,
            enable_budget_guardrails: true,
            require_identity: false,
            billable_fields: default_billable_fields(),
        }
    }
}

impl GatewayConfig {
    /// Creates a new gateway config builder.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }
}
