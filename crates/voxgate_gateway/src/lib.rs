//! Admission gateway for speech synthesis endpoints.
//!
//! [`AdmissionGateway::wrap`] turns any [`Handler`] into a [`GuardedHandler`]
//! that resolves the caller, applies the per-identity rate limit and the
//! character budget before the handler runs, holds the characters while it
//! runs, commits them only after a successful response and annotates every response with the
//! caller's remaining allowance.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod extract;
mod gateway;
mod handler;
mod identity;
mod response;
mod store;

pub use config::{GatewayConfig, GatewayConfigBuilder};
pub use extract::{
    CharCountExtractor, RouteExtractors, json_field_extractor, try_extract_char_count,
};
pub use gateway::{AdmissionGateway, GatewayStatus, GuardedHandler};
pub use handler::{GatewayRequest, GatewayResponse, Handler, HandlerFn, handler_fn};
pub use identity::{ANONYMOUS_IDENTITY, HeaderIdentityResolver, IdentityResolver};
pub use response::{
    CACHE_CONTROL_HIT, CACHE_CONTROL_MISS, DenialBody, X_BUDGET_REMAINING_DAILY,
    X_BUDGET_REMAINING_MONTHLY, X_CACHE, X_RATELIMIT_LIMIT, X_RATELIMIT_REMAINING,
    X_RATELIMIT_RESET, error_response, json_response,
};
pub use store::GuardrailStore;
