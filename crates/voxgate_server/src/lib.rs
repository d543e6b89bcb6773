//! HTTP surface of the voxgate speech admission gateway.
//!
//! Exposes `POST /api/synthesize` behind the admission gateway, plus
//! `GET /health` and a read-only `GET /status` snapshot. The [`offline`]
//! helpers back the `synthesize` subcommand, which renders tones to a file
//! without the gateway.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod app;
mod config;
pub mod offline;

pub use app::{AppState, build_state, build_synthesizer, router};
pub use offline::{TextSource, render_to_file, tone_with_overrides};
pub use config::{ProviderConfig, ProviderKind, RateLimitSection, ServerConfig, VoxgateConfig};
