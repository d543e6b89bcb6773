//! Core types shared by every voxgate guardrail.
//!
//! - [`Clock`] is the single time source read by the limiter, the quota
//!   tracker and the result cache, so tests can drive time by hand.
//! - [`GuardrailDecision`] is the value every admission check returns.
//! - [`telemetry`] installs the tracing subscriber.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod decision;
pub mod telemetry;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, elapsed_secs, to_chrono};
pub use decision::{DenialReason, GuardrailDecision};
pub use telemetry::{TelemetryConfig, init_telemetry};
