//! Character-volume budgets for speech synthesis.
//!
//! Each identity has a daily and a monthly window plus a stateless
//! per-request cap. Windows reset lazily: an expired window counts as empty
//! before any arithmetic touches it.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod tracker;
mod window;

pub use config::{QuotaConfig, QuotaConfigBuilder};
pub use tracker::{QuotaReservation, QuotaStatus, QuotaTracker};
pub use window::QuotaWindow;
