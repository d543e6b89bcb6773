//! Error types for the voxgate workspace.
//!
//! This crate provides the foundation error types used throughout voxgate.
//!
//! # Error Hierarchy
//!
//! All errors follow the `ErrorKind` + wrapper struct pattern:
//! - `*ErrorKind` enum defines specific error conditions
//! - `*Error` struct wraps the kind with source location tracking
//! - All errors use `#[track_caller]` for automatic location capture
//!
//! # Examples
//!
//! ```
//! use voxgate_error::{VoxgateResult, ConfigError};
//!
//! fn load() -> VoxgateResult<String> {
//!     Err(ConfigError::new("burst_capacity must be positive"))?
//! }
//!
//! match load() {
//!     Ok(data) => println!("Got: {}", data),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod gateway;
mod guardrail;
mod json;
mod synthesis;

pub use config::ConfigError;
pub use error::{VoxgateError, VoxgateErrorKind, VoxgateResult};
pub use gateway::{GatewayError, GatewayErrorKind};
pub use guardrail::{GuardrailError, GuardrailErrorKind};
pub use json::JsonError;
pub use synthesis::{SynthesisError, SynthesisErrorKind};
