//! Speech synthesis for voxgate.
//!
//! The [`Synthesizer`] trait is the outbound seam to a text-to-speech
//! provider. [`ToneSynthesizer`] renders text offline as a sequence of sine
//! tones; [`HttpSynthesizer`] calls an OpenAI-compatible speech endpoint.
//! [`SynthesisHandler`] serves synthesis requests through the result cache
//! so identical requests reach the provider at most once.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod format;
mod handler;
mod http_provider;
mod request;
mod synthesizer;
mod tone;

pub use format::AudioFormat;
pub use handler::SynthesisHandler;
pub use http_provider::{HttpProviderConfig, HttpSynthesizer};
pub use request::SynthesisRequest;
pub use synthesizer::{SynthesizedAudio, Synthesizer};
pub use tone::{ToneConfig, ToneSynthesizer, char_frequency};
