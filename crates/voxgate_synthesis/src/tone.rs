//! Offline sine-tone synthesis.

use crate::{AudioFormat, SynthesisRequest, SynthesizedAudio, Synthesizer};
use async_trait::async_trait;
use bytes::Bytes;
use derive_getters::Getters;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::io::Cursor;
use tracing::{debug, instrument};
use voxgate_error::{SynthesisError, SynthesisErrorKind};

/// Pitch for `character`, or `0.0` for silence.
///
/// Vowels and the liquids and nasals `l r n s` have fixed pitches. Other
/// letters climb from 300 Hz in 12.5 Hz steps through the alphabet, digits
/// climb from 250 Hz in 20 Hz steps, and everything else is silent.
pub fn char_frequency(character: char) -> f64 {
    let lower = character.to_lowercase().next().unwrap_or(character);
    match lower {
        'a' => 440.0,
        'e' => 493.88,
        'i' => 523.25,
        'o' => 587.33,
        'u' => 659.25,
        'l' => 392.0,
        'r' => 415.3,
        'n' => 349.23,
        's' => 329.63,
        c if c.is_alphabetic() => {
            let offset = (i64::from(u32::from(c)) - i64::from(u32::from('a'))).rem_euclid(26);
            300.0 + offset as f64 * 12.5
        }
        c => match c.to_digit(10) {
            Some(digit) => 250.0 + f64::from(digit) * 20.0,
            None => 0.0,
        },
    }
}

/// Tone synthesizer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Getters)]
pub struct ToneConfig {
    /// Samples per second
    #[serde(default = "default_sample_rate")]
    sample_rate: u32,
    /// Seconds of audio per character
    #[serde(default = "default_symbol_duration")]
    symbol_duration: f64,
    /// Peak sample value
    #[serde(default = "default_amplitude")]
    amplitude: i16,
}

fn default_sample_rate() -> u32 {
    22_050
}

fn default_symbol_duration() -> f64 {
    0.12
}

fn default_amplitude() -> i16 {
    16_000
}

impl Default for ToneConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            symbol_duration: default_symbol_duration(),
            amplitude: default_amplitude(),
        }
    }
}

impl ToneConfig {
    /// Settings with explicit values.
    pub fn new(sample_rate: u32, symbol_duration: f64, amplitude: i16) -> Self {
        Self {
            sample_rate,
            symbol_duration,
            amplitude,
        }
    }

    fn samples_per_symbol(&self) -> usize {
        (f64::from(self.sample_rate) * self.symbol_duration).max(0.0) as usize
    }
}

/// Renders each character as a short sine tone in a mono 16-bit WAV.
///
/// Deterministic, so identical text always yields identical bytes.
///
/// # Example
///
/// ```
/// use voxgate_synthesis::{SynthesisRequest, Synthesizer, ToneSynthesizer};
///
/// # #[tokio::main]
/// # async fn main() {
/// let audio = ToneSynthesizer::default()
///     .synthesize(&SynthesisRequest::new("valori"))
///     .await
///     .unwrap();
/// assert!(audio.audio().starts_with(b"RIFF"));
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct ToneSynthesizer {
    config: ToneConfig,
}

impl ToneSynthesizer {
    /// Synthesizer with `config`.
    pub fn new(config: ToneConfig) -> Self {
        Self { config }
    }

    /// Active settings.
    pub fn config(&self) -> &ToneConfig {
        &self.config
    }

    /// Encode `text` as WAV bytes.
    pub fn render(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.config.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let per_symbol = self.config.samples_per_symbol();
        let rate = f64::from(self.config.sample_rate);
        let amplitude = f64::from(self.config.amplitude);

        let mut cursor = Cursor::new(Vec::new());
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(encoding_error)?;
        let mut total = 0usize;
        for character in text.chars() {
            let frequency = char_frequency(character);
            for index in 0..per_symbol {
                let sample = if frequency == 0.0 {
                    0
                } else {
                    let angle = 2.0 * PI * frequency * index as f64 / rate;
                    (amplitude * angle.sin()) as i16
                };
                writer.write_sample(sample).map_err(encoding_error)?;
            }
            total += per_symbol;
        }
        writer.finalize().map_err(encoding_error)?;

        let duration = if rate > 0.0 { total as f64 / rate } else { 0.0 };
        debug!(characters = text.chars().count(), samples = total, "Rendered tones");
        Ok(SynthesizedAudio::new(
            Bytes::from(cursor.into_inner()),
            Some(duration),
        ))
    }
}

fn encoding_error(e: hound::Error) -> SynthesisError {
    SynthesisError::new(SynthesisErrorKind::Encoding(e.to_string()))
}

#[async_trait]
impl Synthesizer for ToneSynthesizer {
    fn name(&self) -> &str {
        "tone"
    }

    #[instrument(
        skip(self, request),
        fields(format = %request.format, chars = request.char_count())
    )]
    async fn synthesize(
        &self,
        request: &SynthesisRequest,
    ) -> Result<SynthesizedAudio, SynthesisError> {
        if request.format != AudioFormat::Wav {
            return Err(SynthesisError::new(SynthesisErrorKind::UnsupportedFormat(
                format!("tone synthesizer only produces wav, not {}", request.format),
            )));
        }
        self.render(&request.text)
    }
}
