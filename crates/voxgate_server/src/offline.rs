//! Offline tone rendering for the `synthesize` subcommand.
//!
//! Bypasses the gateway entirely: no identity, no budget, no cache.

use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::info;
use voxgate_error::{ConfigError, SynthesisError, SynthesisErrorKind, VoxgateResult};
use voxgate_synthesis::{SynthesizedAudio, ToneConfig, ToneSynthesizer};

/// Where the text to render comes from.
#[derive(Debug, Clone, PartialEq)]
pub enum TextSource {
    /// Text given on the command line
    Inline(String),
    /// UTF-8 text file
    File(PathBuf),
    /// Everything on standard input
    Stdin,
}

impl TextSource {
    /// Pick the source from the `--text` and `--input-file` flags.
    pub fn from_args(text: Option<String>, input_file: Option<PathBuf>) -> Self {
        match (text, input_file) {
            (Some(text), _) => Self::Inline(text),
            (None, Some(path)) => Self::File(path),
            (None, None) => Self::Stdin,
        }
    }

    /// Read the text, trimmed of surrounding whitespace.
    ///
    /// # Errors
    ///
    /// `FileIo` if the source cannot be read, `InvalidRequest` if it is blank.
    pub fn read(&self) -> VoxgateResult<String> {
        let raw = match self {
            Self::Inline(text) => text.clone(),
            Self::File(path) => std::fs::read_to_string(path).map_err(|e| {
                SynthesisError::new(SynthesisErrorKind::FileIo(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            })?,
            Self::Stdin => {
                let mut buffer = String::new();
                std::io::stdin().read_to_string(&mut buffer).map_err(|e| {
                    SynthesisError::new(SynthesisErrorKind::FileIo(format!("stdin: {}", e)))
                })?;
                buffer
            }
        };

        let text = raw.trim();
        if text.is_empty() {
            return Err(SynthesisError::new(SynthesisErrorKind::InvalidRequest(
                "text must not be empty".to_string(),
            ))
            .into());
        }
        Ok(text.to_string())
    }
}

/// Tone settings from `base` with command-line overrides applied.
///
/// # Errors
///
/// Returns an error if an override is zero, negative or not finite.
pub fn tone_with_overrides(
    base: &ToneConfig,
    sample_rate: Option<u32>,
    symbol_duration: Option<f64>,
) -> VoxgateResult<ToneConfig> {
    let sample_rate = sample_rate.unwrap_or(*base.sample_rate());
    let symbol_duration = symbol_duration.unwrap_or(*base.symbol_duration());
    if sample_rate == 0 {
        return Err(ConfigError::new("sample rate must be at least 1").into());
    }
    if !symbol_duration.is_finite() || symbol_duration <= 0.0 {
        return Err(ConfigError::new("symbol duration must be a positive number of seconds").into());
    }
    Ok(ToneConfig::new(sample_rate, symbol_duration, *base.amplitude()))
}

/// Render `text` with `config` and write the WAV to `output`.
///
/// # Errors
///
/// `Encoding` if the audio cannot be built, `FileIo` if `output` cannot be written.
pub fn render_to_file(
    config: &ToneConfig,
    text: &str,
    output: &Path,
) -> VoxgateResult<SynthesizedAudio> {
    let audio = ToneSynthesizer::new(config.clone()).render(text)?;
    std::fs::write(output, audio.audio()).map_err(|e| {
        SynthesisError::new(SynthesisErrorKind::FileIo(format!(
            "{}: {}",
            output.display(),
            e
        )))
    })?;
    info!(
        path = %output.display(),
        bytes = audio.audio().len(),
        "Audio written"
    );
    Ok(audio)
}
