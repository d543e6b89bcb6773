//! Output audio formats.

use serde::{Deserialize, Serialize};

/// Audio container a caller may request.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum AudioFormat {
    /// RIFF WAVE, 16-bit PCM
    #[default]
    Wav,
    /// MPEG layer III
    Mp3,
    /// Ogg Opus
    Opus,
    /// AAC in ADTS
    Aac,
    /// FLAC
    Flac,
    /// Headerless 16-bit PCM
    Pcm,
}

impl AudioFormat {
    /// MIME type for responses carrying this format.
    pub fn content_type(self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Opus => "audio/ogg",
            AudioFormat::Aac => "audio/aac",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Pcm => "audio/pcm",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(AudioFormat::from_str("MP3").unwrap(), AudioFormat::Mp3);
        assert_eq!(AudioFormat::from_str("wav").unwrap(), AudioFormat::Wav);
        assert!(AudioFormat::from_str("midi").is_err());
    }

    #[test]
    fn test_display_matches_serde() {
        for format in AudioFormat::iter() {
            let json = serde_json::to_string(&format).unwrap();
            assert_eq!(json, format!("\"{}\"", format));
            assert!(format.content_type().starts_with("audio/"));
        }
    }
}
