//! Audio format descriptions and the small amount of sample handling the
//! conversation loop needs.
//!
//! Audio is carried as raw, headerless mono samples: either 16-bit signed
//! little-endian PCM (`linear16`) or 8-bit G.711 mu-law (`mulaw`).

use crate::error::VoiceError;
use serde::{Deserialize, Serialize};

/// Sample encoding of a raw audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    /// 16-bit signed little-endian PCM.
    #[default]
    Linear16,
    /// 8-bit G.711 mu-law.
    Mulaw,
}

impl AudioEncoding {
    /// Number of bytes occupied by one mono sample.
    pub fn bytes_per_sample(self) -> usize {
        match self {
            AudioEncoding::Linear16 => 2,
            AudioEncoding::Mulaw => 1,
        }
    }
}

/// Format of the audio the client streams to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputAudioConfig {
    pub sampling_rate: u32,
    pub audio_encoding: AudioEncoding,
    pub chunk_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downsampling: Option<u32>,
}

/// Format of the audio the server streams back to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputAudioConfig {
    pub sampling_rate: u32,
    pub audio_encoding: AudioEncoding,
}

impl Default for OutputAudioConfig {
    fn default() -> Self {
        Self {
            sampling_rate: 16_000,
            audio_encoding: AudioEncoding::Linear16,
        }
    }
}

/// Decodes one G.711 mu-law byte into a linear 16-bit sample.
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let u = !byte;
    let sign = u & 0x80;
    let exponent = (u >> 4) & 0x07;
    let mantissa = u & 0x0F;
    let magnitude = ((((mantissa as i32) << 3) + 0x84) << exponent) - 0x84;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

/// Decodes raw audio bytes into linear 16-bit samples.
///
/// # Errors
///
/// Returns [`VoiceError::UnsupportedAudio`] when `linear16` data has an odd
/// byte length.
pub fn decode_samples(data: &[u8], encoding: AudioEncoding) -> Result<Vec<i16>, VoiceError> {
    match encoding {
        AudioEncoding::Linear16 => {
            if data.len() % 2 != 0 {
                return Err(VoiceError::UnsupportedAudio(format!(
                    "linear16 frame has odd length {}",
                    data.len()
                )));
            }
            Ok(data
                .chunks_exact(2)
                .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
                .collect())
        }
        AudioEncoding::Mulaw => Ok(data.iter().copied().map(mulaw_to_linear).collect()),
    }
}

/// Encodes linear samples as 16-bit little-endian PCM.
pub fn encode_linear16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Root-mean-square amplitude of a block of samples, in raw sample units.
pub fn rms(samples: &[i16]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Number of bytes holding `millis` of audio at the given rate and encoding.
pub fn bytes_for_duration(sampling_rate: u32, encoding: AudioEncoding, millis: u32) -> usize {
    (sampling_rate as usize * millis as usize / 1000) * encoding.bytes_per_sample()
}

/// Splits `audio` into chunks of `millis` length, keeping sample boundaries.
pub fn chunk_audio<'a>(audio: &'a [u8], config: &OutputAudioConfig, millis: u32) -> Vec<&'a [u8]> {
    let size = bytes_for_duration(config.sampling_rate, config.audio_encoding, millis)
        .max(config.audio_encoding.bytes_per_sample());
    audio.chunks(size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mulaw_silence_and_extremes() {
        assert_eq!(mulaw_to_linear(0xFF), 0);
        assert_eq!(mulaw_to_linear(0x7F), 0);
        assert_eq!(mulaw_to_linear(0x00), -32124);
        assert_eq!(mulaw_to_linear(0x80), 32124);
    }

    #[test]
    fn linear16_decodes_little_endian() {
        let samples = decode_samples(&[0x01, 0x00, 0xFF, 0xFF], AudioEncoding::Linear16).unwrap();
        assert_eq!(samples, vec![1, -1]);
    }

    #[test]
    fn linear16_rejects_odd_length() {
        let result = decode_samples(&[0x01, 0x00, 0x02], AudioEncoding::Linear16);
        assert!(matches!(result, Err(VoiceError::UnsupportedAudio(_))));
    }

    #[test]
    fn rms_of_constant_signal_is_its_magnitude() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[-300, 300, -300, 300]) - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn chunking_respects_duration() {
        let config = OutputAudioConfig {
            sampling_rate: 8_000,
            audio_encoding: AudioEncoding::Linear16,
        };
        // 250 ms of audio split into 100 ms chunks
        let audio = vec![0u8; 4_000];
        let chunks = chunk_audio(&audio, &config, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1_600);
        assert_eq!(chunks[2].len(), 800);
    }

    #[test]
    fn chunks_outlive_the_output_config() {
        let audio = vec![1u8; 320];
        let chunks = {
            let config = OutputAudioConfig {
                sampling_rate: 16_000,
                audio_encoding: AudioEncoding::Linear16,
            };
            chunk_audio(&audio, &config, 5)
        };
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.len() == 160));
    }

    #[test]
    fn audio_config_uses_snake_case_fields() {
        let json = serde_json::json!({
            "sampling_rate": 8000,
            "audio_encoding": "mulaw",
            "chunk_size": 320
        });
        let config: InputAudioConfig = serde_json::from_value(json).unwrap();
        assert_eq!(config.audio_encoding, AudioEncoding::Mulaw);
        assert_eq!(config.downsampling, None);
    }
}
