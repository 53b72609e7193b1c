//! PCM codec and transport text encoding
//!
//! Converts between float samples and signed 16-bit little-endian PCM, and
//! between raw bytes and the base64 text carried by the session protocol.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::{Error, Result};

/// Sample rate of captured microphone audio sent upstream
pub const INPUT_SAMPLE_RATE: u32 = 16000;

/// Sample rate of synthesized speech received from the session
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Number of samples in one outbound capture window
pub const CAPTURE_WINDOW: usize = 4096;

/// Quantize a single float sample to i16
///
/// Negative values scale by 32768 and non-negative values by 32767 so both
/// ends of [-1, 1] map onto the full i16 range.
#[allow(clippy::cast_possible_truncation)]
#[must_use]
pub fn quantize(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encode float samples as s16le PCM bytes
///
/// Out-of-range input is clamped, never rejected.
#[must_use]
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&quantize(sample).to_le_bytes());
    }
    bytes
}

/// Decode s16le PCM bytes into float samples in [-1, 1)
///
/// # Errors
///
/// Returns `MalformedAudio` if the byte length is odd
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(Error::MalformedAudio(format!(
            "PCM payload has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect())
}

/// Encode raw bytes as transport-safe text
#[must_use]
pub fn to_transport_text(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode transport text back into raw bytes
///
/// # Errors
///
/// Returns `MalformedAudio` if the text is not valid base64
pub fn from_transport_text(text: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(text)
        .map_err(|e| Error::MalformedAudio(format!("invalid base64 payload: {e}")))
}

/// MIME tag for raw PCM at the given rate
#[must_use]
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// One chunk of mono s16le PCM audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    data: Vec<u8>,
    sample_rate: u32,
}

impl AudioFrame {
    /// Wrap already-encoded PCM bytes
    #[must_use]
    pub const fn new(data: Vec<u8>, sample_rate: u32) -> Self {
        Self { data, sample_rate }
    }

    /// Encode float samples into a frame
    #[must_use]
    pub fn from_samples(samples: &[f32], sample_rate: u32) -> Self {
        Self::new(encode_pcm16(samples), sample_rate)
    }

    /// Decode a frame from transport text
    ///
    /// # Errors
    ///
    /// Returns `MalformedAudio` if the text is not valid base64
    pub fn from_transport_text(text: &str, sample_rate: u32) -> Result<Self> {
        Ok(Self::new(from_transport_text(text)?, sample_rate))
    }

    /// Raw PCM bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Sample rate in Hz
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// MIME tag describing encoding and rate
    #[must_use]
    pub fn mime_type(&self) -> String {
        pcm_mime_type(self.sample_rate)
    }

    /// Number of samples (rounded down for odd byte counts)
    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }

    /// Playback duration in seconds
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count() as f64 / f64::from(self.sample_rate)
    }

    /// Decode to float samples
    ///
    /// # Errors
    ///
    /// Returns `MalformedAudio` if the byte length is odd
    pub fn to_samples(&self) -> Result<Vec<f32>> {
        decode_pcm16(&self.data)
    }

    /// Encode the payload as transport text
    #[must_use]
    pub fn to_transport_text(&self) -> String {
        to_transport_text(&self.data)
    }
}
