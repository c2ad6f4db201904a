//! PCM codec: float/int16 sample conversion and int16 byte packing.
//!
//! The wire encoding is signed 16-bit little-endian PCM. JSON messages carry
//! the bytes as standard base64 text.

use crate::audio::frame::{AudioFormat, EncodedChunk, PcmBuffer};
use crate::error::{Result, SigoError};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;

/// Bytes per encoded sample.
pub const SAMPLE_WIDTH: usize = 2;

const I16_SCALE: f32 = 32768.0;

/// Packs samples as little-endian bytes.
pub fn encode(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * SAMPLE_WIDTH);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Unpacks little-endian bytes into samples.
///
/// # Errors
/// `MalformedPayload` when the length is not a multiple of [`SAMPLE_WIDTH`].
pub fn decode(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.len() % SAMPLE_WIDTH != 0 {
        return Err(SigoError::malformed(format!(
            "{} bytes is not a whole number of 16-bit samples",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(SAMPLE_WIDTH)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Converts a float sample in [-1.0, 1.0] to int16.
///
/// Scales by 32768 and truncates toward zero. Out-of-range input is clamped
/// to the int16 range instead of wrapping; NaN maps to silence.
pub fn float_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    (sample * I16_SCALE)
        .trunc()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Converts an int16 sample to a float in [-1.0, 1.0).
pub fn i16_to_float(sample: i16) -> f32 {
    sample as f32 / I16_SCALE
}

pub fn floats_to_i16(samples: &[f32]) -> Vec<i16> {
    samples.iter().copied().map(float_to_i16).collect()
}

pub fn i16_to_floats(samples: &[i16]) -> Vec<f32> {
    samples.iter().copied().map(i16_to_float).collect()
}

/// Converts float samples and packs them into a chunk of the given format.
pub fn encode_chunk(samples: &[f32], format: AudioFormat) -> EncodedChunk {
    EncodedChunk::new(encode(&floats_to_i16(samples)), format)
}

/// Decodes a chunk into a playable float buffer.
pub fn decode_chunk(chunk: &EncodedChunk) -> Result<PcmBuffer> {
    let samples = decode(chunk.data())?;
    PcmBuffer::new(i16_to_floats(&samples), chunk.format())
}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

pub fn decode_base64(text: &str) -> Result<Vec<u8>> {
    BASE64_STANDARD
        .decode(text.trim())
        .map_err(|e| SigoError::malformed(format!("invalid base64 audio data: {}", e)))
}
