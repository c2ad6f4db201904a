//! Audio data units flowing through a session.

use crate::defaults;
use crate::error::{Result, SigoError};
use serde::{Deserialize, Serialize};
use std::fmt;

const PCM_MIME_PREFIX: &str = "audio/pcm";

/// Sample rate and channel layout of a stream of PCM samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    /// Single-channel format at the given rate.
    pub const fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }

    /// Format of microphone frames sent to the remote endpoint.
    pub const fn capture() -> Self {
        Self::mono(defaults::CAPTURE_SAMPLE_RATE)
    }

    /// Format of audio streamed back by the remote endpoint.
    pub const fn playback() -> Self {
        Self::mono(defaults::PLAYBACK_SAMPLE_RATE)
    }

    /// MIME type used on the wire, e.g. `audio/pcm;rate=16000`.
    ///
    /// The channel parameter is only written for multi-channel audio.
    pub fn mime_type(&self) -> String {
        if self.channels == 1 {
            format!("{};rate={}", PCM_MIME_PREFIX, self.sample_rate)
        } else {
            format!(
                "{};rate={};channels={}",
                PCM_MIME_PREFIX, self.sample_rate, self.channels
            )
        }
    }

    /// Parses a PCM MIME type. Parameters missing from `mime` are taken from `fallback`.
    pub fn from_mime_type(mime: &str, fallback: AudioFormat) -> Result<Self> {
        let mut parts = mime.split(';').map(str::trim);
        let essence = parts.next().unwrap_or_default();
        if !essence.eq_ignore_ascii_case(PCM_MIME_PREFIX) {
            return Err(SigoError::malformed(format!(
                "unsupported audio MIME type '{}'",
                mime
            )));
        }

        let mut format = fallback;
        for param in parts.filter(|p| !p.is_empty()) {
            let (key, value) = param.split_once('=').ok_or_else(|| {
                SigoError::malformed(format!("invalid MIME parameter '{}'", param))
            })?;
            match key.trim().to_ascii_lowercase().as_str() {
                "rate" => format.sample_rate = parse_positive(value, "rate")?,
                "channels" => format.channels = parse_positive(value, "channels")?,
                _ => {}
            }
        }
        Ok(format)
    }

    /// Duration in seconds of `samples` interleaved samples in this format.
    pub fn duration_of(&self, samples: usize) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        samples as f64 / self.channels as f64 / self.sample_rate as f64
    }
}

fn parse_positive<T>(value: &str, name: &str) -> Result<T>
where
    T: std::str::FromStr + PartialEq + Default,
{
    match value.trim().parse::<T>() {
        Ok(v) if v != T::default() => Ok(v),
        _ => Err(SigoError::malformed(format!(
            "invalid {} '{}' in MIME type",
            name, value
        ))),
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz/{}ch", self.sample_rate, self.channels)
    }
}

/// A fixed-length window of captured float samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Vec<f32>,
    format: AudioFormat,
    sequence: u64,
}

impl AudioFrame {
    /// Creates a new audio frame.
    pub fn new(samples: Vec<f32>, format: AudioFormat, sequence: u64) -> Self {
        Self {
            samples,
            format,
            sequence,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Capture order of this frame within its session.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Duration of the frame in seconds.
    pub fn duration(&self) -> f64 {
        self.format.duration_of(self.samples.len())
    }
}

/// One transport unit of int16 little-endian PCM bytes.
///
/// Moved between pipeline stages and consumed by value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
    data: Vec<u8>,
    format: AudioFormat,
}

impl EncodedChunk {
    pub fn new(data: Vec<u8>, format: AudioFormat) -> Self {
        Self { data, format }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn mime_type(&self) -> String {
        self.format.mime_type()
    }

    /// Consumes the chunk, yielding its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Decoded, playable audio: interleaved float samples with their format.
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    samples: Vec<f32>,
    format: AudioFormat,
}

impl PcmBuffer {
    /// Creates a buffer, rejecting sample counts that do not fill whole frames.
    pub fn new(samples: Vec<f32>, format: AudioFormat) -> Result<Self> {
        if format.channels == 0 || format.sample_rate == 0 {
            return Err(SigoError::malformed(format!(
                "unplayable audio format {}",
                format
            )));
        }
        if samples.len() % format.channels as usize != 0 {
            return Err(SigoError::malformed(format!(
                "{} samples do not divide into {} channels",
                samples.len(),
                format.channels
            )));
        }
        Ok(Self { samples, format })
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.format.channels as usize
    }

    /// Playback duration in seconds.
    pub fn duration(&self) -> f64 {
        self.format.duration_of(self.samples.len())
    }

    /// Down-mixes to a single channel by averaging.
    pub fn to_mono(&self) -> Vec<f32> {
        let channels = self.format.channels as usize;
        if channels == 1 {
            return self.samples.clone();
        }
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }

    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }
}
