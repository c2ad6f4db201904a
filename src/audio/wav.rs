//! WAV file audio source, used in place of a microphone for headless runs.

use crate::audio::pcm;
use crate::audio::recorder::AudioSource;
use crate::defaults::CAPTURE_SAMPLE_RATE;
use crate::error::{Result, SigoError};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::time::{Duration, Instant};

/// Audio source that reads from WAV file data.
/// Supports arbitrary sample rates and channels, resampling to 16kHz mono.
pub struct WavAudioSource {
    samples: Vec<f32>,
    position: usize,
    chunk_size: usize,
    realtime: bool,
    started_at: Option<Instant>,
}

impl WavAudioSource {
    /// Create from any reader (for testing/flexibility).
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Result<Self> {
        let mut wav_reader =
            hound::WavReader::new(reader).map_err(|e| SigoError::AudioCapture {
                message: format!("Failed to parse WAV file: {}", e),
            })?;

        let spec = wav_reader.spec();
        let source_rate = spec.sample_rate;
        let source_channels = spec.channels as usize;

        let raw_samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 16) => wav_reader
                .samples::<i16>()
                .map(|s| s.map(pcm::i16_to_float))
                .collect::<std::result::Result<Vec<_>, _>>(),
            (hound::SampleFormat::Float, 32) => wav_reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>(),
            (format, bits) => {
                return Err(SigoError::AudioCapture {
                    message: format!("Unsupported WAV sample format: {:?} {}-bit", format, bits),
                });
            }
        }
        .map_err(|e| SigoError::AudioCapture {
            message: format!("Failed to read WAV samples: {}", e),
        })?;

        // Mix down to mono by averaging channels
        let mono_samples = if source_channels > 1 {
            raw_samples
                .chunks_exact(source_channels)
                .map(|frame| frame.iter().sum::<f32>() / source_channels as f32)
                .collect()
        } else {
            raw_samples
        };

        let samples = resample(&mono_samples, source_rate, CAPTURE_SAMPLE_RATE);

        // 100ms chunks at 16kHz
        let chunk_size = (CAPTURE_SAMPLE_RATE / 10) as usize;

        Ok(Self {
            samples,
            position: 0,
            chunk_size,
            realtime: false,
            started_at: None,
        })
    }

    /// Open a WAV file from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| SigoError::AudioCapture {
            message: format!("Failed to open {}: {}", path.display(), e),
        })?;
        Self::from_reader(Box::new(BufReader::new(file)))
    }

    /// Release samples no faster than wall-clock time, like a microphone would.
    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    /// Total duration of the file in seconds after resampling.
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / CAPTURE_SAMPLE_RATE as f64
    }

    /// True once every sample has been read.
    pub fn is_exhausted(&self) -> bool {
        self.position >= self.samples.len()
    }

    /// Consume the source and return all samples as a single buffer.
    pub fn into_samples(self) -> Vec<f32> {
        self.samples
    }

    fn available_end(&self) -> usize {
        let limit = match (self.realtime, self.started_at) {
            (true, Some(started)) => {
                (started.elapsed().as_secs_f64() * CAPTURE_SAMPLE_RATE as f64) as usize
            }
            (true, None) => 0,
            (false, _) => self.position + self.chunk_size,
        };
        limit.min(self.samples.len())
    }

    /// Clock origin that makes `position` the sample due right now.
    fn resume_origin(&self) -> Instant {
        let now = Instant::now();
        let consumed = Duration::from_secs_f64(self.position as f64 / CAPTURE_SAMPLE_RATE as f64);
        now.checked_sub(consumed).unwrap_or(now)
    }
}

impl AudioSource for WavAudioSource {
    fn start(&mut self) -> Result<()> {
        // Resume where the last run left off rather than replaying from zero
        self.started_at = Some(self.resume_origin());
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.started_at = None;
        Ok(())
    }

    /// A file has no stale backlog: the clock restarts at the current
    /// position so the next read continues the recording.
    fn discard_pending(&mut self) -> Result<usize> {
        if self.started_at.is_some() {
            self.started_at = Some(self.resume_origin());
        }
        Ok(0)
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        let end = self.available_end();
        if end <= self.position {
            return Ok(Vec::new());
        }

        let chunk = self.samples[self.position..end].to_vec();
        self.position = end;

        Ok(chunk)
    }
}

/// Simple linear interpolation resampling.
pub(crate) fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = (source_pos - source_idx as f64) as f32;

            if source_idx + 1 >= samples.len() {
                samples[source_idx]
            } else {
                let left = samples[source_idx];
                let right = samples[source_idx + 1];
                left + (right - left) * fraction
            }
        })
        .collect()
}
