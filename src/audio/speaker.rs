//! Speaker output using CPAL: a sample-accurate timeline mixer.
//!
//! Scheduled segments are converted to the device format up front. The
//! output callback renders whichever segments overlap the frames it is asked
//! for and advances the frame counter that drives the playback clock.

use crate::audio::capture::{is_preferred_device, with_suppressed_stderr};
use crate::audio::frame::PcmBuffer;
use crate::audio::output::{AudioOutput, SegmentId};
use crate::audio::pcm;
use crate::audio::wav::resample;
use crate::error::{Result, SigoError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{Arc, Mutex, MutexGuard};

struct Segment {
    id: SegmentId,
    start_frame: u64,
    samples: Vec<f32>,
}

impl Segment {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

struct Timeline {
    frames_rendered: u64,
    segments: Vec<Segment>,
    finished: Vec<SegmentId>,
}

impl Timeline {
    fn new() -> Self {
        Self {
            frames_rendered: 0,
            segments: Vec::new(),
            finished: Vec::new(),
        }
    }

    /// Mix all segments into `out` (interleaved, `channels` wide) and advance the clock.
    fn render(&mut self, out: &mut [f32], channels: usize) {
        let frames = out.len() / channels.max(1);
        let first = self.frames_rendered;

        for (i, frame) in out.chunks_mut(channels.max(1)).enumerate() {
            let position = first + i as u64;
            let mut value = 0.0f32;
            for segment in &self.segments {
                if position >= segment.start_frame && position < segment.end_frame() {
                    value += segment.samples[(position - segment.start_frame) as usize];
                }
            }
            frame.fill(value.clamp(-1.0, 1.0));
        }

        self.frames_rendered = first + frames as u64;
        let now = self.frames_rendered;
        let finished = &mut self.finished;
        self.segments.retain(|segment| {
            if segment.end_frame() <= now {
                finished.push(segment.id);
                false
            } else {
                true
            }
        });
    }

    /// Same as [`Timeline::render`] for devices that only take i16 samples.
    /// `scratch` is reused across callbacks.
    fn render_i16(&mut self, out: &mut [i16], scratch: &mut Vec<f32>, channels: usize) {
        scratch.clear();
        scratch.resize(out.len(), 0.0);
        self.render(scratch, channels);
        for (sample, &value) in out.iter_mut().zip(scratch.iter()) {
            *sample = pcm::float_to_i16(value);
        }
    }
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is created, kept and dropped by the owning
/// CpalAudioOutput and never shared between threads.
struct SendableStream(#[allow(dead_code)] cpal::Stream);

unsafe impl Send for SendableStream {}

/// Speaker output implementing [`AudioOutput`] on the default (or named) device.
pub struct CpalAudioOutput {
    timeline: Arc<Mutex<Timeline>>,
    device_rate: u32,
    _stream: SendableStream,
}

impl CpalAudioOutput {
    /// Open the output device and start the (initially silent) stream.
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let device = find_output_device(device_name)?;
        let default_config =
            device
                .default_output_config()
                .map_err(|e| SigoError::AudioPlayback {
                    message: format!("Failed to query default output config: {}", e),
                })?;

        let device_rate = default_config.sample_rate();
        let channels = default_config.channels() as usize;
        let sample_format = default_config.sample_format();
        let stream_config: cpal::StreamConfig = default_config.into();

        let timeline = Arc::new(Mutex::new(Timeline::new()));
        let stream = build_stream(&device, &stream_config, sample_format, channels, &timeline)?;

        stream.play().map_err(|e| SigoError::AudioPlayback {
            message: format!("Failed to start output stream: {}", e),
        })?;

        tracing::debug!(
            "output stream running at {}Hz/{}ch/{:?}",
            device_rate,
            channels,
            sample_format
        );

        Ok(Self {
            timeline,
            device_rate,
            _stream: SendableStream(stream),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Timeline> {
        self.timeline.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Build the output stream in the device's native sample format.
fn build_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    channels: usize,
    timeline: &Arc<Mutex<Timeline>>,
) -> Result<cpal::Stream> {
    use cpal::SampleFormat;

    let err_callback = |err| {
        tracing::error!("audio output stream error: {}", err);
    };
    let render_timeline = Arc::clone(timeline);

    match sample_format {
        SampleFormat::F32 => device
            .build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    match render_timeline.lock() {
                        Ok(mut timeline) => timeline.render(data, channels),
                        Err(_) => data.fill(0.0),
                    }
                },
                err_callback,
                None,
            )
            .map_err(|e| SigoError::AudioPlayback {
                message: format!("Failed to build f32 output stream: {}", e),
            }),
        SampleFormat::I16 => {
            let mut scratch = Vec::new();
            device
                .build_output_stream(
                    config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        match render_timeline.lock() {
                            Ok(mut timeline) => timeline.render_i16(data, &mut scratch, channels),
                            Err(_) => data.fill(0),
                        }
                    },
                    err_callback,
                    None,
                )
                .map_err(|e| SigoError::AudioPlayback {
                    message: format!("Failed to build i16 output stream: {}", e),
                })
        }
        fmt => Err(SigoError::AudioPlayback {
            message: format!(
                "Unsupported output sample format: {:?}. \
                 Try setting playback.device in the config.",
                fmt
            ),
        }),
    }
}

fn find_output_device(device_name: Option<&str>) -> Result<cpal::Device> {
    with_suppressed_stderr(|| {
        let host = cpal::default_host();

        if let Some(name) = device_name {
            let devices = host
                .output_devices()
                .map_err(|e| SigoError::AudioPlayback {
                    message: format!("Failed to enumerate output devices: {}", e),
                })?;
            for dev in devices {
                if let Ok(dev_name) = dev.name()
                    && dev_name == name
                {
                    return Ok(dev);
                }
            }
            return Err(SigoError::AudioDeviceNotFound {
                device: name.to_string(),
            });
        }

        if let Ok(devices) = host.output_devices() {
            for device in devices {
                if let Ok(name) = device.name()
                    && is_preferred_device(&name)
                {
                    return Ok(device);
                }
            }
        }

        host.default_output_device()
            .ok_or_else(|| SigoError::AudioDeviceNotFound {
                device: "default output".to_string(),
            })
    })
}

impl AudioOutput for CpalAudioOutput {
    fn current_time(&self) -> f64 {
        self.lock().frames_rendered as f64 / self.device_rate as f64
    }

    fn schedule(&mut self, id: SegmentId, buffer: PcmBuffer, start_at: f64) -> Result<()> {
        let source_rate = buffer.format().sample_rate;
        let samples = resample(&buffer.to_mono(), source_rate, self.device_rate);
        let start_frame = (start_at.max(0.0) * self.device_rate as f64).round() as u64;

        let mut timeline = self.lock();
        // A start already in the past plays from the next rendered frame
        let start_frame = start_frame.max(timeline.frames_rendered);
        timeline.segments.push(Segment {
            id,
            start_frame,
            samples,
        });
        Ok(())
    }

    fn stop(&mut self, id: SegmentId) {
        self.lock().segments.retain(|segment| segment.id != id);
    }

    fn take_finished(&mut self) -> Vec<SegmentId> {
        std::mem::take(&mut self.lock().finished)
    }
}
