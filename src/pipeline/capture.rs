//! Microphone capture thread.
//!
//! Pulls float samples from an [`AudioSource`], cuts them into fixed windows
//! and ships each window as an encoded chunk on the outbound channel.

use crate::audio::frame::{AudioFormat, AudioFrame, EncodedChunk};
use crate::audio::pcm;
use crate::audio::recorder::AudioSource;
use crate::defaults;
use crate::error::{Result, SigoError};
use crate::pipeline::error::{ErrorReporter, LogReporter, StationError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

const STATION: &str = "capture";

/// Called once from the capture thread when the source fails mid-session.
pub type CaptureFailureHandler = Box<dyn Fn(SigoError) + Send>;

#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    /// Samples per outbound frame.
    pub frame_size: usize,
    /// Format the source delivers and the remote endpoint expects.
    pub format: AudioFormat,
    /// Sleep between reads when the source has nothing new (ms).
    pub poll_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frame_size: defaults::FRAME_SIZE,
            format: AudioFormat::capture(),
            poll_interval_ms: defaults::CAPTURE_POLL_MS,
        }
    }
}

/// Splits a sample stream into fixed-size frames.
#[derive(Debug)]
struct Framer {
    pending: Vec<f32>,
    frame_size: usize,
    format: AudioFormat,
    sequence: u64,
}

impl Framer {
    fn new(frame_size: usize, format: AudioFormat) -> Self {
        Self {
            pending: Vec::with_capacity(frame_size * 2),
            frame_size: frame_size.max(1),
            format,
            sequence: 0,
        }
    }

    fn push(&mut self, samples: &[f32]) -> Vec<AudioFrame> {
        self.pending.extend_from_slice(samples);
        let mut frames = Vec::new();
        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            let window = std::mem::replace(&mut self.pending, rest);
            frames.push(AudioFrame::new(window, self.format, self.sequence));
            self.sequence += 1;
        }
        frames
    }

    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

pub struct CapturePipeline {
    source: Box<dyn AudioSource>,
    config: CaptureConfig,
    reporter: Arc<dyn ErrorReporter>,
}

impl CapturePipeline {
    pub fn new(source: Box<dyn AudioSource>, config: CaptureConfig) -> Self {
        Self {
            source,
            config,
            reporter: Arc::new(LogReporter),
        }
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Spawn the capture thread. The source must already be started.
    ///
    /// Frames go to `outbound` until the handle is stopped, the receiver is
    /// dropped or the source fails. On failure `on_failure` is called once.
    pub fn start(
        self,
        outbound: UnboundedSender<EncodedChunk>,
        on_failure: CaptureFailureHandler,
    ) -> Result<CaptureHandle> {
        let Self {
            mut source,
            config,
            reporter,
        } = self;

        let running = Arc::new(AtomicBool::new(true));
        let frames_sent = Arc::new(AtomicU64::new(0));
        let thread_running = Arc::clone(&running);
        let thread_frames = Arc::clone(&frames_sent);
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        let thread = thread::Builder::new()
            .name("sigo-capture".to_string())
            .spawn(move || {
                let mut framer = Framer::new(config.frame_size, config.format);

                'capture: while thread_running.load(Ordering::SeqCst) {
                    let samples = match source.read_samples() {
                        Ok(samples) => samples,
                        Err(e) => {
                            reporter.report(STATION, &StationError::Fatal(e.to_string()));
                            if thread_running.swap(false, Ordering::SeqCst) {
                                on_failure(e);
                            }
                            break;
                        }
                    };

                    if samples.is_empty() {
                        thread::sleep(poll_interval);
                        continue;
                    }

                    for frame in framer.push(&samples) {
                        // Nothing leaves once the session has stopped capture
                        if !thread_running.load(Ordering::SeqCst) {
                            break 'capture;
                        }
                        let chunk = pcm::encode_chunk(frame.samples(), frame.format());
                        if outbound.send(chunk).is_err() {
                            tracing::debug!("outbound channel closed, ending capture");
                            thread_running.store(false, Ordering::SeqCst);
                            break 'capture;
                        }
                        thread_frames.fetch_add(1, Ordering::SeqCst);
                    }
                }

                if framer.pending_len() > 0 {
                    tracing::trace!(
                        samples = framer.pending_len(),
                        "discarding partial capture frame"
                    );
                }
                if let Err(e) = source.stop() {
                    reporter.report(STATION, &StationError::Recoverable(e.to_string()));
                }
                source
            })?;

        tracing::debug!(
            frame_size = config.frame_size,
            format = %config.format,
            "capture started"
        );

        Ok(CaptureHandle {
            running,
            frames_sent,
            thread: Some(thread),
        })
    }
}

/// Handle to a running capture thread.
pub struct CaptureHandle {
    running: Arc<AtomicBool>,
    frames_sent: Arc<AtomicU64>,
    thread: Option<JoinHandle<Box<dyn AudioSource>>>,
}

impl CaptureHandle {
    /// Stop capturing and wait for the thread. Returns the stopped source,
    /// or `None` if the capture thread panicked.
    pub fn stop(mut self) -> Option<Box<dyn AudioSource>> {
        self.running.store(false, Ordering::SeqCst);
        let thread = self.thread.take()?;
        match thread.join() {
            Ok(source) => Some(source),
            Err(_) => {
                tracing::error!("capture thread panicked");
                None
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::SeqCst)
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
