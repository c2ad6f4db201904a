use crate::defaults;
use crate::error::{Result, SigoError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Trait for microphone-like audio sources.
///
/// This trait allows swapping implementations (real audio device vs mock).
pub trait AudioSource: Send {
    /// Acquire the device and start capturing.
    ///
    /// This is where microphone permission is requested; a refusal surfaces
    /// as an error here.
    fn start(&mut self) -> Result<()>;

    /// Stop capturing and release the device.
    fn stop(&mut self) -> Result<()>;

    /// Drain the float samples captured since the last read.
    ///
    /// Samples are mono, in [-1.0, 1.0], at [`AudioSource::sample_rate`].
    /// An empty vector means nothing new is available yet.
    fn read_samples(&mut self) -> Result<Vec<f32>>;

    /// Throw away everything captured so far without returning it.
    ///
    /// Returns how many samples were dropped.
    fn discard_pending(&mut self) -> Result<usize> {
        Ok(self.read_samples()?.len())
    }

    /// Rate of the samples returned by `read_samples`.
    fn sample_rate(&self) -> u32 {
        defaults::CAPTURE_SAMPLE_RATE
    }
}

#[derive(Debug, Default)]
struct MockSourceState {
    started: bool,
    start_calls: usize,
    stop_calls: usize,
    read_calls: usize,
    reads: VecDeque<Vec<f32>>,
}

/// Mock audio source for testing.
///
/// Clones share state, so a test can keep a clone to observe the source
/// after handing it to a session.
#[derive(Debug, Clone)]
pub struct MockAudioSource {
    state: Arc<Mutex<MockSourceState>>,
    repeat: Option<Vec<f32>>,
    should_fail_start: bool,
    should_fail_stop: bool,
    should_fail_read: bool,
    healthy_reads: usize,
    error_message: String,
}

impl MockAudioSource {
    /// Create a mock that yields nothing until configured.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockSourceState::default())),
            repeat: None,
            should_fail_start: false,
            should_fail_stop: false,
            should_fail_read: false,
            healthy_reads: 0,
            error_message: "mock audio error".to_string(),
        }
    }

    /// Return these samples on every read.
    pub fn with_samples(mut self, samples: Vec<f32>) -> Self {
        self.repeat = Some(samples);
        self
    }

    /// Return each batch once, in order, then nothing.
    pub fn with_reads(self, reads: Vec<Vec<f32>>) -> Self {
        self.lock().reads = reads.into();
        self
    }

    /// Configure the mock to fail on start, as when permission is refused.
    pub fn with_start_failure(mut self) -> Self {
        self.should_fail_start = true;
        self
    }

    pub fn with_stop_failure(mut self) -> Self {
        self.should_fail_stop = true;
        self
    }

    pub fn with_read_failure(mut self) -> Self {
        self.should_fail_read = true;
        self
    }

    /// Succeed for the first `reads` reads, then fail like `with_read_failure`.
    pub fn with_read_failure_after(mut self, reads: usize) -> Self {
        self.should_fail_read = true;
        self.healthy_reads = reads;
        self
    }

    pub fn with_error_message(mut self, message: &str) -> Self {
        self.error_message = message.to_string();
        self
    }

    pub fn is_started(&self) -> bool {
        self.lock().started
    }

    pub fn start_calls(&self) -> usize {
        self.lock().start_calls
    }

    pub fn stop_calls(&self) -> usize {
        self.lock().stop_calls
    }

    fn lock(&self) -> MutexGuard<'_, MockSourceState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource for MockAudioSource {
    fn start(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.start_calls += 1;
        if self.should_fail_start {
            return Err(SigoError::AudioPermissionDenied {
                message: self.error_message.clone(),
            });
        }
        state.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let mut state = self.lock();
        state.stop_calls += 1;
        if self.should_fail_stop {
            return Err(SigoError::AudioCapture {
                message: self.error_message.clone(),
            });
        }
        state.started = false;
        Ok(())
    }

    fn read_samples(&mut self) -> Result<Vec<f32>> {
        let mut state = self.lock();
        state.read_calls += 1;
        if self.should_fail_read && state.read_calls > self.healthy_reads {
            return Err(SigoError::AudioCapture {
                message: self.error_message.clone(),
            });
        }
        if let Some(batch) = state.reads.pop_front() {
            return Ok(batch);
        }
        Ok(self.repeat.clone().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_audio_source_returns_configured_samples() {
        let mut source = MockAudioSource::new().with_samples(vec![0.1, -0.2, 0.3]);
        assert_eq!(source.read_samples().unwrap(), vec![0.1, -0.2, 0.3]);
        assert_eq!(source.read_samples().unwrap(), vec![0.1, -0.2, 0.3]);
    }

    #[test]
    fn test_mock_audio_source_returns_reads_once_in_order() {
        let mut source = MockAudioSource::new().with_reads(vec![vec![0.1], vec![0.2, 0.3]]);
        assert_eq!(source.read_samples().unwrap(), vec![0.1]);
        assert_eq!(source.read_samples().unwrap(), vec![0.2, 0.3]);
        assert!(source.read_samples().unwrap().is_empty());
    }

    #[test]
    fn test_discard_pending_drops_one_batch() {
        let mut source = MockAudioSource::new().with_reads(vec![vec![0.9; 5], vec![0.1]]);
        assert_eq!(source.discard_pending().unwrap(), 5);
        assert_eq!(source.read_samples().unwrap(), vec![0.1]);
    }

    #[test]
    fn test_mock_audio_source_start_failure_is_permission_error() {
        let mut source = MockAudioSource::new()
            .with_start_failure()
            .with_error_message("user dismissed prompt");

        match source.start() {
            Err(SigoError::AudioPermissionDenied { message }) => {
                assert_eq!(message, "user dismissed prompt");
            }
            other => panic!("Expected AudioPermissionDenied, got {:?}", other),
        }
        assert!(!source.is_started());
        assert_eq!(source.start_calls(), 1);
    }

    #[test]
    fn test_mock_audio_source_read_failure() {
        let mut source = MockAudioSource::new().with_read_failure();
        assert!(matches!(
            source.read_samples(),
            Err(SigoError::AudioCapture { .. })
        ));
    }

    #[test]
    fn test_mock_audio_source_read_failure_after_healthy_reads() {
        let mut source = MockAudioSource::new()
            .with_samples(vec![0.1])
            .with_read_failure_after(2);
        assert!(source.read_samples().is_ok());
        assert!(source.read_samples().is_ok());
        assert!(source.read_samples().is_err());
    }

    #[test]
    fn test_mock_audio_source_stop_failure_keeps_started() {
        let mut source = MockAudioSource::new().with_stop_failure();
        source.start().unwrap();
        assert!(source.stop().is_err());
        assert!(source.is_started());
    }

    #[test]
    fn test_clones_share_state() {
        let source = MockAudioSource::new();
        let observer = source.clone();

        let mut boxed: Box<dyn AudioSource> = Box::new(source);
        boxed.start().unwrap();
        assert!(observer.is_started());

        boxed.stop().unwrap();
        assert!(!observer.is_started());
        assert_eq!(observer.stop_calls(), 1);
    }

    #[test]
    fn test_default_sample_rate_is_capture_rate() {
        let source = MockAudioSource::default();
        assert_eq!(source.sample_rate(), 16000);
    }
}
