//! Playback sinks: a clocked timeline on which decoded buffers are scheduled.

use crate::audio::frame::PcmBuffer;
use crate::error::{Result, SigoError};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

/// Identifier of one scheduled playback segment.
pub type SegmentId = u64;

/// An output device with its own playback clock.
///
/// Times are seconds on the device timeline, which starts at 0 when the
/// output is created and only moves forward.
pub trait AudioOutput: Send {
    /// Current position of the playback clock.
    fn current_time(&self) -> f64;

    /// Queue `buffer` to begin playing at `start_at`.
    fn schedule(&mut self, id: SegmentId, buffer: PcmBuffer, start_at: f64) -> Result<()>;

    /// Stop a segment immediately, whether it is playing or still pending.
    ///
    /// A stopped segment is never reported by [`AudioOutput::take_finished`].
    fn stop(&mut self, id: SegmentId);

    /// Segments that played to completion since the previous call.
    fn take_finished(&mut self) -> Vec<SegmentId>;
}

/// One call to [`AudioOutput::schedule`] as seen by [`MockAudioOutput`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledPlayback {
    pub id: SegmentId,
    pub start: f64,
    pub duration: f64,
    pub samples: usize,
}

impl ScheduledPlayback {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

#[derive(Debug, Default)]
struct MockOutputState {
    now: f64,
    scheduled: Vec<ScheduledPlayback>,
    stopped: Vec<SegmentId>,
    reported: HashSet<SegmentId>,
    fail_schedule: bool,
}

/// Output with a manually advanced clock, for tests.
///
/// Clones share state so a test can drive time while a scheduler owns the output.
#[derive(Debug, Clone, Default)]
pub struct MockAudioOutput {
    state: Arc<Mutex<MockOutputState>>,
}

impl MockAudioOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `schedule` call fail.
    pub fn with_schedule_failure(self) -> Self {
        self.lock().fail_schedule = true;
        self
    }

    /// Move the playback clock forward.
    pub fn advance(&self, seconds: f64) {
        self.lock().now += seconds;
    }

    pub fn set_time(&self, seconds: f64) {
        self.lock().now = seconds;
    }

    pub fn scheduled(&self) -> Vec<ScheduledPlayback> {
        self.lock().scheduled.clone()
    }

    pub fn stopped(&self) -> Vec<SegmentId> {
        self.lock().stopped.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockOutputState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl AudioOutput for MockAudioOutput {
    fn current_time(&self) -> f64 {
        self.lock().now
    }

    fn schedule(&mut self, id: SegmentId, buffer: PcmBuffer, start_at: f64) -> Result<()> {
        let mut state = self.lock();
        if state.fail_schedule {
            return Err(SigoError::AudioPlayback {
                message: "mock output rejected buffer".to_string(),
            });
        }
        state.scheduled.push(ScheduledPlayback {
            id,
            start: start_at,
            duration: buffer.duration(),
            samples: buffer.samples().len(),
        });
        Ok(())
    }

    fn stop(&mut self, id: SegmentId) {
        self.lock().stopped.push(id);
    }

    fn take_finished(&mut self) -> Vec<SegmentId> {
        let mut state = self.lock();
        let now = state.now;
        let finished: Vec<SegmentId> = state
            .scheduled
            .iter()
            .filter(|s| s.end() <= now)
            .map(|s| s.id)
            .filter(|id| !state.stopped.contains(id) && !state.reported.contains(id))
            .collect();
        state.reported.extend(finished.iter().copied());
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::AudioFormat;

    fn half_second() -> PcmBuffer {
        PcmBuffer::new(vec![0.0; 12000], AudioFormat::playback()).unwrap()
    }

    #[test]
    fn mock_reports_finished_segments_once() {
        let mut output = MockAudioOutput::new();
        output.schedule(1, half_second(), 0.0).unwrap();

        assert!(output.take_finished().is_empty());
        output.advance(0.5);
        assert_eq!(output.take_finished(), vec![1]);
        assert!(output.take_finished().is_empty());
    }

    #[test]
    fn mock_never_reports_stopped_segments() {
        let mut output = MockAudioOutput::new();
        output.schedule(1, half_second(), 0.0).unwrap();
        output.stop(1);
        output.advance(2.0);

        assert!(output.take_finished().is_empty());
        assert_eq!(output.stopped(), vec![1]);
    }

    #[test]
    fn mock_clones_share_clock() {
        let output = MockAudioOutput::new();
        let driver = output.clone();
        driver.advance(1.25);
        assert_eq!(output.current_time(), 1.25);
    }

    #[test]
    fn mock_schedule_failure() {
        let mut output = MockAudioOutput::new().with_schedule_failure();
        assert!(output.schedule(1, half_second(), 0.0).is_err());
        assert!(output.scheduled().is_empty());
    }
}
