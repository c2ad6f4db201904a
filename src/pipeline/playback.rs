//! Gapless scheduling of streamed response audio.
//!
//! Every decoded chunk starts where the previous one ends, or at the current
//! playback clock if the output has already caught up. An interruption stops
//! everything in flight and pulls the cursor back to the clock.

use crate::audio::frame::EncodedChunk;
use crate::audio::output::{AudioOutput, SegmentId};
use crate::audio::pcm;
use crate::error::Result;
use std::collections::BTreeSet;

/// Where a chunk landed on the playback timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSegment {
    pub id: SegmentId,
    pub start: f64,
    pub duration: f64,
}

impl ScheduledSegment {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// Counters over the lifetime of a scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub scheduled: u64,
    pub finished: u64,
    pub dropped: u64,
    pub stopped: u64,
    pub interruptions: u64,
}

pub struct PlaybackScheduler<O: AudioOutput> {
    output: O,
    cursor: f64,
    active: BTreeSet<SegmentId>,
    next_id: SegmentId,
    stats: PlaybackStats,
}

impl<O: AudioOutput> PlaybackScheduler<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            cursor: 0.0,
            active: BTreeSet::new(),
            next_id: 0,
            stats: PlaybackStats::default(),
        }
    }

    /// Decode `chunk` and queue it right after everything already scheduled.
    ///
    /// # Errors
    /// A chunk that fails to decode or that the output rejects is dropped:
    /// the cursor and the active set are left untouched.
    pub fn on_chunk_received(&mut self, chunk: EncodedChunk) -> Result<ScheduledSegment> {
        let buffer = match pcm::decode_chunk(&chunk) {
            Ok(buffer) => buffer,
            Err(e) => {
                self.stats.dropped += 1;
                return Err(e);
            }
        };

        let start = self.cursor.max(self.output.current_time());
        let duration = buffer.duration();
        let id = self.next_id;

        if let Err(e) = self.output.schedule(id, buffer, start) {
            self.stats.dropped += 1;
            return Err(e);
        }

        self.next_id += 1;
        self.active.insert(id);
        self.cursor = start + duration;
        self.stats.scheduled += 1;

        tracing::trace!(id, start, duration, "scheduled playback segment");
        Ok(ScheduledSegment {
            id,
            start,
            duration,
        })
    }

    /// Remove segments the output reports as played out. Returns how many were removed.
    pub fn reap_finished(&mut self) -> usize {
        let mut removed = 0;
        for id in self.output.take_finished() {
            if self.active.remove(&id) {
                removed += 1;
            }
        }
        self.stats.finished += removed as u64;
        removed
    }

    /// Barge-in: stop all scheduled audio and reset the cursor to the clock.
    ///
    /// Safe to call with nothing scheduled. Returns how many segments were stopped.
    pub fn on_interrupted(&mut self) -> usize {
        let stopped = self.stop_all();
        self.stats.interruptions += 1;
        tracing::debug!(stopped, cursor = self.cursor, "playback interrupted");
        stopped
    }

    /// Stop every active segment exactly once and reset the cursor.
    pub fn stop_all(&mut self) -> usize {
        // Anything already finished is reaped rather than stopped
        self.reap_finished();

        let active = std::mem::take(&mut self.active);
        for id in &active {
            self.output.stop(*id);
        }
        self.stats.stopped += active.len() as u64;
        self.cursor = self.output.current_time();
        active.len()
    }

    /// End of the most recently scheduled segment, in output clock seconds.
    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    /// Audio still queued ahead of the clock, in seconds.
    pub fn backlog(&self) -> f64 {
        (self.cursor - self.output.current_time()).max(0.0)
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn is_idle(&self) -> bool {
        self.active.is_empty()
    }

    pub fn is_active(&self, id: SegmentId) -> bool {
        self.active.contains(&id)
    }

    pub fn stats(&self) -> PlaybackStats {
        self.stats
    }

    pub fn output(&self) -> &O {
        &self.output
    }
}
