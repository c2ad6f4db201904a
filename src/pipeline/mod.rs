//! Audio pipelines around a live session.
//!
//! Capture runs on its own thread and feeds the outbound channel; playback
//! scheduling is driven by the session actor that owns it.

pub mod capture;
pub mod error;
pub mod playback;

pub use capture::{CaptureConfig, CaptureFailureHandler, CaptureHandle, CapturePipeline};
pub use error::{CollectingReporter, ErrorReporter, LogReporter, StationError};
pub use playback::{PlaybackScheduler, PlaybackStats, ScheduledSegment};
