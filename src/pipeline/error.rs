//! Error classification and reporting for session components.

use std::fmt;
use std::sync::Mutex;

/// Errors a component reports without necessarily returning them.
#[derive(Debug, Clone, PartialEq)]
pub enum StationError {
    /// The component dropped one unit of work and keeps running.
    Recoverable(String),
    /// The component cannot continue; the session has to end.
    Fatal(String),
}

impl StationError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StationError::Fatal(_))
    }
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationError::Recoverable(msg) => write!(f, "Recoverable error: {}", msg),
            StationError::Fatal(msg) => write!(f, "Fatal error: {}", msg),
        }
    }
}

impl std::error::Error for StationError {}

/// Trait for reporting component errors.
pub trait ErrorReporter: Send + Sync {
    /// Reports an error from a component such as "capture" or "playback".
    fn report(&self, station: &str, error: &StationError);
}

/// Reporter that writes to the `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, station: &str, error: &StationError) {
        match error {
            StationError::Recoverable(msg) => tracing::warn!(station = %station, "{}", msg),
            StationError::Fatal(msg) => tracing::error!(station = %station, "{}", msg),
        }
    }
}

/// Reporter that keeps every report, for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingReporter {
    reports: Mutex<Vec<(String, StationError)>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<(String, StationError)> {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn count_for(&self, station: &str) -> usize {
        self.reports()
            .iter()
            .filter(|(name, _)| name == station)
            .count()
    }
}

impl ErrorReporter for CollectingReporter {
    fn report(&self, station: &str, error: &StationError) {
        self.reports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((station.to_string(), error.clone()));
    }
}
