//! Error types for sigo-voice.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SigoError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio device errors
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Microphone access denied: {message}")]
    AudioPermissionDenied { message: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Audio playback failed: {message}")]
    AudioPlayback { message: String },

    // Codec errors
    #[error("Malformed audio payload: {message}")]
    MalformedPayload { message: String },

    // Remote endpoint errors
    #[error("Connection to {endpoint} failed: {message}")]
    TransportConnect { endpoint: String, message: String },

    #[error("Realtime protocol error: {message}")]
    TransportProtocol { message: String },

    #[error("Connection closed: {message}")]
    TransportClosed { message: String },

    // Session lifecycle errors
    #[error("Cannot {operation} while session is {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl SigoError {
    /// Shorthand for a [`SigoError::MalformedPayload`].
    pub fn malformed(message: impl Into<String>) -> Self {
        SigoError::MalformedPayload {
            message: message.into(),
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, SigoError>;
