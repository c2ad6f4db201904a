//! Default configuration constants for sigo-voice.
//!
//! Shared by the config layer, the capture pipeline and the playback side so
//! the two ends of a session agree on formats.

/// Microphone capture sample rate in Hz.
///
/// The remote endpoint expects 16 kHz mono speech input.
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Sample rate of the audio the remote endpoint streams back, in Hz.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24000;

/// Channel count for both capture and playback.
pub const CHANNELS: u16 = 1;

/// Number of samples per captured frame sent to the remote endpoint.
///
/// 4096 samples at 16 kHz is 256 ms of audio per message.
pub const FRAME_SIZE: usize = 4096;

/// Interval at which the session actor reaps finished playback segments.
pub const PLAYBACK_TICK_MS: u64 = 20;

/// Polling interval of the capture thread when the source has no samples.
pub const CAPTURE_POLL_MS: u64 = 10;

/// Default realtime endpoint.
pub const REMOTE_URL: &str = "ws://127.0.0.1:9000/v1/realtime";

/// Default model requested in the session setup message.
pub const REMOTE_MODEL: &str = "native-audio-dialog";

/// Default prebuilt voice for spoken responses.
pub const REMOTE_VOICE: &str = "Puck";

/// Default system instruction for the assistant persona.
pub const SYSTEM_INSTRUCTION: &str = "You are the expert assistant of MICSA SIGO. \
     You help engineers with questions about projects, safety and ISO 9001.";

/// Header carrying the API key on the WebSocket handshake.
pub const API_KEY_HEADER: &str = "x-api-key";
