//! Voice session lifecycle.
//!
//! [`SessionController`] is the state machine; [`SessionHandle`] runs one on
//! a dedicated actor thread so the capture thread, the transport and the UI
//! only ever talk to it through messages.

pub mod controller;
pub mod runner;
pub mod state;
pub mod transcript;

pub use controller::{SessionController, SessionEvent, SessionUpdate};
pub use runner::SessionHandle;
pub use state::SessionState;
pub use transcript::{Speaker, Transcript, TranscriptEntry};
