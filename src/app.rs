//! Voice assistant application entry point.
//!
//! Wires the real devices and the WebSocket transport into a session actor
//! and presents its updates on the terminal:
//! microphone → remote endpoint → speaker

use crate::audio::capture::{CpalAudioSource, suppress_audio_warnings};
use crate::audio::frame::AudioFormat;
use crate::audio::recorder::AudioSource;
use crate::audio::speaker::CpalAudioOutput;
use crate::audio::wav::WavAudioSource;
use crate::config::Config;
use crate::error::{Result, SigoError};
use crate::session::{SessionController, SessionHandle, SessionState, SessionUpdate};
use crate::transport::WebSocketTransport;
use crossbeam_channel::Receiver;
use std::path::PathBuf;
use tokio::runtime::Handle;

/// Command-line overrides for a session.
#[derive(Debug, Default, Clone)]
pub struct RunOptions {
    pub device: Option<String>,
    pub input: Option<PathBuf>,
    pub url: Option<String>,
    pub quiet: bool,
}

/// Run one voice session until Ctrl-C or until the session ends on its own.
///
/// Must be called from within a tokio runtime; the transport runs there.
///
/// # Returns
/// Ok(()) when the user ends the session, or the error that ended it.
pub async fn run_session_command(mut config: Config, options: RunOptions) -> Result<()> {
    // Suppress noisy JACK/ALSA warnings before audio init
    suppress_audio_warnings();

    if let Some(device) = options.device {
        config.audio.device = Some(device);
    }
    if let Some(url) = options.url {
        config.remote.url = url;
    }
    config.validate()?;

    let source: Box<dyn AudioSource> = match &options.input {
        Some(path) => Box::new(WavAudioSource::from_path(path)?.with_realtime(true)),
        None => Box::new(
            CpalAudioSource::new(config.audio.device.as_deref())
                .with_sample_rate(config.audio.sample_rate),
        ),
    };
    let mut capture = config.audio.capture_config();
    capture.format = AudioFormat::mono(source.sample_rate());

    let output = CpalAudioOutput::new(config.playback.device.as_deref())?;
    let transport = WebSocketTransport::new(config.remote.clone(), Handle::current())
        .with_playback_format(config.playback.format());

    let controller = SessionController::new(source, Box::new(transport), output)
        .with_capture_config(capture);
    let session = SessionHandle::spawn(controller, config.playback.tick())?;

    let updates = session.updates();
    let quiet = options.quiet;
    let mut printer = tokio::task::spawn_blocking(move || present_updates(updates, quiet));

    if !quiet {
        eprintln!("Connecting to {}", config.remote.url);
    }
    session.start();

    let finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::debug!("interrupt received, ending session");
            None
        }
        finished = &mut printer => Some(finished.ok().flatten()),
    };

    if let Some(message) = session.shutdown() {
        tracing::error!("session actor panicked: {}", message);
    }

    let failure = match finished {
        Some(failure) => failure,
        None => {
            // Updates disconnect once the actor is gone
            printer.await.ok();
            None
        }
    };

    match failure {
        Some(message) => Err(SigoError::Other(message)),
        None => Ok(()),
    }
}

/// Print status changes and transcript lines until the session returns to
/// idle. Returns the error message if the session ended by failing.
fn present_updates(updates: Receiver<SessionUpdate>, quiet: bool) -> Option<String> {
    let mut was_live = false;
    let mut failure = None;

    for update in updates.iter() {
        match update {
            SessionUpdate::State(state) => {
                if !quiet {
                    eprintln!("[{}]", state.status_text());
                }
                match state {
                    SessionState::Error(message) => failure = Some(message),
                    SessionState::Idle if was_live => return failure,
                    ref live if live.is_live() => was_live = true,
                    _ => {}
                }
            }
            SessionUpdate::Transcript(entry) => println!("{}", entry),
            SessionUpdate::Interrupted { stopped } => {
                tracing::debug!(stopped, "response interrupted");
            }
            SessionUpdate::TurnComplete => {}
        }
    }
    failure
}
