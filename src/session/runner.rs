//! Session actor: runs a [`SessionController`] on its own thread.

use crate::audio::output::AudioOutput;
use crate::defaults;
use crate::error::Result;
use crate::session::controller::{SessionController, SessionEvent, SessionUpdate};
use crossbeam_channel::{Receiver, Sender, select, tick, unbounded};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Handle to a running session actor.
pub struct SessionHandle {
    events: Sender<SessionEvent>,
    updates: Receiver<SessionUpdate>,
    thread: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Move `controller` onto a new thread and start processing its events,
    /// reaping finished playback every `tick_interval`.
    pub fn spawn<O>(controller: SessionController<O>, tick_interval: Duration) -> Result<Self>
    where
        O: AudioOutput + 'static,
    {
        let (updates_tx, updates) = unbounded();
        let mut controller = controller.with_updates(updates_tx);
        let events = controller.sender();
        let inbox = controller.inbox();
        let ticker = tick(tick_interval);

        let thread = thread::Builder::new()
            .name("sigo-session".to_string())
            .spawn(move || {
                loop {
                    select! {
                        recv(inbox) -> event => {
                            let Ok(event) = event else { break };
                            if !controller.handle(event) {
                                break;
                            }
                        }
                        recv(ticker) -> _ => controller.tick(),
                    }
                }
                tracing::debug!("session actor exited");
            })?;

        Ok(Self {
            events,
            updates,
            thread: Some(thread),
        })
    }

    /// Same as [`SessionHandle::spawn`] with the default tick interval.
    pub fn spawn_default<O>(controller: SessionController<O>) -> Result<Self>
    where
        O: AudioOutput + 'static,
    {
        Self::spawn(
            controller,
            Duration::from_millis(defaults::PLAYBACK_TICK_MS),
        )
    }

    pub fn start(&self) {
        self.send(SessionEvent::Start);
    }

    pub fn stop(&self) {
        self.send(SessionEvent::Stop);
    }

    /// Sender into the actor's inbox, for wiring other producers.
    pub fn sender(&self) -> Sender<SessionEvent> {
        self.events.clone()
    }

    /// Stream of state changes, transcript lines and interruptions.
    pub fn updates(&self) -> Receiver<SessionUpdate> {
        self.updates.clone()
    }

    /// Stop the session and wait for the actor thread to exit.
    ///
    /// Returns the panic message if the actor panicked.
    pub fn shutdown(mut self) -> Option<String> {
        self.join()
    }

    fn send(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            tracing::warn!("session actor is gone");
        }
    }

    fn join(&mut self) -> Option<String> {
        let thread = self.thread.take()?;
        self.events.send(SessionEvent::Shutdown).ok();
        match thread.join() {
            Ok(()) => None,
            Err(panic_info) => {
                let msg = panic_info
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                    .unwrap_or("unknown panic")
                    .to_string();
                tracing::error!("session thread panicked: {}", msg);
                Some(msg)
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::output::MockAudioOutput;
    use crate::audio::recorder::MockAudioSource;
    use crate::session::state::SessionState;
    use crate::transport::{MockTransport, TransportEvent};

    fn wait_for_state(updates: &Receiver<SessionUpdate>, wanted: &SessionState) -> bool {
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while let Some(remaining) = deadline.checked_duration_since(std::time::Instant::now()) {
            match updates.recv_timeout(remaining) {
                Ok(SessionUpdate::State(state)) if &state == wanted => return true,
                Ok(_) => continue,
                Err(_) => return false,
            }
        }
        false
    }

    #[test]
    fn test_actor_runs_session_lifecycle() {
        let transport = MockTransport::new().with_auto_open();
        let source = MockAudioSource::new();
        let controller = SessionController::new(
            Box::new(source.clone()),
            Box::new(transport.clone()),
            MockAudioOutput::new(),
        );
        let handle = SessionHandle::spawn(controller, Duration::from_millis(5)).unwrap();
        let updates = handle.updates();

        handle.start();
        assert!(wait_for_state(&updates, &SessionState::Active));
        assert!(source.is_started());

        handle.stop();
        assert!(wait_for_state(&updates, &SessionState::Idle));
        assert_eq!(transport.close_calls(), 1);

        assert_eq!(handle.shutdown(), None);
    }

    #[test]
    fn test_actor_ticks_reap_finished_playback() {
        let transport = MockTransport::new().with_auto_open();
        let output = MockAudioOutput::new();
        let controller = SessionController::new(
            Box::new(MockAudioSource::new()),
            Box::new(transport.clone()),
            output.clone(),
        );
        let handle = SessionHandle::spawn(controller, Duration::from_millis(5)).unwrap();
        let updates = handle.updates();
        handle.start();
        assert!(wait_for_state(&updates, &SessionState::Active));

        let chunk = crate::audio::frame::EncodedChunk::new(
            vec![0; 2400],
            crate::audio::frame::AudioFormat::playback(),
        );
        transport.emit(TransportEvent::Message(
            crate::transport::ServerEvent::Audio(chunk),
        ));

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while output.scheduled().is_empty() {
            assert!(std::time::Instant::now() < deadline);
            thread::sleep(Duration::from_millis(2));
        }
        output.advance(1.0);

        // Once reaped, stopping the session stops nothing
        thread::sleep(Duration::from_millis(50));
        handle.stop();
        assert!(wait_for_state(&updates, &SessionState::Idle));
        assert!(output.stopped().is_empty());
        handle.shutdown();
    }

    #[test]
    fn test_shutdown_releases_live_session() {
        let transport = MockTransport::new();
        let source = MockAudioSource::new();
        let controller = SessionController::new(
            Box::new(source.clone()),
            Box::new(transport.clone()),
            MockAudioOutput::new(),
        );
        let handle = SessionHandle::spawn_default(controller).unwrap();
        let updates = handle.updates();
        handle.start();
        assert!(wait_for_state(&updates, &SessionState::Connecting));

        assert_eq!(handle.shutdown(), None);
        assert!(!source.is_started());
        assert_eq!(transport.close_calls(), 1);
    }
}
