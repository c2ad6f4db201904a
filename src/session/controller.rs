//! Session state machine.
//!
//! The controller owns every resource of a voice session: the microphone,
//! the remote connection, the capture thread and the playback scheduler. It
//! is driven by [`SessionEvent`]s and never shares its state; the capture
//! thread and the transport talk to it only through its event inbox.

use crate::audio::output::AudioOutput;
use crate::audio::recorder::AudioSource;
use crate::error::{Result, SigoError};
use crate::pipeline::capture::{CaptureConfig, CaptureHandle, CapturePipeline};
use crate::pipeline::error::{ErrorReporter, LogReporter, StationError};
use crate::pipeline::playback::PlaybackScheduler;
use crate::session::state::SessionState;
use crate::session::transcript::{Transcript, TranscriptEntry};
use crate::transport::{
    RealtimeConnection, RealtimeTransport, ServerEvent, TransportEvent, TransportEvents,
};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;

const STATION: &str = "session";

/// Inputs of the state machine.
#[derive(Debug)]
pub enum SessionEvent {
    Start,
    Stop,
    /// Something happened on the connection opened in `epoch`.
    Transport { epoch: u64, event: TransportEvent },
    /// The capture thread of `epoch` lost the microphone.
    CaptureFailed { epoch: u64, message: String },
    /// Periodic housekeeping: reap finished playback.
    Tick,
    Shutdown,
}

/// Notifications for whoever presents the session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    State(SessionState),
    Transcript(TranscriptEntry),
    /// Response audio was cut off; `stopped` segments were discarded.
    Interrupted { stopped: usize },
    TurnComplete,
}

pub struct SessionController<O: AudioOutput> {
    state: SessionState,
    epoch: u64,
    source: Option<Box<dyn AudioSource>>,
    mic_started: bool,
    transport: Box<dyn RealtimeTransport>,
    connection: Option<Box<dyn RealtimeConnection>>,
    capture: Option<CaptureHandle>,
    capture_config: CaptureConfig,
    scheduler: PlaybackScheduler<O>,
    transcript: Transcript,
    last_error: Option<String>,
    events_tx: Sender<SessionEvent>,
    events_rx: Receiver<SessionEvent>,
    updates: Option<Sender<SessionUpdate>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl<O: AudioOutput> SessionController<O> {
    pub fn new(
        source: Box<dyn AudioSource>,
        transport: Box<dyn RealtimeTransport>,
        output: O,
    ) -> Self {
        let (events_tx, events_rx) = unbounded();
        Self {
            state: SessionState::Idle,
            epoch: 0,
            source: Some(source),
            mic_started: false,
            transport,
            connection: None,
            capture: None,
            capture_config: CaptureConfig::default(),
            scheduler: PlaybackScheduler::new(output),
            transcript: Transcript::new(),
            last_error: None,
            events_tx,
            events_rx,
            updates: None,
            reporter: Arc::new(LogReporter),
        }
    }

    pub fn with_updates(mut self, updates: Sender<SessionUpdate>) -> Self {
        self.updates = Some(updates);
        self
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_capture_config(mut self, config: CaptureConfig) -> Self {
        self.capture_config = config;
        self
    }

    /// Sender feeding this controller's inbox.
    pub fn sender(&self) -> Sender<SessionEvent> {
        self.events_tx.clone()
    }

    pub(crate) fn inbox(&self) -> Receiver<SessionEvent> {
        self.events_rx.clone()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Message of the most recent failure, kept after the session re-arms.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn scheduler(&self) -> &PlaybackScheduler<O> {
        &self.scheduler
    }

    pub fn is_capturing(&self) -> bool {
        self.capture.as_ref().is_some_and(CaptureHandle::is_running)
    }

    /// Begin a session: acquire the microphone and start connecting.
    ///
    /// # Errors
    /// `InvalidState` unless the session is idle; nothing changes in that
    /// case. A refused microphone or a connection that cannot be attempted
    /// fails the session (it ends back in `Idle` with `last_error` set) and
    /// the cause is returned.
    pub fn start(&mut self) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(SigoError::InvalidState {
                operation: "start",
                state: self.state.name(),
            });
        }

        self.epoch += 1;
        self.last_error = None;
        self.set_state(SessionState::Connecting);

        let started = match self.source.as_mut() {
            Some(source) => source.start(),
            None => Err(SigoError::AudioCapture {
                message: "microphone was lost by a previous session".to_string(),
            }),
        };
        if let Err(e) = started {
            self.fail(&e.to_string());
            return Err(e);
        }
        self.mic_started = true;

        let events = TransportEvents::new(self.epoch, self.events_tx.clone());
        match self.transport.open(events) {
            Ok(connection) => {
                self.connection = Some(connection);
                Ok(())
            }
            Err(e) => {
                self.fail(&e.to_string());
                Err(e)
            }
        }
    }

    /// End the session. Safe in every state.
    pub fn stop(&mut self) {
        match self.state {
            SessionState::Idle => {}
            SessionState::Closed => self.set_state(SessionState::Idle),
            SessionState::Connecting | SessionState::Active | SessionState::Error(_) => {
                self.release();
                self.set_state(SessionState::Closed);
                self.set_state(SessionState::Idle);
            }
        }
    }

    /// Process one event. Returns false when the controller should shut down.
    pub fn handle(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Start => {
                if let Err(e) = self.start() {
                    tracing::warn!("start rejected: {}", e);
                }
            }
            SessionEvent::Stop => self.stop(),
            SessionEvent::Transport { epoch, event } => self.on_transport(epoch, event),
            SessionEvent::CaptureFailed { epoch, message } => {
                if epoch == self.epoch && self.state == SessionState::Active {
                    self.fail(&message);
                }
            }
            SessionEvent::Tick => self.tick(),
            SessionEvent::Shutdown => {
                self.stop();
                return false;
            }
        }
        true
    }

    /// Handle everything already waiting in the inbox. Returns false if a
    /// shutdown was among them.
    pub fn process_pending(&mut self) -> bool {
        while let Ok(event) = self.events_rx.try_recv() {
            if !self.handle(event) {
                return false;
            }
        }
        true
    }

    /// Reap playback that has finished on its own.
    pub fn tick(&mut self) {
        self.scheduler.reap_finished();
    }

    fn on_transport(&mut self, epoch: u64, event: TransportEvent) {
        if epoch != self.epoch || !self.state.is_live() {
            tracing::trace!(epoch, current = self.epoch, "ignoring stale transport event");
            return;
        }

        match event {
            TransportEvent::Opened => {
                if self.state == SessionState::Connecting {
                    self.set_state(SessionState::Active);
                    if let Err(e) = self.begin_capture() {
                        self.fail(&e.to_string());
                    }
                }
            }
            TransportEvent::Message(message) => {
                if self.state == SessionState::Active {
                    self.on_server_event(message);
                }
            }
            TransportEvent::Error(message) => self.fail(&message),
            TransportEvent::Closed { reason } => {
                let error = SigoError::TransportClosed {
                    message: reason.unwrap_or_else(|| "no reason given".to_string()),
                };
                self.fail(&error.to_string());
            }
        }
    }

    fn on_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Transcript { text, speaker } => {
                if let Some(entry) = self.transcript.push(speaker, &text) {
                    let entry = entry.clone();
                    self.notify(SessionUpdate::Transcript(entry));
                }
            }
            ServerEvent::Audio(chunk) => {
                self.scheduler.reap_finished();
                if let Err(e) = self.scheduler.on_chunk_received(chunk) {
                    self.reporter
                        .report("playback", &StationError::Recoverable(e.to_string()));
                }
            }
            ServerEvent::Interrupted => {
                let stopped = self.scheduler.on_interrupted();
                self.notify(SessionUpdate::Interrupted { stopped });
            }
            ServerEvent::TurnComplete => self.notify(SessionUpdate::TurnComplete),
        }
    }

    fn begin_capture(&mut self) -> Result<()> {
        let outbound = match &self.connection {
            Some(connection) => connection.outbound(),
            None => {
                return Err(SigoError::Other(
                    "connection opened without a handle".to_string(),
                ));
            }
        };
        let mut source = self.source.take().ok_or_else(|| SigoError::AudioCapture {
            message: "microphone is not available".to_string(),
        })?;

        // Audio heard while connecting is stale by now
        match source.discard_pending() {
            Ok(0) => {}
            Ok(discarded) => {
                tracing::debug!(discarded, "dropped audio captured before the session opened");
            }
            Err(e) => {
                // Keep the source so the error path can stop it
                self.source = Some(source);
                return Err(e);
            }
        }

        let events = self.events_tx.clone();
        let epoch = self.epoch;
        let handle = CapturePipeline::new(source, self.capture_config)
            .with_error_reporter(Arc::clone(&self.reporter))
            .start(
                outbound,
                Box::new(move |e: SigoError| {
                    events
                        .send(SessionEvent::CaptureFailed {
                            epoch,
                            message: e.to_string(),
                        })
                        .ok();
                }),
            )?;
        self.capture = Some(handle);
        Ok(())
    }

    /// Error path: record, release, and re-arm.
    fn fail(&mut self, message: &str) {
        if !self.state.is_live() {
            return;
        }
        self.reporter
            .report(STATION, &StationError::Fatal(message.to_string()));
        self.last_error = Some(message.to_string());
        self.set_state(SessionState::Error(message.to_string()));
        self.release();
        self.set_state(SessionState::Closed);
        self.set_state(SessionState::Idle);
    }

    /// Give back the microphone, close the connection and silence playback.
    fn release(&mut self) {
        if let Some(capture) = self.capture.take() {
            // The capture thread stops the source before handing it back
            if let Some(source) = capture.stop() {
                self.source = Some(source);
            }
        } else if self.mic_started
            && let Some(source) = self.source.as_mut()
            && let Err(e) = source.stop()
        {
            self.reporter
                .report("capture", &StationError::Recoverable(e.to_string()));
        }
        self.mic_started = false;

        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }

        let stopped = self.scheduler.stop_all();
        tracing::debug!(epoch = self.epoch, stopped, "session resources released");
    }

    fn set_state(&mut self, next: SessionState) {
        if !self.state.can_transition_to(&next) {
            tracing::warn!(from = %self.state, to = %next, "unexpected session transition");
        }
        tracing::debug!(from = %self.state, to = %next, "session state");
        self.state = next.clone();
        self.notify(SessionUpdate::State(next));
    }

    fn notify(&self, update: SessionUpdate) {
        if let Some(updates) = &self.updates {
            updates.send(update).ok();
        }
    }
}

impl<O: AudioOutput> Drop for SessionController<O> {
    fn drop(&mut self) {
        if self.state.is_live() {
            self.release();
        }
    }
}
