//! Connection to the remote realtime voice endpoint.
//!
//! A [`RealtimeTransport`] opens connections; each [`RealtimeConnection`]
//! accepts outbound audio on a channel and reports everything that happens on
//! the wire as [`TransportEvent`]s tagged with the session epoch that opened it.

pub mod mock;
pub mod protocol;
pub mod websocket;

use crate::audio::frame::EncodedChunk;
use crate::error::Result;
use crate::session::controller::SessionEvent;
use crate::session::transcript::Speaker;
use crossbeam_channel::Sender;
use tokio::sync::mpsc::UnboundedSender;

pub use mock::MockTransport;
pub use protocol::{ClientMessage, ServerMessage};
pub use websocket::WebSocketTransport;

/// Content pushed by the remote endpoint during a session.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Transcript { text: String, speaker: Speaker },
    Audio(EncodedChunk),
    /// The user barged in; queued response audio must be discarded.
    Interrupted,
    TurnComplete,
}

/// Lifecycle and content events of one connection.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Opened,
    Message(ServerEvent),
    Error(String),
    Closed { reason: Option<String> },
}

/// Sink a connection reports into.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    epoch: u64,
    tx: Sender<SessionEvent>,
}

impl TransportEvents {
    pub fn new(epoch: u64, tx: Sender<SessionEvent>) -> Self {
        Self { epoch, tx }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Forward an event to the session. Returns false once the session is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(SessionEvent::Transport {
                epoch: self.epoch,
                event,
            })
            .is_ok()
    }
}

/// Factory for connections to the remote endpoint.
pub trait RealtimeTransport: Send {
    /// Begin connecting. Returns immediately; `Opened` (or `Error`) arrives
    /// later through `events`.
    ///
    /// # Errors
    /// Fails only when the connection cannot even be attempted, e.g. an
    /// unusable endpoint address.
    fn open(&mut self, events: TransportEvents) -> Result<Box<dyn RealtimeConnection>>;
}

/// One open (or opening) connection.
pub trait RealtimeConnection: Send {
    /// Channel for outbound microphone chunks. Sends never block.
    fn outbound(&self) -> UnboundedSender<EncodedChunk>;

    /// Close the connection. Safe to call more than once.
    fn close(&mut self);
}
