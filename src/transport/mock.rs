use crate::audio::frame::EncodedChunk;
use crate::error::{Result, SigoError};
use crate::transport::{RealtimeConnection, RealtimeTransport, TransportEvent, TransportEvents};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Debug, Default)]
struct MockTransportState {
    open_calls: usize,
    close_calls: usize,
    events: Option<TransportEvents>,
    outbound: Vec<mpsc::UnboundedReceiver<EncodedChunk>>,
    sent: Vec<EncodedChunk>,
}

/// Mock transport for testing.
///
/// Clones share state: a test keeps one clone to play the remote side
/// (emitting events, inspecting sent audio) after handing another to the
/// session.
#[derive(Debug, Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
    should_fail_open: bool,
    auto_open: bool,
}

impl MockTransport {
    /// A transport whose connections stay in the connecting phase until the
    /// test emits [`TransportEvent::Opened`].
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockTransportState::default())),
            should_fail_open: false,
            auto_open: false,
        }
    }

    /// Emit `Opened` as soon as a connection is requested.
    pub fn with_auto_open(mut self) -> Self {
        self.auto_open = true;
        self
    }

    /// Refuse to open connections.
    pub fn with_open_failure(mut self) -> Self {
        self.should_fail_open = true;
        self
    }

    pub fn open_calls(&self) -> usize {
        self.lock().open_calls
    }

    pub fn close_calls(&self) -> usize {
        self.lock().close_calls
    }

    /// Epoch of the most recent connection.
    pub fn current_epoch(&self) -> Option<u64> {
        self.lock().events.as_ref().map(TransportEvents::epoch)
    }

    /// Emit an event on the most recent connection, as the remote side would.
    ///
    /// Returns false if no connection was ever opened or the session is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let events = self.lock().events.clone();
        events.is_some_and(|events| events.emit(event))
    }

    /// All chunks the session has sent so far, across connections, in order.
    pub fn sent_chunks(&self) -> Vec<EncodedChunk> {
        let mut state = self.lock();
        let MockTransportState { outbound, sent, .. } = &mut *state;
        for rx in outbound.iter_mut() {
            while let Ok(chunk) = rx.try_recv() {
                sent.push(chunk);
            }
        }
        sent.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RealtimeTransport for MockTransport {
    fn open(&mut self, events: TransportEvents) -> Result<Box<dyn RealtimeConnection>> {
        let mut state = self.lock();
        state.open_calls += 1;
        if self.should_fail_open {
            return Err(SigoError::TransportConnect {
                endpoint: "mock".to_string(),
                message: "mock transport refused connection".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.outbound.push(rx);
        state.events = Some(events.clone());
        drop(state);

        if self.auto_open {
            events.emit(TransportEvent::Opened);
        }

        Ok(Box::new(MockConnection {
            outbound: tx,
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct MockConnection {
    outbound: mpsc::UnboundedSender<EncodedChunk>,
    state: Arc<Mutex<MockTransportState>>,
    closed: bool,
}

impl RealtimeConnection for MockConnection {
    fn outbound(&self) -> mpsc::UnboundedSender<EncodedChunk> {
        self.outbound.clone()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .close_calls += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::frame::AudioFormat;
    use crate::session::controller::SessionEvent;
    use crossbeam_channel::unbounded;

    #[test]
    fn test_mock_transport_records_opens_and_closes() {
        let mut transport = MockTransport::new();
        let observer = transport.clone();
        let (tx, _rx) = unbounded();

        let mut connection = transport.open(TransportEvents::new(1, tx)).unwrap();
        connection.close();
        connection.close();

        assert_eq!(observer.open_calls(), 1);
        assert_eq!(observer.close_calls(), 1);
        assert_eq!(observer.current_epoch(), Some(1));
    }

    #[test]
    fn test_mock_transport_auto_open_and_emit() {
        let mut transport = MockTransport::new().with_auto_open();
        let (tx, rx) = unbounded();
        let _connection = transport.open(TransportEvents::new(4, tx)).unwrap();

        assert!(transport.emit(TransportEvent::Closed { reason: None }));

        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            &events[0],
            SessionEvent::Transport { epoch: 4, event: TransportEvent::Opened }
        ));
    }

    #[test]
    fn test_mock_transport_collects_sent_chunks() {
        let mut transport = MockTransport::new();
        let (tx, _rx) = unbounded();
        let connection = transport.open(TransportEvents::new(1, tx)).unwrap();

        let chunk = EncodedChunk::new(vec![1, 0], AudioFormat::capture());
        connection.outbound().send(chunk.clone()).unwrap();

        assert_eq!(transport.sent_chunks(), vec![chunk]);
    }

    #[test]
    fn test_mock_transport_open_failure() {
        let mut transport = MockTransport::new().with_open_failure();
        let (tx, _rx) = unbounded();
        assert!(transport.open(TransportEvents::new(1, tx)).is_err());
        assert!(!transport.emit(TransportEvent::Opened));
    }
}
