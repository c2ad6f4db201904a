//! WebSocket transport built on tokio-tungstenite.
//!
//! Each connection runs as one task on the given runtime: it connects, sends
//! the setup message, then multiplexes outbound microphone chunks with
//! inbound server messages until either side closes.

use crate::audio::frame::{AudioFormat, EncodedChunk};
use crate::config::RemoteConfig;
use crate::defaults;
use crate::error::{Result, SigoError};
use crate::transport::protocol::{self, ClientMessage};
use crate::transport::{
    RealtimeConnection, RealtimeTransport, ServerEvent, TransportEvent, TransportEvents,
};
use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;

pub struct WebSocketTransport {
    config: RemoteConfig,
    runtime: Handle,
    playback_format: AudioFormat,
}

impl WebSocketTransport {
    pub fn new(config: RemoteConfig, runtime: Handle) -> Self {
        Self {
            config,
            runtime,
            playback_format: AudioFormat::playback(),
        }
    }

    /// Format assumed for response audio that carries no MIME type.
    pub fn with_playback_format(mut self, format: AudioFormat) -> Self {
        self.playback_format = format;
        self
    }

    fn request(&self) -> Result<Request> {
        let connect_error = |message: String| SigoError::TransportConnect {
            endpoint: self.config.url.clone(),
            message,
        };

        let mut request = self
            .config
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| connect_error(e.to_string()))?;

        if let Some(key) = &self.config.api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|_| connect_error("API key is not a valid header value".to_string()))?;
            request
                .headers_mut()
                .insert(defaults::API_KEY_HEADER, value);
        }
        Ok(request)
    }
}

impl RealtimeTransport for WebSocketTransport {
    fn open(&mut self, events: TransportEvents) -> Result<Box<dyn RealtimeConnection>> {
        let request = self.request()?;
        let setup = ClientMessage::setup(&self.config)
            .to_json()
            .map_err(|e| SigoError::TransportProtocol {
                message: e.to_string(),
            })?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tracing::debug!(url = %self.config.url, epoch = events.epoch(), "opening connection");
        self.runtime.spawn(run_connection(
            request,
            setup,
            outbound_rx,
            shutdown_rx,
            events,
            self.playback_format,
        ));

        Ok(Box::new(WebSocketConnection {
            outbound: outbound_tx,
            shutdown: Some(shutdown_tx),
        }))
    }
}

struct WebSocketConnection {
    outbound: mpsc::UnboundedSender<EncodedChunk>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl RealtimeConnection for WebSocketConnection {
    fn outbound(&self) -> mpsc::UnboundedSender<EncodedChunk> {
        self.outbound.clone()
    }

    fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            // The task may already have ended on its own
            shutdown.send(()).ok();
        }
    }
}

impl Drop for WebSocketConnection {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_connection(
    request: Request,
    setup: String,
    mut outbound: mpsc::UnboundedReceiver<EncodedChunk>,
    mut shutdown: oneshot::Receiver<()>,
    events: TransportEvents,
    playback_format: AudioFormat,
) {
    let endpoint = request.uri().to_string();

    let connected = tokio::select! {
        result = tokio_tungstenite::connect_async(request) => result,
        _ = &mut shutdown => {
            tracing::debug!("connection cancelled before it opened");
            return;
        }
    };

    let stream = match connected {
        Ok((stream, _response)) => stream,
        Err(e) => {
            let error = SigoError::TransportConnect {
                endpoint,
                message: e.to_string(),
            };
            events.emit(TransportEvent::Error(error.to_string()));
            return;
        }
    };

    let (mut write, mut read) = stream.split();

    if let Err(e) = write.send(Message::Text(setup)).await {
        events.emit(TransportEvent::Error(format!("Failed to send setup: {}", e)));
        return;
    }
    if !events.emit(TransportEvent::Opened) {
        return;
    }
    tracing::info!(endpoint = %endpoint, "connection open");

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                write.send(Message::Close(None)).await.ok();
                tracing::debug!("connection closed locally");
                break;
            }
            chunk = outbound.recv() => {
                let Some(chunk) = chunk else {
                    write.send(Message::Close(None)).await.ok();
                    break;
                };
                let text = match ClientMessage::audio(&chunk).to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!("failed to encode audio message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = write.send(Message::Text(text)).await {
                    events.emit(TransportEvent::Error(format!("Failed to send audio: {}", e)));
                    break;
                }
            }
            message = read.next() => {
                let event = match message {
                    Some(Ok(Message::Text(text))) => {
                        match protocol::parse_server_text(&text, playback_format) {
                            Ok(event) => event,
                            Err(e) => {
                                tracing::warn!("ignoring server message: {}", e);
                                continue;
                            }
                        }
                    }
                    Some(Ok(Message::Binary(data))) => TransportEvent::Message(
                        ServerEvent::Audio(EncodedChunk::new(data, playback_format)),
                    ),
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| f.reason.to_string())
                            .filter(|reason| !reason.is_empty());
                        events.emit(TransportEvent::Closed { reason });
                        break;
                    }
                    // Ping/pong are answered by tungstenite
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        events.emit(TransportEvent::Error(e.to_string()));
                        break;
                    }
                    None => {
                        events.emit(TransportEvent::Closed { reason: None });
                        break;
                    }
                };
                if !events.emit(event) {
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::controller::SessionEvent;
    use crate::session::transcript::Speaker;
    use crossbeam_channel::{Receiver, unbounded};
    use std::time::{Duration, Instant};
    use tokio::net::TcpListener;

    fn config(url: String) -> RemoteConfig {
        RemoteConfig {
            url,
            ..RemoteConfig::default()
        }
    }

    async fn next_event(rx: &Receiver<SessionEvent>) -> TransportEvent {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Ok(SessionEvent::Transport { event, .. }) = rx.try_recv() {
                return event;
            }
            assert!(Instant::now() < deadline, "timed out waiting for event");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_invalid_url_fails_to_open() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut transport =
            WebSocketTransport::new(config("not a url".to_string()), runtime.handle().clone());
        let (tx, _rx) = unbounded();

        let result = transport.open(TransportEvents::new(1, tx));
        assert!(matches!(result, Err(SigoError::TransportConnect { .. })));
    }

    #[test]
    fn test_request_carries_api_key_header() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mut remote = config("ws://127.0.0.1:1/live".to_string());
        remote.api_key = Some("k-123".to_string());
        let transport = WebSocketTransport::new(remote, runtime.handle().clone());

        let request = transport.request().unwrap();
        assert_eq!(request.headers().get("x-api-key").unwrap(), "k-123");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_refused_connection_reports_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut transport =
            WebSocketTransport::new(config(format!("ws://{}", addr)), Handle::current());
        let (tx, rx) = unbounded();
        let _connection = transport.open(TransportEvents::new(3, tx)).unwrap();

        match next_event(&rx).await {
            TransportEvent::Error(message) => assert!(message.contains("failed")),
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_session_exchange_with_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();

            let setup = ws.next().await.unwrap().unwrap();
            assert!(setup.to_text().unwrap().contains(r#""type":"setup""#));

            ws.send(Message::Text(
                r#"{"type":"transcript","text":"hello","speaker":"user"}"#.to_string(),
            ))
            .await
            .unwrap();
            ws.send(Message::Binary(vec![0, 0, 0, 0])).await.unwrap();

            let audio = ws.next().await.unwrap().unwrap();
            let audio = ClientMessage::from_json(audio.to_text().unwrap()).unwrap();
            ws.close(None).await.ok();
            audio
        });

        let mut transport =
            WebSocketTransport::new(config(format!("ws://{}", addr)), Handle::current());
        let (tx, rx) = unbounded();
        let connection = transport.open(TransportEvents::new(7, tx)).unwrap();

        assert_eq!(next_event(&rx).await, TransportEvent::Opened);
        assert_eq!(
            next_event(&rx).await,
            TransportEvent::Message(ServerEvent::Transcript {
                text: "hello".to_string(),
                speaker: Speaker::User,
            })
        );
        assert_eq!(
            next_event(&rx).await,
            TransportEvent::Message(ServerEvent::Audio(EncodedChunk::new(
                vec![0, 0, 0, 0],
                AudioFormat::playback()
            )))
        );

        connection
            .outbound()
            .send(EncodedChunk::new(vec![1, 0], AudioFormat::capture()))
            .unwrap();

        let received = server.await.unwrap();
        assert_eq!(
            received,
            ClientMessage::Audio {
                data: "AQA=".to_string(),
                mime_type: "audio/pcm;rate=16000".to_string(),
            }
        );
        assert!(matches!(
            next_event(&rx).await,
            TransportEvent::Closed { .. }
        ));
    }
}
