//! JSON message protocol spoken over the realtime WebSocket.

use crate::audio::frame::{AudioFormat, EncodedChunk};
use crate::audio::pcm;
use crate::config::RemoteConfig;
use crate::error::{Result, SigoError};
use crate::session::transcript::Speaker;
use crate::transport::{ServerEvent, TransportEvent};
use serde::{Deserialize, Serialize};

/// Messages sent by the client to the remote endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Session configuration, sent once right after connecting
    Setup {
        model: String,
        system_instruction: String,
        voice: String,
        response_modalities: Vec<String>,
        input_transcription: bool,
        output_transcription: bool,
    },
    /// One microphone frame, base64 encoded
    Audio { data: String, mime_type: String },
}

impl ClientMessage {
    pub fn setup(config: &RemoteConfig) -> Self {
        ClientMessage::Setup {
            model: config.model.clone(),
            system_instruction: config.system_instruction.clone(),
            voice: config.voice.clone(),
            response_modalities: vec!["AUDIO".to_string()],
            input_transcription: config.input_transcription,
            output_transcription: config.output_transcription,
        }
    }

    pub fn audio(chunk: &EncodedChunk) -> Self {
        ClientMessage::Audio {
            data: pcm::encode_base64(chunk.data()),
            mime_type: chunk.mime_type(),
        }
    }

    /// Serialize message to JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize message from JSON string.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Messages pushed by the remote endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Transcription of user speech or of the model's spoken answer
    Transcript { text: String, speaker: Speaker },
    /// A segment of response audio, base64 encoded
    Audio {
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    /// The user started speaking over the response
    Interrupted,
    TurnComplete,
    /// Endpoint-side failure; the session ends
    Error { message: String },
}

impl ServerMessage {
    /// Serialize message to JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize message from JSON string.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Convert into a transport event. Audio without a MIME type is taken to
    /// be in `default_format`.
    ///
    /// # Errors
    /// `MalformedPayload` when the audio data or its MIME type cannot be decoded.
    pub fn into_event(self, default_format: AudioFormat) -> Result<TransportEvent> {
        let event = match self {
            ServerMessage::Transcript { text, speaker } => {
                TransportEvent::Message(ServerEvent::Transcript { text, speaker })
            }
            ServerMessage::Audio { data, mime_type } => {
                let format = match mime_type {
                    Some(mime) => AudioFormat::from_mime_type(&mime, default_format)?,
                    None => default_format,
                };
                let bytes = pcm::decode_base64(&data)?;
                TransportEvent::Message(ServerEvent::Audio(EncodedChunk::new(bytes, format)))
            }
            ServerMessage::Interrupted => TransportEvent::Message(ServerEvent::Interrupted),
            ServerMessage::TurnComplete => TransportEvent::Message(ServerEvent::TurnComplete),
            ServerMessage::Error { message } => TransportEvent::Error(message),
        };
        Ok(event)
    }
}

/// Parse a text frame from the endpoint.
pub fn parse_server_text(text: &str, default_format: AudioFormat) -> Result<TransportEvent> {
    let message = ServerMessage::from_json(text).map_err(|e| SigoError::TransportProtocol {
        message: format!("unrecognized server message: {}", e),
    })?;
    message.into_event(default_format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_message_carries_remote_config() {
        let config = RemoteConfig::default();
        let json = ClientMessage::setup(&config).to_json().unwrap();

        assert!(json.starts_with(r#"{"type":"setup""#), "Got: {}", json);
        assert!(json.contains(r#""voice":"Puck""#));
        assert!(json.contains(r#""response_modalities":["AUDIO"]"#));
        assert!(json.contains(r#""input_transcription":true"#));
    }

    #[test]
    fn test_audio_message_is_base64_with_mime_type() {
        let chunk = EncodedChunk::new(vec![0x01, 0x00, 0xff, 0xff], AudioFormat::capture());
        let json = ClientMessage::audio(&chunk).to_json().unwrap();
        assert_eq!(
            json,
            r#"{"type":"audio","data":"AQD//w==","mime_type":"audio/pcm;rate=16000"}"#
        );
    }

    #[test]
    fn test_transcript_message_becomes_event() {
        let event = parse_server_text(
            r#"{"type":"transcript","text":"Hola","speaker":"model"}"#,
            AudioFormat::playback(),
        )
        .unwrap();
        assert_eq!(
            event,
            TransportEvent::Message(ServerEvent::Transcript {
                text: "Hola".to_string(),
                speaker: Speaker::Model,
            })
        );
    }

    #[test]
    fn test_audio_without_mime_type_uses_default_format() {
        let event = parse_server_text(
            r#"{"type":"audio","data":"AQD//w=="}"#,
            AudioFormat::playback(),
        )
        .unwrap();
        match event {
            TransportEvent::Message(ServerEvent::Audio(chunk)) => {
                assert_eq!(chunk.format(), AudioFormat::playback());
                assert_eq!(chunk.data(), &[0x01, 0x00, 0xff, 0xff]);
            }
            other => panic!("Expected audio, got {:?}", other),
        }
    }

    #[test]
    fn test_audio_mime_type_overrides_rate() {
        let event = parse_server_text(
            r#"{"type":"audio","data":"AAA=","mime_type":"audio/pcm;rate=16000"}"#,
            AudioFormat::playback(),
        )
        .unwrap();
        match event {
            TransportEvent::Message(ServerEvent::Audio(chunk)) => {
                assert_eq!(chunk.format(), AudioFormat::mono(16000));
            }
            other => panic!("Expected audio, got {:?}", other),
        }
    }

    #[test]
    fn test_control_messages() {
        let format = AudioFormat::playback();
        assert_eq!(
            parse_server_text(r#"{"type":"interrupted"}"#, format).unwrap(),
            TransportEvent::Message(ServerEvent::Interrupted)
        );
        assert_eq!(
            parse_server_text(r#"{"type":"turn_complete"}"#, format).unwrap(),
            TransportEvent::Message(ServerEvent::TurnComplete)
        );
        assert_eq!(
            parse_server_text(r#"{"type":"error","message":"quota"}"#, format).unwrap(),
            TransportEvent::Error("quota".to_string())
        );
    }

    #[test]
    fn test_bad_audio_is_malformed_payload() {
        let result = parse_server_text(
            r#"{"type":"audio","data":"%%%"}"#,
            AudioFormat::playback(),
        );
        assert!(matches!(result, Err(SigoError::MalformedPayload { .. })));

        let result = parse_server_text(
            r#"{"type":"audio","data":"AAA=","mime_type":"audio/opus"}"#,
            AudioFormat::playback(),
        );
        assert!(matches!(result, Err(SigoError::MalformedPayload { .. })));
    }

    #[test]
    fn test_unknown_message_is_protocol_error() {
        for text in [r#"{"type":"setup_complete_v2"}"#, "not json", r#"{"text":"x"}"#] {
            assert!(
                matches!(
                    parse_server_text(text, AudioFormat::playback()),
                    Err(SigoError::TransportProtocol { .. })
                ),
                "should reject {}",
                text
            );
        }
    }
}
