//! Wire protocol for the Saathi assistant service
//!
//! The server pushes newline-delimited JSON events down a streaming HTTP
//! response and accepts `{mime_type, data}` bodies on the send path. This
//! module maps those wire shapes onto closed enums and defines the client
//! error taxonomy.

use crate::codec;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_AUDIO: &str = "audio/pcm";

/// Error type for client operations
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("send failed: {0}")]
    Transmission(String),

    #[error("malformed transport payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("event stream error: {0}")]
    Stream(String),

    #[error("upload failed: {0}")]
    Upload(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// Configuration for the client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the assistant service, no trailing slash.
    pub base_url: String,
    /// Whether an `interrupted` event also seals the open turn. The server
    /// contract is ambiguous here; off matches the observed behavior of
    /// keeping the turn open so trailing fragments land in the same bubble.
    pub seal_turn_on_interrupt: bool,
    /// Fixed delay before the single reopen attempt after a stream failure.
    pub reconnect_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            seal_turn_on_interrupt: false,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

/// One event from the server push stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Application-level failure reported in-stream.
    Error {
        message: String,
        suggestion: Option<String>,
    },
    /// The assistant finished its current turn.
    TurnComplete,
    /// The assistant was cut off; queued playback must stop.
    Interrupted,
    /// A slice of assistant speech, already decoded from its transport unit.
    AudioChunk(Vec<u8>),
    /// A streaming text fragment of the assistant's reply.
    TextChunk(String),
}

/// Raw event shape as the server writes it. Dispatch is by field presence,
/// checked in the same order the server documents.
#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(default)]
    error: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    suggestion: Option<String>,
    #[serde(default)]
    turn_complete: Option<bool>,
    #[serde(default)]
    interrupted: Option<bool>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    data: Option<String>,
}

impl ServerEvent {
    /// Map one wire event to its variant. An unrecognized shape is an
    /// error, never a silent skip.
    pub fn from_wire(raw: &str) -> Result<Self> {
        let wire: WireEvent = serde_json::from_str(raw)
            .map_err(|e| ClientError::Stream(format!("bad event json: {e}")))?;

        if wire.error == Some(true) {
            return Ok(Self::Error {
                message: wire
                    .message
                    .unwrap_or_else(|| "connection error".to_string()),
                suggestion: wire.suggestion,
            });
        }
        if wire.turn_complete == Some(true) {
            return Ok(Self::TurnComplete);
        }
        if wire.interrupted == Some(true) {
            return Ok(Self::Interrupted);
        }
        match wire.mime_type.as_deref() {
            Some(MIME_AUDIO) => {
                let data = wire
                    .data
                    .ok_or_else(|| ClientError::Stream("audio event without data".to_string()))?;
                Ok(Self::AudioChunk(codec::decode_transport_unit(&data)?))
            }
            Some(MIME_TEXT) => Ok(Self::TextChunk(wire.data.unwrap_or_default())),
            Some(other) => Err(ClientError::Stream(format!(
                "unsupported mime type: {other}"
            ))),
            None => Err(ClientError::Stream(format!(
                "unrecognized event shape: {raw}"
            ))),
        }
    }
}

/// Extract the JSON payload from one raw stream line. The server frames
/// events SSE-style (`data: {...}`); bare JSON lines are accepted as well.
/// Blank keep-alive lines yield `None`.
pub fn payload_of_line(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(
        trimmed
            .strip_prefix("data:")
            .map(str::trim_start)
            .unwrap_or(trimmed),
    )
}

/// Payload for the outbound send path.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundPayload {
    Text(String),
    Audio(Vec<u8>),
}

impl OutboundPayload {
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Text(_) => MIME_TEXT,
            Self::Audio(_) => MIME_AUDIO,
        }
    }

    /// JSON body for the send endpoint; audio is base64-packaged.
    pub fn to_wire(&self) -> serde_json::Value {
        match self {
            Self::Text(text) => json!({ "mime_type": MIME_TEXT, "data": text }),
            Self::Audio(pcm) => json!({
                "mime_type": MIME_AUDIO,
                "data": codec::encode_transport_unit(pcm),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_event_mapping() {
        let ev = ServerEvent::from_wire(
            r#"{"error": true, "message": "agent failed", "suggestion": "check the API key"}"#,
        )
        .unwrap();
        assert_eq!(
            ev,
            ServerEvent::Error {
                message: "agent failed".to_string(),
                suggestion: Some("check the API key".to_string()),
            }
        );

        // message and suggestion are both optional on the wire
        let ev = ServerEvent::from_wire(r#"{"error": true}"#).unwrap();
        assert_eq!(
            ev,
            ServerEvent::Error {
                message: "connection error".to_string(),
                suggestion: None,
            }
        );
    }

    #[test]
    fn test_control_event_mapping() {
        let ev =
            ServerEvent::from_wire(r#"{"turn_complete": true, "interrupted": false}"#).unwrap();
        assert_eq!(ev, ServerEvent::TurnComplete);

        let ev =
            ServerEvent::from_wire(r#"{"turn_complete": false, "interrupted": true}"#).unwrap();
        assert_eq!(ev, ServerEvent::Interrupted);
    }

    #[test]
    fn test_media_event_mapping() {
        let ev = ServerEvent::from_wire(r#"{"mime_type": "text/plain", "data": "Namaste"}"#)
            .unwrap();
        assert_eq!(ev, ServerEvent::TextChunk("Namaste".to_string()));

        let unit = codec::encode_transport_unit(&[1, 2, 3, 4]);
        let raw = format!(r#"{{"mime_type": "audio/pcm", "data": "{unit}"}}"#);
        let ev = ServerEvent::from_wire(&raw).unwrap();
        assert_eq!(ev, ServerEvent::AudioChunk(vec![1, 2, 3, 4]));
    }

    #[test]
    fn test_unrecognized_shapes_fail() {
        assert!(matches!(
            ServerEvent::from_wire(r#"{"something": "else"}"#),
            Err(ClientError::Stream(_))
        ));
        assert!(matches!(
            ServerEvent::from_wire(r#"{"mime_type": "video/mp4", "data": ""}"#),
            Err(ClientError::Stream(_))
        ));
        assert!(matches!(
            ServerEvent::from_wire("not json"),
            Err(ClientError::Stream(_))
        ));
        // audio with malformed base64 is a decode failure, not a skip
        assert!(matches!(
            ServerEvent::from_wire(r#"{"mime_type": "audio/pcm", "data": "!!"}"#),
            Err(ClientError::Decode(_))
        ));
    }

    #[test]
    fn test_payload_of_line() {
        assert_eq!(payload_of_line(""), None);
        assert_eq!(payload_of_line("   "), None);
        assert_eq!(payload_of_line(r#"{"x":1}"#), Some(r#"{"x":1}"#));
        assert_eq!(payload_of_line("data: {\"x\":1}\r"), Some(r#"{"x":1}"#));
    }

    #[test]
    fn test_outbound_wire_shapes() {
        let wire = OutboundPayload::Text("hello".to_string()).to_wire();
        assert_eq!(wire["mime_type"], "text/plain");
        assert_eq!(wire["data"], "hello");

        let wire = OutboundPayload::Audio(vec![0xAB, 0xCD]).to_wire();
        assert_eq!(wire["mime_type"], "audio/pcm");
        let decoded = codec::decode_transport_unit(wire["data"].as_str().unwrap()).unwrap();
        assert_eq!(decoded, vec![0xAB, 0xCD]);
    }
}
