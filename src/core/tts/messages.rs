use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use super::config::TtsRequest;
use crate::core::stream::StreamError;

/// Why the server ended a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    /// The session ended after the client's `stop`
    Stop,
    /// The server hit a failure
    Error,
}

/// Events exchanged over the live TTS WebSocket, msgpack-encoded as maps
/// with an `event` discriminator.
///
/// `Start`, `Text` and `Stop` flow client to server. `Audio` and `Finish`
/// flow server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum ProtocolEvent {
    Start { request: TtsRequest },
    Text { text: String },
    Stop,
    Audio {
        #[serde(default)]
        audio: ByteBuf,
    },
    Finish { reason: FinishReason },
}

impl ProtocolEvent {
    pub fn text(text: impl Into<String>) -> Self {
        ProtocolEvent::Text { text: text.into() }
    }

    pub fn audio(audio: impl Into<Vec<u8>>) -> Self {
        ProtocolEvent::Audio {
            audio: ByteBuf::from(audio.into()),
        }
    }

    /// Wire name of the event
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolEvent::Start { .. } => "start",
            ProtocolEvent::Text { .. } => "text",
            ProtocolEvent::Stop => "stop",
            ProtocolEvent::Audio { .. } => "audio",
            ProtocolEvent::Finish { .. } => "finish",
        }
    }

    /// Whether the event is sent by the client.
    pub fn is_outbound(&self) -> bool {
        matches!(
            self,
            ProtocolEvent::Start { .. } | ProtocolEvent::Text { .. } | ProtocolEvent::Stop
        )
    }

    pub fn encode(&self) -> Result<Vec<u8>, StreamError> {
        rmp_serde::to_vec_named(self).map_err(|e| StreamError::Encode {
            event: self.name(),
            message: e.to_string(),
        })
    }

    /// Decode one frame. Unknown discriminators are decode errors.
    pub fn decode(data: &[u8]) -> Result<Self, StreamError> {
        rmp_serde::from_slice(data).map_err(|e| StreamError::Decode(e.to_string()))
    }
}
