//! Text-to-speech: request configuration, the live session wire protocol and
//! the service entry points.

pub mod config;
pub mod messages;
pub mod options;
mod service;

pub use config::{
    AudioFormat, ConvertParams, LatencyMode, Model, Prosody, ReferenceAudio, StreamParams,
    TtsConfig, TtsRequest,
};
pub use messages::{FinishReason, ProtocolEvent};
pub use options::{DEFAULT_MAX_MESSAGE_SIZE, WebSocketOptions};
pub use service::{TTS_LIVE_PATH, TTS_PATH, TtsService};
