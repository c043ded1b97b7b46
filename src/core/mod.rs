pub mod account;
pub mod asr;
pub mod stream;
pub mod tts;
pub mod voices;

// Re-export commonly used types for convenience
pub use account::{AccountService, Credits, Package};
pub use asr::{AsrResponse, AsrSegment, AsrService, TranscribeParams};

pub use stream::{
    AudioChunk, AudioStream, BaseAudioStream, ChunkedAudioStream, DuplexAudioStream, StreamError,
    StreamResult, StreamState, into_chunks,
};

pub use tts::{
    AudioFormat, ConvertParams, LatencyMode, Model, Prosody, ReferenceAudio, StreamParams,
    TtsConfig, TtsService, WebSocketOptions,
};

pub use voices::{
    Author, CreateVoiceParams, ListVoicesParams, ModelState, Page, Sample, TrainMode,
    UpdateVoiceParams, Visibility, Voice, VoicesService,
};
