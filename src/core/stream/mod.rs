mod base;
mod chunked;
mod duplex;

pub use base::{
    AudioChunk, AudioStream, BaseAudioStream, StreamError, StreamResult, StreamState, into_chunks,
};
pub use chunked::{ChunkedAudioStream, DEFAULT_CHUNK_SIZE};
pub use duplex::{AUDIO_QUEUE_CAPACITY, DuplexAudioStream};
