//! # Audio Stream Base Trait
//!
//! This module provides the pull-based capability shared by every audio stream
//! the client hands out. Whether audio comes from a single HTTP response body
//! or from a live duplex WebSocket session, callers drive it the same way.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use fishaudio::core::stream::BaseAudioStream;
//!
//! async fn play(stream: impl BaseAudioStream) -> Result<(), fishaudio::StreamError> {
//!     while stream.advance().await {
//!         if let Some(chunk) = stream.current() {
//!             println!("Received {} bytes", chunk.len());
//!         }
//!     }
//!     if let Some(err) = stream.last_error() {
//!         return Err(err);
//!     }
//!     stream.close().await
//! }
//! ```

use std::future::Future;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::Stream;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::chunked::ChunkedAudioStream;
use super::duplex::DuplexAudioStream;

/// One unit of audio bytes, in delivery order
pub type AudioChunk = Bytes;

/// Lifecycle of a stream. Transitions only go `Open -> Exhausted` or `Open -> Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// More chunks may follow
    Open,
    /// The source ended cleanly
    Exhausted,
    /// A terminal error was recorded
    Failed,
}

/// Terminal errors surfaced by an audio stream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("failed to marshal {event} event: {message}")]
    Encode { event: &'static str, message: String },

    #[error("failed to send {event} event: {message}")]
    Send { event: &'static str, message: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("websocket read failed: {0}")]
    Transport(String),

    /// The server finished the session with `reason = error`
    #[error("{message}")]
    Protocol { message: String },

    #[error("stream cancelled")]
    Cancelled,

    #[error("failed to read audio: {0}")]
    Io(String),
}

impl StreamError {
    /// Error recorded when the server reports `Finish{reason: "error"}`.
    pub fn protocol_finish() -> Self {
        StreamError::Protocol {
            message: "stream finished with error".to_string(),
        }
    }

    /// True for errors raised by the remote service rather than the transport.
    pub fn is_protocol(&self) -> bool {
        matches!(self, StreamError::Protocol { .. })
    }
}

/// Result type for stream operations
pub type StreamResult<T> = Result<T, StreamError>;

/// Pull-based audio stream capability
///
/// All methods take `&self` so a stream can be shared between the task that
/// consumes audio and a task that closes it. Concurrent calls to `advance`
/// are serialized internally but are not a supported usage pattern.
#[async_trait]
pub trait BaseAudioStream: Send + Sync {
    /// Wait for the next chunk.
    ///
    /// Returns `false` once the stream is exhausted, failed or closed.
    async fn advance(&self) -> bool;

    /// The chunk made available by the last successful [`advance`](Self::advance).
    fn current(&self) -> Option<AudioChunk>;

    /// The terminal error, if the stream failed.
    fn last_error(&self) -> Option<StreamError>;

    /// Current lifecycle state.
    fn state(&self) -> StreamState;

    /// Byte-stream adapter.
    ///
    /// Copies any buffered remainder first and only pulls a new chunk when the
    /// remainder is empty. Returns `Ok(0)` at end of stream and the terminal
    /// error if the stream failed.
    async fn read(&self, buf: &mut [u8]) -> StreamResult<usize>;

    /// Release the underlying source. Safe to call more than once.
    async fn close(&self) -> StreamResult<()>;

    /// Drain all remaining chunks in delivery order, then close the stream.
    async fn collect(&self) -> StreamResult<Bytes> {
        let mut audio = BytesMut::new();
        while self.advance().await {
            if let Some(chunk) = self.current() {
                audio.extend_from_slice(&chunk);
            }
        }

        let error = self.last_error();
        self.close().await?;

        match error {
            Some(err) => Err(err),
            None => Ok(audio.freeze()),
        }
    }
}

/// Adapt a stream into a [`futures::Stream`] of chunks.
///
/// The terminal error, if any, is yielded as the last item.
pub fn into_chunks<S>(stream: S) -> impl Stream<Item = StreamResult<AudioChunk>> + Send
where
    S: BaseAudioStream + 'static,
{
    futures::stream::unfold(Some(stream), |state| async move {
        let stream = state?;
        if stream.advance().await {
            let chunk = stream.current().unwrap_or_default();
            return Some((Ok(chunk), Some(stream)));
        }
        let error = stream.last_error();
        if let Err(e) = stream.close().await {
            debug!("Error while closing audio stream: {}", e);
        }
        error.map(|err| (Err(err), None))
    })
}

/// Audio stream returned by the client, tagged by where the audio comes from
pub enum AudioStream {
    /// One already-received HTTP response body
    Chunked(ChunkedAudioStream),
    /// A live duplex WebSocket session
    Duplex(DuplexAudioStream),
}

impl From<ChunkedAudioStream> for AudioStream {
    fn from(stream: ChunkedAudioStream) -> Self {
        AudioStream::Chunked(stream)
    }
}

impl From<DuplexAudioStream> for AudioStream {
    fn from(stream: DuplexAudioStream) -> Self {
        AudioStream::Duplex(stream)
    }
}

#[async_trait]
impl BaseAudioStream for AudioStream {
    async fn advance(&self) -> bool {
        match self {
            AudioStream::Chunked(s) => s.advance().await,
            AudioStream::Duplex(s) => s.advance().await,
        }
    }

    fn current(&self) -> Option<AudioChunk> {
        match self {
            AudioStream::Chunked(s) => s.current(),
            AudioStream::Duplex(s) => s.current(),
        }
    }

    fn last_error(&self) -> Option<StreamError> {
        match self {
            AudioStream::Chunked(s) => s.last_error(),
            AudioStream::Duplex(s) => s.last_error(),
        }
    }

    fn state(&self) -> StreamState {
        match self {
            AudioStream::Chunked(s) => s.state(),
            AudioStream::Duplex(s) => s.state(),
        }
    }

    async fn read(&self, buf: &mut [u8]) -> StreamResult<usize> {
        match self {
            AudioStream::Chunked(s) => s.read(buf).await,
            AudioStream::Duplex(s) => s.read(buf).await,
        }
    }

    async fn close(&self) -> StreamResult<()> {
        match self {
            AudioStream::Chunked(s) => s.close().await,
            AudioStream::Duplex(s) => s.close().await,
        }
    }
}

/// Outcome of one pull from the underlying source
#[derive(Debug)]
pub(crate) enum Pull {
    Chunk(AudioChunk),
    End,
    Failed(StreamError),
}

#[derive(Debug)]
struct ChunkState {
    state: StreamState,
    error: Option<StreamError>,
    current: Option<AudioChunk>,
    remainder: Bytes,
}

/// State shared by both stream implementations: lifecycle, the current chunk,
/// the unread remainder for `read`, and the close/cancel signals.
#[derive(Debug)]
pub(crate) struct StreamCore {
    inner: Mutex<ChunkState>,
    closed: CancellationToken,
    cancel: Option<CancellationToken>,
}

impl StreamCore {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(ChunkState {
                state: StreamState::Open,
                error: None,
                current: None,
                remainder: Bytes::new(),
            }),
            closed: CancellationToken::new(),
            cancel: None,
        }
    }

    pub(crate) fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = Some(token);
    }

    pub(crate) fn current(&self) -> Option<AudioChunk> {
        self.inner.lock().current.clone()
    }

    pub(crate) fn last_error(&self) -> Option<StreamError> {
        self.inner.lock().error.clone()
    }

    pub(crate) fn state(&self) -> StreamState {
        self.inner.lock().state
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Mark the stream closed. Returns `false` if it already was.
    pub(crate) fn mark_closed(&self) -> bool {
        if self.closed.is_cancelled() {
            return false;
        }
        {
            let mut inner = self.inner.lock();
            if inner.state == StreamState::Open {
                inner.state = StreamState::Exhausted;
            }
        }
        self.closed.cancel();
        true
    }

    /// Pull the next chunk from `source`, unless the stream is already
    /// terminal or closed. Races the pull against close and cancellation and
    /// records any terminal transition.
    pub(crate) async fn pull<F, Fut>(&self, source: F) -> Pull
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Pull>,
    {
        {
            let inner = self.inner.lock();
            match inner.state {
                StreamState::Failed => {
                    return Pull::Failed(inner.error.clone().unwrap_or(StreamError::Cancelled));
                }
                StreamState::Exhausted => return Pull::End,
                StreamState::Open => {}
            }
        }

        let cancel = self.cancel.clone();
        let outcome = tokio::select! {
            biased;
            _ = self.closed.cancelled() => return Pull::End,
            _ = async {
                match cancel {
                    Some(token) => token.cancelled_owned().await,
                    None => std::future::pending().await,
                }
            } => Pull::Failed(StreamError::Cancelled),
            outcome = source() => outcome,
        };

        let mut inner = self.inner.lock();
        match outcome {
            Pull::Chunk(chunk) => Pull::Chunk(chunk),
            Pull::End => {
                if inner.state == StreamState::Open {
                    inner.state = StreamState::Exhausted;
                }
                Pull::End
            }
            Pull::Failed(err) => {
                if inner.state == StreamState::Open {
                    inner.state = StreamState::Failed;
                    inner.error = Some(err.clone());
                }
                Pull::Failed(err)
            }
        }
    }

    /// Shared `advance` logic over a pull source.
    pub(crate) async fn advance<F, Fut>(&self, source: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Pull>,
    {
        match self.pull(source).await {
            Pull::Chunk(chunk) => {
                self.inner.lock().current = Some(chunk);
                true
            }
            Pull::End | Pull::Failed(_) => false,
        }
    }

    /// Shared `read` logic over a pull source.
    pub(crate) async fn read<F, Fut>(&self, buf: &mut [u8], source: F) -> StreamResult<usize>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Pull>,
    {
        if buf.is_empty() {
            return Ok(0);
        }

        {
            let mut inner = self.inner.lock();
            if !inner.remainder.is_empty() {
                let n = buf.len().min(inner.remainder.len());
                let taken = inner.remainder.split_to(n);
                buf[..n].copy_from_slice(&taken);
                return Ok(n);
            }
        }

        match self.pull(source).await {
            Pull::Chunk(mut chunk) => {
                let n = buf.len().min(chunk.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                let rest = chunk.split_off(n);
                self.inner.lock().remainder = rest;
                Ok(n)
            }
            Pull::End => Ok(0),
            Pull::Failed(err) => Err(err),
        }
    }
}
