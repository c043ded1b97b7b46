use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::TryStreamExt;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::base::{AudioChunk, BaseAudioStream, Pull, StreamCore, StreamError, StreamResult, StreamState};

/// Default number of bytes read from the body per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

type Body = Pin<Box<dyn AsyncRead + Send>>;

/// Audio stream over a single HTTP response body.
///
/// Each [`advance`](BaseAudioStream::advance) performs one bounded read of at
/// most `chunk_size` bytes. Chunk sizes are not fixed.
pub struct ChunkedAudioStream {
    core: StreamCore,
    body: Mutex<Option<Body>>,
    chunk_size: usize,
}

impl ChunkedAudioStream {
    /// Wrap any async byte source.
    pub fn new<R>(body: R) -> Self
    where
        R: AsyncRead + Send + 'static,
    {
        let body: Body = Box::pin(body);
        Self {
            core: StreamCore::new(),
            body: Mutex::new(Some(body)),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Wrap a successful HTTP response. The body is consumed lazily.
    pub fn from_response(response: reqwest::Response) -> Self {
        let bytes = response.bytes_stream().map_err(io::Error::other);
        Self::new(StreamReader::new(bytes))
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Abort pending reads when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.core.set_cancellation(token);
        self
    }

    async fn next_chunk(&self) -> Pull {
        let mut guard = self.body.lock().await;
        let Some(body) = guard.as_mut() else {
            return Pull::End;
        };

        let mut buf = BytesMut::zeroed(self.chunk_size);
        match body.read(&mut buf).await {
            Ok(0) => Pull::End,
            Ok(n) => {
                buf.truncate(n);
                Pull::Chunk(buf.freeze())
            }
            Err(e) => {
                debug!("Audio body read failed: {}", e);
                Pull::Failed(StreamError::Io(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl BaseAudioStream for ChunkedAudioStream {
    async fn advance(&self) -> bool {
        self.core.advance(|| self.next_chunk()).await
    }

    fn current(&self) -> Option<AudioChunk> {
        self.core.current()
    }

    fn last_error(&self) -> Option<StreamError> {
        self.core.last_error()
    }

    fn state(&self) -> StreamState {
        self.core.state()
    }

    async fn read(&self, buf: &mut [u8]) -> StreamResult<usize> {
        self.core.read(buf, || self.next_chunk()).await
    }

    async fn close(&self) -> StreamResult<()> {
        self.core.mark_closed();
        // A pending read drops its guard as soon as the close signal fires
        if self.body.lock().await.take().is_some() {
            debug!("Closed audio response body");
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChunkedAudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkedAudioStream")
            .field("state", &self.core.state())
            .field("closed", &self.core.is_closed())
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

impl From<Bytes> for ChunkedAudioStream {
    fn from(audio: Bytes) -> Self {
        Self::new(io::Cursor::new(audio))
    }
}
