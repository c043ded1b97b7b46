//! Duplex WebSocket audio stream.
//!
//! One session runs two background tasks over a single connection:
//!
//! - the send path forwards caller text as `text` events and writes exactly
//!   one `stop` event once the text source is exhausted;
//! - the receive path decodes server events, queues audio chunks and owns
//!   the connection teardown.
//!
//! The caller pulls audio through [`BaseAudioStream`]. A bounded audio queue
//! propagates backpressure to the receive path, and a single-slot error queue
//! carries the first terminal error.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message, WebSocketConfig};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async_with_config};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::base::{AudioChunk, BaseAudioStream, Pull, StreamCore, StreamError, StreamResult, StreamState};
use crate::core::tts::config::TtsRequest;
use crate::core::tts::messages::{FinishReason, ProtocolEvent};
use crate::core::tts::options::WebSocketOptions;
use crate::errors::{ApiError, ClientError, ClientResult};

/// Capacity of the queue between the receive path and the caller
pub const AUDIO_QUEUE_CAPACITY: usize = 100;

/// Upper bound on the close handshake performed by the receive path
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = Arc<Mutex<SplitSink<WsStream, Message>>>;

struct Receivers {
    audio: mpsc::Receiver<AudioChunk>,
    errors: mpsc::Receiver<StreamError>,
}

/// Why the receive path stopped reading
enum ReceiveOutcome {
    /// The server sent `finish` with reason `stop`
    Finished,
    /// The connection closed normally without a `finish` event
    Closed,
    /// A terminal error to publish
    Failed(StreamError),
    /// The caller closed or dropped the stream
    Abandoned,
}

/// Audio stream backed by a live duplex WebSocket session
pub struct DuplexAudioStream {
    core: StreamCore,
    receivers: Mutex<Receivers>,
    session: CancellationToken,
}

impl DuplexAudioStream {
    /// Open a session.
    ///
    /// Dials `request`, sends the `start` event carrying `start` and only then
    /// spawns the send and receive paths. The dial and the `start` write share
    /// one handshake timeout. Any failure up to and including the `start`
    /// write is returned here and no background task is left running.
    pub async fn connect<R, S>(
        request: R,
        start: &TtsRequest,
        text_source: S,
        options: &WebSocketOptions,
    ) -> ClientResult<Self>
    where
        R: IntoClientRequest + Unpin,
        S: Stream<Item = String> + Send + 'static,
    {
        let payload = ProtocolEvent::Start {
            request: start.clone(),
        }
        .encode()
        .map_err(|e| ClientError::Encode(e.to_string()))?;

        let ws = open_session(request, payload, options).await?;

        let (sink, stream) = ws.split();
        let sink: WsSink = Arc::new(Mutex::new(sink));

        let (audio_tx, audio_rx) = mpsc::channel(AUDIO_QUEUE_CAPACITY);
        let (error_tx, error_rx) = mpsc::channel(1);
        let session = CancellationToken::new();

        tokio::spawn(run_send_path(
            sink.clone(),
            text_source,
            error_tx.clone(),
            session.clone(),
        ));
        tokio::spawn(run_receive_path(
            stream,
            sink,
            audio_tx,
            error_tx,
            session.clone(),
        ));

        let mut this = Self::from_channels(audio_rx, error_rx, session);
        if let Some(token) = options.cancellation.clone() {
            this.core.set_cancellation(token);
        }
        Ok(this)
    }

    pub(crate) fn from_channels(
        audio: mpsc::Receiver<AudioChunk>,
        errors: mpsc::Receiver<StreamError>,
        session: CancellationToken,
    ) -> Self {
        Self {
            core: StreamCore::new(),
            receivers: Mutex::new(Receivers { audio, errors }),
            session,
        }
    }

    /// Abort pending pulls when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.core.set_cancellation(token);
        self
    }

    async fn next_chunk(&self) -> Pull {
        let mut rx = self.receivers.lock().await;
        let Receivers { audio, errors } = &mut *rx;

        // Audio already decoded is delivered before any error queued after it
        tokio::select! {
            biased;
            chunk = audio.recv() => match chunk {
                Some(chunk) => Pull::Chunk(chunk),
                // Errors are queued before the audio queue closes
                None => match errors.try_recv() {
                    Ok(err) => Pull::Failed(err),
                    Err(_) => Pull::End,
                },
            },
            Some(err) = errors.recv() => Pull::Failed(err),
        }
    }
}

#[async_trait]
impl BaseAudioStream for DuplexAudioStream {
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
        if !self.core.mark_closed() {
            return Ok(());
        }
        self.session.cancel();

        let mut rx = self.receivers.lock().await;
        rx.audio.close();
        rx.errors.close();
        debug!("Closed duplex audio stream");
        Ok(())
    }
}

impl Drop for DuplexAudioStream {
    fn drop(&mut self) {
        self.session.cancel();
    }
}

impl std::fmt::Debug for DuplexAudioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DuplexAudioStream")
            .field("state", &self.core.state())
            .field("closed", &self.core.is_closed())
            .finish()
    }
}

fn websocket_config(options: &WebSocketOptions) -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.read_buffer_size = options.read_buffer_size;
    config.write_buffer_size = options.write_buffer_size;
    config.max_message_size = Some(options.max_message_size);
    config.max_frame_size = Some(options.max_message_size);
    config
}

/// Dial and send the `start` event within the handshake timeout, racing the
/// caller's cancellation token.
async fn open_session<R>(
    request: R,
    start_payload: Vec<u8>,
    options: &WebSocketOptions,
) -> ClientResult<WsStream>
where
    R: IntoClientRequest + Unpin,
{
    let handshake = tokio::time::timeout(options.handshake_timeout, async {
        let mut ws = dial(request, options).await?;
        if let Err(e) = ws.send(Message::Binary(start_payload.into())).await {
            error!("Failed to send start event: {}", e);
            if let Err(e) = ws.close(None).await {
                debug!("Error while closing WebSocket connection: {}", e);
            }
            return Err(ClientError::Connection(format!("failed to send start event: {e}")));
        }
        debug!("Sent start event");
        Ok::<WsStream, ClientError>(ws)
    });

    let cancelled = async {
        match options.cancellation.as_ref() {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    };

    let result = tokio::select! {
        _ = cancelled => return Err(ClientError::Cancelled),
        result = handshake => result,
    };

    match result {
        Ok(result) => result,
        Err(_) => {
            error!("WebSocket handshake timed out after {:?}", options.handshake_timeout);
            Err(ClientError::Connection(format!(
                "handshake timed out after {:?}",
                options.handshake_timeout
            )))
        }
    }
}

async fn dial<R>(request: R, options: &WebSocketOptions) -> ClientResult<WsStream>
where
    R: IntoClientRequest + Unpin,
{
    match connect_async_with_config(request, Some(websocket_config(options)), false).await {
        Ok((ws, response)) => {
            info!("WebSocket session established (status {})", response.status());
            Ok(ws)
        }
        Err(WsError::Http(response)) => {
            let body = response
                .body()
                .as_deref()
                .map(|b| String::from_utf8_lossy(b).into_owned())
                .unwrap_or_default();
            let err = ApiError::new(response.status(), body);
            warn!(kind = err.kind().as_str(), "WebSocket handshake rejected: {}", err);
            Err(ClientError::Api(err))
        }
        Err(e) => {
            error!("WebSocket dial failed: {}", e);
            Err(ClientError::Connection(e.to_string()))
        }
    }
}

fn report(errors: &mpsc::Sender<StreamError>, err: StreamError) {
    // Only the first terminal error is kept
    if errors.try_send(err).is_err() {
        debug!("Dropped secondary stream error");
    }
}

/// Write one event. Returns `Ok(false)` when the session ended before the
/// write completed.
async fn send_event(
    sink: &WsSink,
    event: &ProtocolEvent,
    session: &CancellationToken,
) -> Result<bool, StreamError> {
    let payload = event.encode()?;
    let mut sink = sink.lock().await;

    tokio::select! {
        biased;
        _ = session.cancelled() => Ok(false),
        result = sink.send(Message::Binary(payload.into())) => result
            .map(|()| true)
            .map_err(|e| StreamError::Send {
                event: event.name(),
                message: e.to_string(),
            }),
    }
}

async fn run_send_path<S>(
    sink: WsSink,
    text_source: S,
    errors: mpsc::Sender<StreamError>,
    session: CancellationToken,
) where
    S: Stream<Item = String> + Send,
{
    let mut text_source = std::pin::pin!(text_source);
    let mut fragments = 0usize;

    loop {
        let next = tokio::select! {
            _ = session.cancelled() => {
                debug!("Session ended before text source was exhausted");
                return;
            }
            next = text_source.next() => next,
        };

        let Some(text) = next else { break };
        match send_event(&sink, &ProtocolEvent::Text { text }, &session).await {
            Ok(true) => fragments += 1,
            Ok(false) => {
                debug!("Session ended while sending text");
                return;
            }
            Err(err) => {
                error!("Send path stopped: {}", err);
                report(&errors, err);
                return;
            }
        }
    }

    if session.is_cancelled() {
        return;
    }

    match send_event(&sink, &ProtocolEvent::Stop, &session).await {
        Ok(true) => debug!("Sent stop event after {} text fragments", fragments),
        Ok(false) => debug!("Session ended before stop event was sent"),
        Err(err) => {
            error!("Failed to send stop event: {}", err);
            report(&errors, err);
        }
    }
}

fn handle_close_frame(frame: Option<CloseFrame>) -> ReceiveOutcome {
    match frame {
        None => ReceiveOutcome::Closed,
        Some(frame) if matches!(frame.code, CloseCode::Normal | CloseCode::Status) => {
            ReceiveOutcome::Closed
        }
        Some(frame) => ReceiveOutcome::Failed(StreamError::Transport(format!(
            "connection closed with code {}: {}",
            u16::from(frame.code),
            frame.reason
        ))),
    }
}

/// Decide what to do with one decoded server event.
///
/// Returns `Ok(Some(chunk))` for audio to queue, `Ok(None)` to keep reading
/// and `Err(outcome)` to stop.
fn handle_event(event: ProtocolEvent) -> Result<Option<AudioChunk>, ReceiveOutcome> {
    match event {
        ProtocolEvent::Audio { audio } if audio.is_empty() => {
            warn!("Ignoring empty audio event");
            Ok(None)
        }
        ProtocolEvent::Audio { audio } => Ok(Some(Bytes::from(audio.into_vec()))),
        ProtocolEvent::Finish {
            reason: FinishReason::Stop,
        } => Err(ReceiveOutcome::Finished),
        ProtocolEvent::Finish {
            reason: FinishReason::Error,
        } => Err(ReceiveOutcome::Failed(StreamError::protocol_finish())),
        other => Err(ReceiveOutcome::Failed(StreamError::Decode(format!(
            "unexpected {} event from server",
            other.name()
        )))),
    }
}

async fn run_receive_path(
    mut stream: SplitStream<WsStream>,
    sink: WsSink,
    audio: mpsc::Sender<AudioChunk>,
    errors: mpsc::Sender<StreamError>,
    session: CancellationToken,
) {
    let mut chunks = 0usize;

    let outcome = loop {
        let message = tokio::select! {
            _ = session.cancelled() => break ReceiveOutcome::Abandoned,
            message = stream.next() => message,
        };

        let payload = match message {
            None => break ReceiveOutcome::Closed,
            Some(Err(e)) => break ReceiveOutcome::Failed(StreamError::Transport(e.to_string())),
            Some(Ok(Message::Binary(data))) => data,
            Some(Ok(Message::Text(text))) => Bytes::copy_from_slice(text.as_str().as_bytes()),
            Some(Ok(Message::Close(frame))) => break handle_close_frame(frame),
            Some(Ok(_)) => continue,
        };

        let event = match ProtocolEvent::decode(&payload) {
            Ok(event) => event,
            Err(err) => break ReceiveOutcome::Failed(err),
        };

        let chunk = match handle_event(event) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => continue,
            Err(outcome) => break outcome,
        };

        // Blocks while the caller is behind
        tokio::select! {
            _ = session.cancelled() => break ReceiveOutcome::Abandoned,
            sent = audio.send(chunk) => {
                if sent.is_err() {
                    break ReceiveOutcome::Abandoned;
                }
                chunks += 1;
            }
        }
    };

    match outcome {
        ReceiveOutcome::Finished => info!("Session finished after {} audio chunks", chunks),
        ReceiveOutcome::Closed => info!("Connection closed after {} audio chunks", chunks),
        ReceiveOutcome::Abandoned => debug!("Stream closed by caller after {} audio chunks", chunks),
        ReceiveOutcome::Failed(err) => {
            error!("Receive path failed: {}", err);
            report(&errors, err);
        }
    }

    // The error, if any, is queued before the end of audio is signalled
    drop(audio);
    session.cancel();
    close_connection(&sink).await;
}

async fn close_connection(sink: &WsSink) {
    let closed = tokio::time::timeout(CLOSE_TIMEOUT, async {
        let mut sink = sink.lock().await;
        sink.close().await
    })
    .await;

    match closed {
        Ok(Ok(())) => debug!("WebSocket connection closed"),
        Ok(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) => {
            debug!("WebSocket connection already closed")
        }
        Ok(Err(e)) => debug!("Error while closing WebSocket connection: {}", e),
        Err(_) => warn!("Timed out closing WebSocket connection"),
    }
}
