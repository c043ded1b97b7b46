use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Default maximum size of one inbound WebSocket message
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Tunables for a live TTS session
#[derive(Debug, Clone)]
pub struct WebSocketOptions {
    /// Largest inbound message or frame, in bytes
    pub max_message_size: usize,
    pub read_buffer_size: usize,
    pub write_buffer_size: usize,
    /// Upper bound on dial plus handshake
    pub handshake_timeout: Duration,
    /// Aborts the dial and, once connected, pending pulls on the stream
    pub cancellation: Option<CancellationToken>,
}

impl Default for WebSocketOptions {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            read_buffer_size: 1024,
            write_buffer_size: 1024,
            handshake_timeout: Duration::from_secs(30),
            cancellation: None,
        }
    }
}

impl WebSocketOptions {
    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}
