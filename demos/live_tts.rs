//! Stream text into a live TTS session and report the audio as it arrives.
//!
//! ```sh
//! FISH_API_KEY=... cargo run --example live_tts -- "Text to speak"
//! ```

use std::env;
use std::time::Duration;

use anyhow::anyhow;
use tracing::info;
use tracing_subscriber::EnvFilter;

use fishaudio::{AudioFormat, BaseAudioStream, Client, LatencyMode, StreamParams, WebSocketOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Must happen before any TLS connection is attempted
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let text = env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let text = if text.is_empty() {
        "Hello from a live text to speech session. Words are sent as they are produced.".to_string()
    } else {
        text
    };

    let client = Client::from_env()?;
    if client.config().api_key.is_empty() {
        anyhow::bail!("FISH_API_KEY is not set");
    }

    // Feed the session word by word, the way an LLM would emit tokens
    let (tx, rx) = futures::channel::mpsc::unbounded::<String>();
    tokio::spawn(async move {
        for word in text.split_whitespace() {
            if tx.unbounded_send(format!("{word} ")).is_err() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    });

    let params = StreamParams::default()
        .with_format(AudioFormat::Mp3)
        .with_latency(LatencyMode::Balanced);
    let stream = client
        .tts()
        .stream_websocket(rx, &params, WebSocketOptions::default())
        .await?;

    let mut chunks = 0usize;
    let mut total = 0usize;
    while stream.advance().await {
        if let Some(chunk) = stream.current() {
            chunks += 1;
            total += chunk.len();
            info!("chunk {}: {} bytes", chunks, chunk.len());
        }
    }

    if let Some(err) = stream.last_error() {
        return Err(err.into());
    }
    stream.close().await?;

    info!("Received {} bytes of audio in {} chunks", total, chunks);
    Ok(())
}
