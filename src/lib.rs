//! Client for the Fish Audio text-to-speech service.
//!
//! Audio comes back either from a one-shot HTTP response or from a live
//! WebSocket session fed with text as it is produced. Both are consumed
//! through [`BaseAudioStream`].
//!
//! ```rust,no_run
//! use fishaudio::{BaseAudioStream, Client, ClientConfig, StreamParams};
//!
//! # async fn run() -> Result<(), fishaudio::ClientError> {
//! let client = Client::new(ClientConfig::new("your-api-key"))?;
//! let stream = client.tts().stream(&StreamParams::new("Hello!"), None).await?;
//! let audio = stream.collect().await?;
//! println!("{} bytes", audio.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod core;
pub mod errors;

// Re-export commonly used items for convenience
pub use client::{Client, RequestOptions};
pub use config::ClientConfig;
pub use crate::core::*;
pub use errors::{ApiError, ApiErrorKind, ClientError, ClientResult};
