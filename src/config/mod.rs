//! Client configuration
//!
//! Holds the settings every request shares: the API key, the service base URL
//! and the HTTP timeout. Values can be given explicitly or loaded from the
//! environment (and a `.env` file) with [`ClientConfig::from_env`].
//!
//! # Example
//! ```rust,no_run
//! use fishaudio::config::ClientConfig;
//!
//! # fn main() -> Result<(), fishaudio::ClientError> {
//! let config = ClientConfig::from_env()?;
//! println!("Using {}", config.base_url);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

mod env;
mod utils;

pub use utils::{parse_seconds, websocket_url};

/// Default service base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.fish.audio";

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 240;

/// Crate version reported in the user agent.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "FISH_API_KEY";

/// User agent sent with every HTTP request and WebSocket handshake.
pub fn user_agent() -> String {
    format!("fish-audio/rust/{VERSION}")
}

/// Client configuration
#[derive(Clone)]
pub struct ClientConfig {
    /// Bearer token for the service
    pub api_key: String,
    /// Base URL, e.g. `https://api.fish.audio`
    pub base_url: String,
    /// Timeout applied to HTTP requests
    pub timeout_seconds: u64,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given API key with default settings.
    ///
    /// An empty key falls back to the `FISH_API_KEY` environment variable.
    pub fn new(api_key: impl Into<String>) -> Self {
        let mut api_key = api_key.into();
        if api_key.is_empty() {
            api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        }
        Self {
            api_key,
            ..Default::default()
        }
    }

    /// Override the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_seconds = timeout.as_secs().max(1);
        self
    }

    /// HTTP timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}
