use std::env;

use super::utils::parse_seconds;
use super::{API_KEY_ENV, ClientConfig, DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECONDS};
use crate::errors::{ClientError, ClientResult};

impl ClientConfig {
    /// Load configuration from environment variables
    ///
    /// Also loads a `.env` file if present using dotenvy.
    ///
    /// Recognised variables:
    /// - `FISH_API_KEY`: bearer token
    /// - `FISH_BASE_URL`: service base URL (default `https://api.fish.audio`)
    /// - `FISH_TIMEOUT_SECONDS`: HTTP timeout (default 240)
    ///
    /// # Errors
    /// Returns [`ClientError::Config`] if a variable is present but malformed.
    pub fn from_env() -> ClientResult<Self> {
        let _ = dotenvy::dotenv();

        let api_key = env::var(API_KEY_ENV).unwrap_or_default();
        let base_url = env::var("FISH_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        url::Url::parse(&base_url)
            .map_err(|e| ClientError::Config(format!("Invalid FISH_BASE_URL '{base_url}': {e}")))?;

        let timeout_seconds = match env::var("FISH_TIMEOUT_SECONDS") {
            Ok(raw) => parse_seconds(&raw).ok_or_else(|| {
                ClientError::Config(format!("Invalid FISH_TIMEOUT_SECONDS '{raw}'"))
            })?,
            Err(_) => DEFAULT_TIMEOUT_SECONDS,
        };

        Ok(ClientConfig {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_seconds,
        })
    }
}
