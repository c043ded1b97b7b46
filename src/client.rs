//! HTTP client shared by every service.
//!
//! Adds the bearer token and user agent to each request, applies per-request
//! overrides and turns statuses >= 400 into [`ApiError`] before any body is
//! handed to a caller.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::multipart::Form;
use reqwest::{Method, RequestBuilder, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{ClientConfig, user_agent};
use crate::core::account::AccountService;
use crate::core::asr::AsrService;
use crate::core::tts::TtsService;
use crate::core::voices::VoicesService;
use crate::errors::{ApiError, ClientError, ClientResult};

/// Per-request overrides of client defaults
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub additional_headers: HashMap<String, String>,
    pub additional_query_params: HashMap<String, String>,
    /// Replaces the client timeout for this request
    pub timeout: Option<Duration>,
    /// Aborts the request when cancelled
    pub cancellation: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_query_params.insert(name.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// Fish Audio API client
#[derive(Debug, Clone)]
pub struct Client {
    config: ClientConfig,
    http: reqwest::Client,
}

impl Client {
    /// Build a client with its own connection pool.
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { config, http })
    }

    /// Build a client from `FISH_*` environment variables.
    pub fn from_env() -> ClientResult<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    /// Use a caller-provided HTTP client.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Text-to-speech operations
    pub fn tts(&self) -> TtsService<'_> {
        TtsService::new(self)
    }

    /// Speech-to-text operations
    pub fn asr(&self) -> AsrService<'_> {
        AsrService::new(self)
    }

    /// Voice model management
    pub fn voices(&self) -> VoicesService<'_> {
        VoicesService::new(self)
    }

    /// Account and billing operations
    pub fn account(&self) -> AccountService<'_> {
        AccountService::new(self)
    }

    pub(crate) fn bearer(&self) -> String {
        format!("Bearer {}", self.config.api_key)
    }

    /// Send a request and return the response once its status is below 400.
    pub async fn request<B>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: Option<&RequestOptions>,
    ) -> ClientResult<Response>
    where
        B: Serialize + ?Sized,
    {
        let mut builder = self.builder(method.clone(), path);
        if let Some(body) = body {
            let json = serde_json::to_vec(body).map_err(|e| ClientError::Encode(e.to_string()))?;
            builder = builder.header(CONTENT_TYPE, "application/json").body(json);
        }

        self.execute(method, path, builder, options).await
    }

    /// Send a request and decode a JSON response body.
    pub async fn request_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: Option<&RequestOptions>,
    ) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self.request(method, path, body, options).await?;
        decode_json(response).await
    }

    /// Send a `multipart/form-data` request. The boundary header is set by reqwest.
    pub async fn request_multipart(
        &self,
        method: Method,
        path: &str,
        form: Form,
        options: Option<&RequestOptions>,
    ) -> ClientResult<Response> {
        let builder = self.builder(method.clone(), path).multipart(form);
        self.execute(method, path, builder, options).await
    }

    /// Send a `multipart/form-data` request and decode a JSON response body.
    pub async fn request_multipart_json<T>(
        &self,
        method: Method,
        path: &str,
        form: Form,
        options: Option<&RequestOptions>,
    ) -> ClientResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self.request_multipart(method, path, form, options).await?;
        decode_json(response).await
    }

    fn builder(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url, path);
        self.http
            .request(method, url)
            .header(AUTHORIZATION, self.bearer())
            .header(USER_AGENT, user_agent())
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        mut builder: RequestBuilder,
        options: Option<&RequestOptions>,
    ) -> ClientResult<Response> {
        let mut cancellation = None;
        if let Some(options) = options {
            for (name, value) in &options.additional_headers {
                builder = builder.header(name.as_str(), value.as_str());
            }
            if !options.additional_query_params.is_empty() {
                builder = builder.query(&options.additional_query_params);
            }
            if let Some(timeout) = options.timeout {
                builder = builder.timeout(timeout);
            }
            cancellation = options.cancellation.clone();
        }

        debug!("{} {}{}", method, self.config.base_url, path);

        let response = match cancellation {
            Some(token) => tokio::select! {
                _ = token.cancelled() => return Err(ClientError::Cancelled),
                response = builder.send() => response?,
            },
            None => builder.send().await?,
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            let err = ApiError::new(status, body);
            warn!(kind = err.kind().as_str(), "{} {} failed: {}", method, path, err);
            return Err(err.into());
        }

        Ok(response)
    }
}

async fn decode_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ClientError::Decode(e.to_string()))
}
