use bytes::Bytes;
use futures::Stream;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, HeaderValue, USER_AGENT};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tracing::info;

use super::config::{ConvertParams, StreamParams, TtsRequest};
use super::options::WebSocketOptions;
use crate::client::{Client, RequestOptions};
use crate::config::{user_agent, websocket_url};
use crate::core::stream::{BaseAudioStream, ChunkedAudioStream, DuplexAudioStream};
use crate::errors::{ClientError, ClientResult};

/// Path of the one-shot HTTP endpoint
pub const TTS_PATH: &str = "/v1/tts";

/// Path of the live WebSocket endpoint
pub const TTS_LIVE_PATH: &str = "/v1/tts/live";

/// Text-to-speech operations
#[derive(Debug, Clone, Copy)]
pub struct TtsService<'a> {
    client: &'a Client,
}

impl<'a> TtsService<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Synthesize `params.text` and stream the audio body as it arrives.
    ///
    /// A status >= 400 is returned as an error before any stream exists.
    pub async fn stream(
        &self,
        params: &StreamParams,
        options: Option<RequestOptions>,
    ) -> ClientResult<ChunkedAudioStream> {
        let request = TtsRequest::from_params(params);

        let mut options = options.unwrap_or_default();
        if let Some(model) = params.resolved_model() {
            options
                .additional_headers
                .insert("model".to_string(), model.as_str().to_string());
        }

        let response = self
            .client
            .request(Method::POST, TTS_PATH, Some(&request), Some(&options))
            .await?;

        let stream = ChunkedAudioStream::from_response(response);
        Ok(match options.cancellation {
            Some(token) => stream.with_cancellation(token),
            None => stream,
        })
    }

    /// Synthesize `params.text` and return the complete audio.
    pub async fn convert(
        &self,
        params: &ConvertParams,
        options: Option<RequestOptions>,
    ) -> ClientResult<Bytes> {
        let stream = self.stream(params, options).await?;
        Ok(stream.collect().await?)
    }

    /// Open a live session that synthesizes text as it is produced.
    ///
    /// Each item of `text_source` is sent as one `text` event, in order. The
    /// end of `text_source` ends the session input.
    pub async fn stream_websocket<S>(
        &self,
        text_source: S,
        params: &StreamParams,
        options: WebSocketOptions,
    ) -> ClientResult<DuplexAudioStream>
    where
        S: Stream<Item = String> + Send + 'static,
    {
        let url = websocket_url(&self.client.config().base_url, TTS_LIVE_PATH)
            .map_err(ClientError::Config)?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::Connection(e.to_string()))?;

        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION, header_value(&self.client.bearer())?);
        headers.insert(USER_AGENT, header_value(&user_agent())?);
        if let Some(model) = params.resolved_model() {
            headers.insert("model", HeaderValue::from_static(model.as_str()));
        }

        info!("Opening live TTS session at {}", url);
        DuplexAudioStream::connect(request, &TtsRequest::from_params(params), text_source, &options)
            .await
    }
}

fn header_value(value: &str) -> ClientResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| ClientError::Config(format!("Invalid header value: {e}")))
}
