//! Speech-to-text over `POST /v1/asr`.

use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::client::{Client, RequestOptions};
use crate::errors::ClientResult;

pub const ASR_PATH: &str = "/v1/asr";

/// File name attached to the uploaded audio part
const AUDIO_FILE_NAME: &str = "audio.mp3";

/// A timestamped span of the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrSegment {
    pub text: String,
    /// Seconds from the start of the audio
    pub start: f64,
    pub end: f64,
}

/// Transcription result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsrResponse {
    pub text: String,
    /// Audio duration in milliseconds
    pub duration: f64,
    #[serde(default)]
    pub segments: Vec<AsrSegment>,
}

#[derive(Debug, Clone, Default)]
pub struct TranscribeParams {
    /// Language code such as `en`. Detected by the service when unset.
    pub language: Option<String>,
    /// Whether segments carry timestamps. Defaults to true.
    pub include_timestamps: Option<bool>,
}

impl TranscribeParams {
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn with_timestamps(mut self, include: bool) -> Self {
        self.include_timestamps = Some(include);
        self
    }

    fn into_form(self, audio: Vec<u8>) -> Form {
        let mut form = Form::new().part("audio", Part::bytes(audio).file_name(AUDIO_FILE_NAME));
        if let Some(language) = self.language.filter(|l| !l.is_empty()) {
            form = form.text("language", language);
        }
        let include_timestamps = self.include_timestamps.unwrap_or(true);
        form.text("ignore_timestamps", (!include_timestamps).to_string())
    }
}

/// Speech-to-text operations
#[derive(Debug, Clone, Copy)]
pub struct AsrService<'a> {
    client: &'a Client,
}

impl<'a> AsrService<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Transcribe a complete audio file.
    pub async fn transcribe(
        &self,
        audio: impl Into<Vec<u8>>,
        params: TranscribeParams,
        options: Option<RequestOptions>,
    ) -> ClientResult<AsrResponse> {
        let form = params.into_form(audio.into());
        self.client
            .request_multipart_json(Method::POST, ASR_PATH, form, options.as_ref())
            .await
    }
}
