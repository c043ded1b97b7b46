//! Voice model management over `/model`.

use reqwest::Method;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::form_urlencoded;

use crate::client::{Client, RequestOptions};
use crate::errors::{ClientError, ClientResult};

pub const VOICES_PATH: &str = "/model";

const DEFAULT_PAGE_SIZE: u32 = 10;
const DEFAULT_SORT_BY: &str = "task_count";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlist,
    #[default]
    Private,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlist => "unlist",
            Visibility::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainMode {
    #[default]
    Fast,
}

impl TrainMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainMode::Fast => "fast",
        }
    }
}

/// Training state of a voice model
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelState {
    #[default]
    Created,
    Training,
    Trained,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sample {
    pub title: String,
    pub text: String,
    pub task_id: String,
    pub audio: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Author {
    #[serde(rename = "_id")]
    pub id: String,
    pub nickname: String,
    pub avatar: String,
}

/// A voice model as listed by the service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Voice {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub voice_type: String,
    pub title: String,
    pub description: String,
    pub cover_image: String,
    pub train_mode: TrainMode,
    pub state: ModelState,
    pub tags: Vec<String>,
    pub samples: Vec<Sample>,
    pub created_at: String,
    pub updated_at: String,
    pub languages: Vec<String>,
    pub visibility: Visibility,
    pub lock_visibility: bool,
    pub like_count: u64,
    pub mark_count: u64,
    pub shared_count: u64,
    pub task_count: u64,
    pub liked: bool,
    pub marked: bool,
    pub author: Author,
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub total: u64,
    #[serde(default)]
    pub items: Vec<T>,
}

/// Filters for [`VoicesService::list`]
#[derive(Debug, Clone, Default)]
pub struct ListVoicesParams {
    /// Defaults to 10
    pub page_size: Option<u32>,
    /// 1-indexed, defaults to 1
    pub page_number: Option<u32>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    /// Only the caller's own voices
    pub self_only: bool,
    pub author_id: Option<String>,
    pub languages: Vec<String>,
    pub title_languages: Vec<String>,
    /// `task_count` (default) or `created_at`
    pub sort_by: Option<String>,
}

impl ListVoicesParams {
    pub fn with_page(mut self, page_number: u32, page_size: u32) -> Self {
        self.page_number = Some(page_number);
        self.page_size = Some(page_size);
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn self_only(mut self) -> Self {
        self.self_only = true;
        self
    }

    fn query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair(
            "page_size",
            &self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).to_string(),
        );
        query.append_pair("page_number", &self.page_number.unwrap_or(1).to_string());

        if let Some(title) = self.title.as_deref().filter(|t| !t.is_empty()) {
            query.append_pair("title", title);
        }
        for tag in &self.tags {
            query.append_pair("tag", tag);
        }
        if self.self_only {
            query.append_pair("self", "true");
        }
        if let Some(author) = self.author_id.as_deref().filter(|a| !a.is_empty()) {
            query.append_pair("author_id", author);
        }
        for language in &self.languages {
            query.append_pair("language", language);
        }
        for language in &self.title_languages {
            query.append_pair("title_language", language);
        }
        query.append_pair(
            "sort_by",
            self.sort_by
                .as_deref()
                .filter(|s| !s.is_empty())
                .unwrap_or(DEFAULT_SORT_BY),
        );

        query.finish()
    }
}

/// Fields for cloning a new voice
#[derive(Debug, Clone, Default)]
pub struct CreateVoiceParams {
    pub title: String,
    /// Training audio files. At least one is required.
    pub voices: Vec<Vec<u8>>,
    pub description: Option<String>,
    /// Transcripts of the training audio
    pub texts: Vec<String>,
    pub tags: Vec<String>,
    pub cover_image: Option<Vec<u8>>,
    pub visibility: Visibility,
    pub train_mode: TrainMode,
    /// Defaults to true
    pub enhance_audio_quality: Option<bool>,
}

impl CreateVoiceParams {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_voice(mut self, audio: impl Into<Vec<u8>>) -> Self {
        self.voices.push(audio.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.texts.push(text.into());
        self
    }

    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    fn into_form(self) -> Form {
        let mut form = Form::new().text("title", self.title);
        if let Some(description) = self.description.filter(|d| !d.is_empty()) {
            form = form.text("description", description);
        }
        form = form
            .text("visibility", self.visibility.as_str())
            .text("type", "tts")
            .text("train_mode", self.train_mode.as_str())
            .text(
                "enhance_audio_quality",
                self.enhance_audio_quality.unwrap_or(true).to_string(),
            );
        if !self.texts.is_empty() {
            form = form.text("texts", self.texts.join(","));
        }
        if !self.tags.is_empty() {
            form = form.text("tags", self.tags.join(","));
        }
        for (i, voice) in self.voices.into_iter().enumerate() {
            form = form.part("voices", Part::bytes(voice).file_name(format!("voice_{i}.wav")));
        }
        if let Some(cover) = self.cover_image.filter(|c| !c.is_empty()) {
            form = form.part("cover_image", Part::bytes(cover).file_name("cover.png"));
        }
        form
    }
}

/// Metadata changes for an existing voice. Unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateVoiceParams {
    pub title: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<Vec<u8>>,
    pub visibility: Option<Visibility>,
    pub tags: Vec<String>,
}

impl UpdateVoiceParams {
    fn into_form(self) -> Form {
        let mut form = Form::new();
        if let Some(title) = self.title.filter(|t| !t.is_empty()) {
            form = form.text("title", title);
        }
        if let Some(description) = self.description.filter(|d| !d.is_empty()) {
            form = form.text("description", description);
        }
        if let Some(visibility) = self.visibility {
            form = form.text("visibility", visibility.as_str());
        }
        if !self.tags.is_empty() {
            form = form.text("tags", self.tags.join(","));
        }
        if let Some(cover) = self.cover_image.filter(|c| !c.is_empty()) {
            form = form.part("cover_image", Part::bytes(cover).file_name("cover.png"));
        }
        form
    }
}

/// Voice model management
#[derive(Debug, Clone, Copy)]
pub struct VoicesService<'a> {
    client: &'a Client,
}

impl<'a> VoicesService<'a> {
    pub(crate) fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn list(&self, params: &ListVoicesParams) -> ClientResult<Page<Voice>> {
        let path = format!("{}?{}", VOICES_PATH, params.query());
        self.client
            .request_json(Method::GET, &path, None::<&()>, None)
            .await
    }

    pub async fn get(&self, voice_id: &str) -> ClientResult<Voice> {
        self.client
            .request_json(Method::GET, &voice_path(voice_id), None::<&()>, None)
            .await
    }

    /// Clone a new voice from training audio.
    pub async fn create(
        &self,
        params: CreateVoiceParams,
        options: Option<RequestOptions>,
    ) -> ClientResult<Voice> {
        if params.voices.is_empty() {
            return Err(ClientError::InvalidRequest(
                "at least one voice sample is required".to_string(),
            ));
        }
        debug!("Creating voice '{}' from {} samples", params.title, params.voices.len());

        self.client
            .request_multipart_json(Method::POST, VOICES_PATH, params.into_form(), options.as_ref())
            .await
    }

    pub async fn update(&self, voice_id: &str, params: UpdateVoiceParams) -> ClientResult<()> {
        self.client
            .request_multipart(Method::PATCH, &voice_path(voice_id), params.into_form(), None)
            .await?;
        Ok(())
    }

    pub async fn delete(&self, voice_id: &str) -> ClientResult<()> {
        self.client
            .request(Method::DELETE, &voice_path(voice_id), None::<&()>, None)
            .await?;
        Ok(())
    }
}

fn voice_path(voice_id: &str) -> String {
    format!("{VOICES_PATH}/{voice_id}")
}
