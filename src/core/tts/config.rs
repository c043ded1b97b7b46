use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Audio output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Wav,
    Pcm,
    Opus,
}

/// Generation mode trading latency against quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LatencyMode {
    Normal,
    Balanced,
}

/// TTS model, sent as the `model` header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Model {
    #[serde(rename = "s1")]
    S1,
    #[serde(rename = "speech-1.6")]
    Speech16,
    #[serde(rename = "speech-1.5")]
    Speech15,
}

impl Model {
    pub fn as_str(&self) -> &'static str {
        match self {
            Model::S1 => "s1",
            Model::Speech16 => "speech-1.6",
            Model::Speech15 => "speech-1.5",
        }
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference sample for instant voice cloning.
///
/// `audio` is base64 text in JSON bodies and raw binary in msgpack frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceAudio {
    #[serde(with = "audio_bytes")]
    pub audio: Vec<u8>,
    /// Transcription of what is spoken in `audio`
    pub text: String,
}

impl ReferenceAudio {
    pub fn new(audio: impl Into<Vec<u8>>, text: impl Into<String>) -> Self {
        Self {
            audio: audio.into(),
            text: text.into(),
        }
    }
}

mod audio_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(audio: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&BASE64.encode(audio))
        } else {
            serializer.serialize_bytes(audio)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        deserializer.deserialize_any(AudioVisitor)
    }

    struct AudioVisitor;

    impl<'de> Visitor<'de> for AudioVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("base64 string or byte array")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Vec<u8>, E> {
            BASE64.decode(v).map_err(E::custom)
        }

        fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Vec<u8>, E> {
            Ok(v.to_vec())
        }

        fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Vec<u8>, E> {
            Ok(v)
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Vec<u8>, A::Error> {
            let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
            while let Some(byte) = seq.next_element::<u8>()? {
                out.push(byte);
            }
            Ok(out)
        }
    }
}

/// Speech speed and volume
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Prosody {
    /// Speed multiplier, 0.5 to 2.0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Volume adjustment in dB, -20 to 20
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

/// Reusable TTS configuration. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TtsConfig {
    pub model: Option<Model>,
    pub format: Option<AudioFormat>,
    pub sample_rate: Option<u32>,
    /// kbps: 64, 128 or 192
    pub mp3_bitrate: Option<u32>,
    /// kbps: -1000, 24, 32, 48 or 64
    pub opus_bitrate: Option<i32>,
    pub normalize: Option<bool>,
    /// Characters per generation chunk, 100 to 300
    pub chunk_length: Option<u32>,
    pub latency: Option<LatencyMode>,
    pub reference_id: Option<String>,
    pub references: Vec<ReferenceAudio>,
    pub prosody: Option<Prosody>,
    pub top_p: Option<f64>,
    pub temperature: Option<f64>,
}

/// Parameters for a TTS call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamParams {
    /// Text to synthesize. Usually empty for live sessions.
    pub text: String,
    pub model: Option<Model>,
    /// Voice model id
    pub reference_id: Option<String>,
    pub references: Vec<ReferenceAudio>,
    pub format: Option<AudioFormat>,
    pub latency: Option<LatencyMode>,
    /// Shorthand for `prosody.speed`
    pub speed: Option<f64>,
    pub config: Option<TtsConfig>,
}

/// Parameters for [`TtsService::convert`](super::TtsService::convert)
pub type ConvertParams = StreamParams;

impl StreamParams {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: Model) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_reference_id(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn with_format(mut self, format: AudioFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_latency(mut self, latency: LatencyMode) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_config(mut self, config: TtsConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// The params model, else the config model.
    pub fn resolved_model(&self) -> Option<Model> {
        self.model
            .or_else(|| self.config.as_ref().and_then(|c| c.model))
    }
}

/// Request body for `POST /v1/tts` and the `start` event.
///
/// Unset fields are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsRequest {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<AudioFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mp3_bitrate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opus_bitrate: Option<i32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ReferenceAudio>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalize: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency: Option<LatencyMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prosody: Option<Prosody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl TtsRequest {
    /// Merge params over their optional config.
    ///
    /// Explicit params win for format, latency, reference id, references and
    /// prosody. The config alone supplies the encoder and sampling settings.
    pub fn from_params(params: &StreamParams) -> Self {
        let mut req = TtsRequest {
            text: params.text.clone(),
            reference_id: params.reference_id.clone(),
            references: params.references.clone(),
            format: params.format,
            latency: params.latency,
            prosody: params.speed.map(|speed| Prosody {
                speed: Some(speed),
                volume: None,
            }),
            ..Default::default()
        };

        let Some(cfg) = params.config.as_ref() else {
            return req;
        };

        req.format = req.format.or(cfg.format);
        req.latency = req.latency.or(cfg.latency);
        req.prosody = req.prosody.or(cfg.prosody);
        if req.reference_id.is_none() {
            req.reference_id = cfg.reference_id.clone();
        }
        if req.references.is_empty() {
            req.references = cfg.references.clone();
        }

        req.sample_rate = cfg.sample_rate;
        req.mp3_bitrate = cfg.mp3_bitrate;
        req.opus_bitrate = cfg.opus_bitrate;
        req.normalize = cfg.normalize;
        req.chunk_length = cfg.chunk_length;
        req.top_p = cfg.top_p;
        req.temperature = cfg.temperature;
        req
    }
}
