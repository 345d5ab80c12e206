//! Request parameter normalization shared by the processing endpoints.

use serde::Deserialize;
use std::path::PathBuf;

/// How quickly the speaker talks. Selects the recognition profile used
/// when a first transcription attempt comes back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpeechSpeed {
    #[default]
    Normal,
    Fast,
}

impl SpeechSpeed {
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("fast") => SpeechSpeed::Fast,
            _ => SpeechSpeed::Normal,
        }
    }
}

/// Raw request fields accepted by the processing endpoints. Everything
/// is optional; the same shape is parsed from JSON bodies and from the
/// text parts of multipart uploads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawParams {
    pub language: Option<String>,
    pub speech_language: Option<String>,
    pub speech_speed: Option<String>,
    pub question_context: Option<String>,
    pub custom_context: Option<String>,
    pub is_follow_up: bool,
    pub use_streaming: bool,
    pub audio_file: Option<String>,
    pub transcript: Option<String>,
    pub processed_directly: bool,
}

/// Normalized per-request parameters handed to the pipeline.
#[derive(Debug, Clone)]
pub struct RequestParams {
    /// Answer language code, e.g. `en` or `vi`.
    pub language: String,
    /// BCP-47 tag sent to the speech recognizer.
    pub speech_language: String,
    pub speech_speed: SpeechSpeed,
    pub question_context: Option<String>,
    pub custom_context: Option<String>,
    pub is_follow_up: bool,
    pub use_streaming: bool,
    /// Explicit audio file override, where the endpoint allows one.
    pub audio_file: Option<PathBuf>,
}

impl RequestParams {
    pub fn from_raw(raw: &RawParams, default_language: &str) -> Self {
        let language = raw
            .language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(default_language)
            .to_string();

        let speech_language = raw
            .speech_language
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| speech_tag_for(&language));

        Self {
            language,
            speech_language,
            speech_speed: SpeechSpeed::parse(raw.speech_speed.as_deref()),
            question_context: clean(&raw.question_context),
            custom_context: clean(&raw.custom_context),
            is_follow_up: raw.is_follow_up,
            use_streaming: raw.use_streaming,
            audio_file: raw.audio_file.as_deref().map(PathBuf::from),
        }
    }
}

fn clean(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Recognition language tag for an answer language code. An explicit
/// `speechLanguage` in the request bypasses this mapping.
fn speech_tag_for(language: &str) -> String {
    match language {
        "en" => "en-US".to_string(),
        "vi" => "vi-VN".to_string(),
        other => other.to_string(),
    }
}
