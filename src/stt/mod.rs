//! Transcription: the speech collaborator contract, the deterministic
//! retry ladder and the named strategies used by explicit retries.

mod client;

pub use client::SpeechClient;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::params::SpeechSpeed;

/// One recognition exchange with the speech collaborator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognizeConfig {
    /// BCP-47 language tag.
    pub language: String,
    pub model: Option<String>,
    pub use_enhanced: bool,
    /// Bare-minimum settings, used as a last resort when configured
    /// attempts keep failing.
    pub simple: bool,
    /// Container encoding hint derived from the file extension.
    pub encoding: Option<&'static str>,
}

/// Raw collaborator result. Confidence is carried through untouched.
#[derive(Debug, Clone, Default)]
pub struct Transcription {
    pub text: String,
    pub confidence: Option<f32>,
}

/// Narrow speech-to-text seam; the HTTP implementation lives in
/// [`SpeechClient`].
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn recognize(&self, audio: &[u8], config: &RecognizeConfig) -> Result<Transcription>;
}

/// Completed transcription tied to its source audio.
#[derive(Debug, Clone)]
pub struct TranscriptionResult {
    pub transcript: String,
    pub confidence: Option<f32>,
    pub audio_file: PathBuf,
}

impl TranscriptionResult {
    /// Empty transcript marker; downstream renders the localized apology.
    pub fn empty(audio_file: PathBuf) -> Self {
        Self {
            transcript: String::new(),
            confidence: None,
            audio_file,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.transcript.trim().is_empty()
    }
}

/// Options for one trip through the retry ladder.
#[derive(Debug, Clone)]
pub struct TranscribeOptions {
    pub language: String,
    pub speech_speed: SpeechSpeed,
    /// True once the ladder (or an explicit retry) is re-attempting.
    pub retry_attempt: bool,
    pub model: Option<String>,
    pub use_enhanced: bool,
}

impl TranscribeOptions {
    pub fn new(language: impl Into<String>, speech_speed: SpeechSpeed) -> Self {
        Self {
            language: language.into(),
            speech_speed,
            retry_attempt: false,
            model: None,
            use_enhanced: false,
        }
    }

    fn config(&self) -> RecognizeConfig {
        RecognizeConfig {
            language: self.language.clone(),
            model: self.model.clone(),
            use_enhanced: self.use_enhanced,
            simple: false,
            encoding: None,
        }
    }

    fn simple_config(&self) -> RecognizeConfig {
        RecognizeConfig {
            language: self.language.clone(),
            model: None,
            use_enhanced: false,
            simple: true,
            encoding: None,
        }
    }
}

/// Named recognition parameter sets cycled by explicit retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStrategy {
    EnhancedLongForm,
    VideoProfile,
    CommandAndSearch,
}

impl RetryStrategy {
    /// Strategy for the given attempt number; wraps around after the
    /// last one.
    pub fn for_attempt(attempt: u32) -> Self {
        match attempt % 3 {
            0 => RetryStrategy::EnhancedLongForm,
            1 => RetryStrategy::VideoProfile,
            _ => RetryStrategy::CommandAndSearch,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RetryStrategy::EnhancedLongForm => "enhanced-long-form",
            RetryStrategy::VideoProfile => "video-profile",
            RetryStrategy::CommandAndSearch => "command-and-search",
        }
    }

    pub fn options(&self, language: &str, speech_speed: SpeechSpeed) -> TranscribeOptions {
        let (model, use_enhanced) = match self {
            RetryStrategy::EnhancedLongForm => ("latest_long", true),
            RetryStrategy::VideoProfile => ("video", true),
            RetryStrategy::CommandAndSearch => ("command_and_search", false),
        };
        TranscribeOptions {
            language: language.to_string(),
            speech_speed,
            retry_attempt: true,
            model: Some(model.to_string()),
            use_enhanced,
        }
    }
}

/// Drives the collaborator through the retry ladder.
pub struct Transcriber {
    client: Arc<dyn SpeechToText>,
}

impl Transcriber {
    pub fn new(client: Arc<dyn SpeechToText>) -> Self {
        Self { client }
    }

    /// Transcribe an audio file.
    ///
    /// The ladder: a failed first attempt propagates; a failed retry
    /// gets one simple-settings attempt and is then absorbed into an
    /// empty result; an empty first attempt is retried once with a more
    /// sensitive model before giving up.
    pub async fn transcribe(
        &self,
        file: &Path,
        options: &TranscribeOptions,
        token: &CancellationToken,
    ) -> Result<TranscriptionResult> {
        let audio = tokio::fs::read(file)
            .await
            .with_context(|| format!("failed to read audio file {}", file.display()))?;
        let encoding = encoding_for(file);
        if token.is_cancelled() {
            return Ok(TranscriptionResult::empty(file.to_path_buf()));
        }

        let mut config = options.config();
        config.encoding = encoding;
        let first = self.client.recognize(&audio, &config).await;
        if token.is_cancelled() {
            return Ok(TranscriptionResult::empty(file.to_path_buf()));
        }

        let first = match first {
            Ok(t) => t,
            Err(e) if options.retry_attempt => {
                warn!("retry transcription failed, trying simple settings: {}", e);
                return self.absorb_with_simple(&audio, file, options, encoding, token).await;
            }
            Err(e) => return Err(e),
        };

        if !first.text.trim().is_empty() {
            return Ok(TranscriptionResult {
                transcript: first.text,
                confidence: first.confidence,
                audio_file: file.to_path_buf(),
            });
        }
        if options.retry_attempt {
            return Ok(TranscriptionResult::empty(file.to_path_buf()));
        }

        // Empty on the first try: once more with a model tuned to how
        // the speaker talks.
        let model = match options.speech_speed {
            SpeechSpeed::Fast => "video",
            SpeechSpeed::Normal => "latest_long",
        };
        info!("empty transcript, retrying with the {} model", model);
        let retry_options = TranscribeOptions {
            retry_attempt: true,
            model: Some(model.to_string()),
            use_enhanced: true,
            ..options.clone()
        };
        let mut retry_config = retry_options.config();
        retry_config.encoding = encoding;

        let second = self.client.recognize(&audio, &retry_config).await;
        if token.is_cancelled() {
            return Ok(TranscriptionResult::empty(file.to_path_buf()));
        }
        match second {
            Ok(t) => Ok(TranscriptionResult {
                transcript: t.text,
                confidence: t.confidence,
                audio_file: file.to_path_buf(),
            }),
            Err(e) => {
                warn!("model retry failed, trying simple settings: {}", e);
                self.absorb_with_simple(&audio, file, options, encoding, token).await
            }
        }
    }

    /// Final rung: bare settings, and any failure becomes an empty
    /// result instead of an error.
    async fn absorb_with_simple(
        &self,
        audio: &[u8],
        file: &Path,
        options: &TranscribeOptions,
        encoding: Option<&'static str>,
        token: &CancellationToken,
    ) -> Result<TranscriptionResult> {
        let mut config = options.simple_config();
        config.encoding = encoding;
        let result = self.client.recognize(audio, &config).await;
        if token.is_cancelled() {
            return Ok(TranscriptionResult::empty(file.to_path_buf()));
        }
        match result {
            Ok(t) => Ok(TranscriptionResult {
                transcript: t.text,
                confidence: t.confidence,
                audio_file: file.to_path_buf(),
            }),
            Err(e) => {
                warn!("simple-settings transcription failed as well: {}", e);
                Ok(TranscriptionResult::empty(file.to_path_buf()))
            }
        }
    }
}

/// Encoding hint for the recognizer. WAV and MP4 headers are
/// self-describing, so those stay unset.
fn encoding_for(path: &Path) -> Option<&'static str> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("webm") => Some("WEBM_OPUS"),
        Some(ext) if ext.eq_ignore_ascii_case("ogg") => Some("OGG_OPUS"),
        _ => None,
    }
}
