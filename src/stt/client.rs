use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{RecognizeConfig, SpeechToText, Transcription};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// REST client for a Google-style `speech:recognize` endpoint.
pub struct SpeechClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct RecognizeRequest<'a> {
    config: RequestConfig<'a>,
    audio: RequestAudio,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestConfig<'a> {
    language_code: &'a str,
    enable_automatic_punctuation: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    use_enhanced: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct RequestAudio {
    content: String,
}

#[derive(Debug, Deserialize)]
struct RecognizeResponse {
    #[serde(default)]
    results: Vec<SpeechResult>,
}

#[derive(Debug, Deserialize)]
struct SpeechResult {
    #[serde(default)]
    alternatives: Vec<SpeechAlternative>,
}

#[derive(Debug, Deserialize)]
struct SpeechAlternative {
    #[serde(default)]
    transcript: String,
    confidence: Option<f32>,
}

impl SpeechClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed to build speech HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn request_body<'a>(audio: &[u8], config: &'a RecognizeConfig) -> RecognizeRequest<'a> {
        let request_config = if config.simple {
            RequestConfig {
                language_code: &config.language,
                enable_automatic_punctuation: true,
                model: None,
                use_enhanced: None,
                encoding: config.encoding,
            }
        } else {
            RequestConfig {
                language_code: &config.language,
                enable_automatic_punctuation: true,
                model: config.model.as_deref(),
                use_enhanced: config.use_enhanced.then_some(true),
                encoding: config.encoding,
            }
        };
        RecognizeRequest {
            config: request_config,
            audio: RequestAudio {
                content: base64::engine::general_purpose::STANDARD.encode(audio),
            },
        }
    }
}

#[async_trait]
impl SpeechToText for SpeechClient {
    async fn recognize(&self, audio: &[u8], config: &RecognizeConfig) -> Result<Transcription> {
        let url = format!("{}/v1/speech:recognize?key={}", self.base_url, self.api_key);
        let body = Self::request_body(audio, config);
        debug!(
            "recognize request: language={} model={:?} simple={}",
            config.language, config.model, config.simple
        );

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("speech recognition request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "speech recognition failed with status {}: {}",
                status,
                detail
            ));
        }

        let parsed: RecognizeResponse = response
            .json()
            .await
            .context("failed to parse speech recognition response")?;

        let mut confidence = None;
        let mut pieces = Vec::new();
        for result in &parsed.results {
            let Some(alternative) = result.alternatives.first() else {
                continue;
            };
            let text = alternative.transcript.trim();
            if text.is_empty() {
                continue;
            }
            if confidence.is_none() {
                confidence = alternative.confidence;
            }
            pieces.push(text.to_string());
        }

        Ok(Transcription {
            text: pieces.join(" "),
            confidence,
        })
    }
}
