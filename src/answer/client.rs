use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use futures::StreamExt;
use reqwest_eventsource::{Event, EventSource};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error};

use super::AnswerModel;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const STREAM_CHANNEL_CAPACITY: usize = 32;

/// REST client for a Gemini-style `generateContent` endpoint, including
/// the SSE variant for streamed answers.
pub struct GenerativeClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerativeClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .context("failed to build answer HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        })
    }

    fn url(&self, action: &str) -> String {
        format!(
            "{}/v1beta/models/{}:{}?key={}",
            self.base_url, self.model, action, self.api_key
        )
    }

    fn request_for(parts: Vec<Part>) -> GenerateRequest {
        GenerateRequest {
            contents: vec![Content { parts }],
            generation_config: GenerationConfig { temperature: 0.7 },
        }
    }

    async fn generate_once(&self, request: &GenerateRequest) -> Result<String> {
        let response = self
            .http
            .post(self.url("generateContent"))
            .json(request)
            .send()
            .await
            .context("answer generation request failed")?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "answer generation failed with status {}: {}",
                status,
                detail
            ));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .context("failed to parse answer generation response")?;
        if let Some(reason) = parsed
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(anyhow!("answer generation was blocked: {}", reason));
        }

        let text = response_text(&parsed).trim().to_string();
        if text.is_empty() {
            return Err(anyhow!("answer generation returned no content"));
        }
        Ok(text)
    }
}

fn response_text(response: &GenerateResponse) -> String {
    let Some(candidate) = response.candidates.first() else {
        return String::new();
    };
    let Some(content) = &candidate.content else {
        return String::new();
    };
    content
        .parts
        .iter()
        .map(|p| p.text.as_str())
        .collect::<Vec<_>>()
        .join("")
}

/// One SSE message body, parsed the same way as a batch response but
/// tolerated when empty (keep-alive frames carry no candidates). The
/// fragment text is passed through untrimmed so the chunks concatenate
/// back into the exact full answer.
fn parse_stream_chunk(data: &str) -> Result<Option<String>> {
    let parsed: GenerateResponse =
        serde_json::from_str(data).context("failed to parse streamed answer chunk")?;
    let text = response_text(&parsed);
    if text.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(text))
    }
}

#[async_trait]
impl AnswerModel for GenerativeClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = Self::request_for(vec![Part::Text {
            text: prompt.to_string(),
        }]);
        self.generate_once(&request).await
    }

    async fn generate_stream(&self, prompt: &str) -> Result<mpsc::Receiver<Result<String>>> {
        let request = Self::request_for(vec![Part::Text {
            text: prompt.to_string(),
        }]);
        let builder = self
            .http
            .post(self.url("streamGenerateContent") + "&alt=sse")
            .json(&request);
        let mut source = EventSource::new(builder)
            .map_err(|e| anyhow!("failed to open answer stream: {}", e))?;

        let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
        tokio::spawn(async move {
            while let Some(event) = source.next().await {
                match event {
                    Ok(Event::Open) => debug!("answer stream opened"),
                    Ok(Event::Message(message)) => match parse_stream_chunk(&message.data) {
                        Ok(Some(text)) => {
                            // A closed receiver means the consumer gave
                            // up on this stream; stop producing.
                            if tx.send(Ok(text)).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            error!("bad answer stream chunk: {}", e);
                            let _ = tx.send(Err(e)).await;
                            break;
                        }
                    },
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(e) => {
                        let _ = tx.send(Err(anyhow!("answer stream failed: {}", e))).await;
                        break;
                    }
                }
            }
            source.close();
        });

        Ok(rx)
    }

    async fn generate_from_audio(
        &self,
        audio: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String> {
        let request = Self::request_for(vec![
            Part::Text {
                text: prompt.to_string(),
            },
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: mime_type.to_string(),
                    data: base64::engine::general_purpose::STANDARD.encode(audio),
                },
            },
        ]);
        self.generate_once(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_parts_serialize_as_inline_data() {
        let request = GenerativeClient::request_for(vec![
            Part::Text {
                text: "listen".to_string(),
            },
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: "audio/wav".to_string(),
                    data: "AQID".to_string(),
                },
            },
        ]);
        let value = serde_json::to_value(&request).unwrap();
        let parts = &value["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "listen");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "audio/wav");
        assert_eq!(parts[1]["inlineData"]["data"], "AQID");
        assert_eq!(value["generationConfig"]["temperature"], 0.7);
    }

    #[test]
    fn test_stream_chunks_keep_fragment_whitespace() {
        let chunk = r#"{"candidates":[{"content":{"parts":[{"text":"hello "}]}}]}"#;
        assert_eq!(parse_stream_chunk(chunk).unwrap(), Some("hello ".to_string()));

        let empty = r#"{"candidates":[]}"#;
        assert_eq!(parse_stream_chunk(empty).unwrap(), None);

        assert!(parse_stream_chunk("not json").is_err());
    }
}
