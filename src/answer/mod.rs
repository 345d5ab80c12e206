//! Answer generation: the generative collaborator contract, prompt
//! construction and the direct audio-understanding path.

mod client;
mod extract;

pub use client::GenerativeClient;
pub use extract::{split_response, ExtractedAnswer, UNEXTRACTED_PLACEHOLDER};

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything the generator needs to answer one question.
#[derive(Debug, Clone, Default)]
pub struct AnswerRequest {
    pub transcript: String,
    /// Answer language code (`en` or `vi`).
    pub language: String,
    pub question_context: Option<String>,
    pub custom_context: Option<String>,
    /// Previous question, present only for follow-ups.
    pub previous_question: Option<String>,
}

/// Final outcome of one processing operation, as delivered to clients.
#[derive(Debug, Clone)]
pub struct AnswerResult {
    pub transcript: String,
    pub answer: String,
    pub audio_file: Option<String>,
    pub is_follow_up: bool,
    pub processed_directly: bool,
}

/// Narrow generative-model seam; the HTTP implementation lives in
/// [`GenerativeClient`]. Streamed answers arrive as ordered fragments
/// on the returned channel, which closes after the last one.
#[async_trait]
pub trait AnswerModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;

    async fn generate_stream(&self, prompt: &str) -> Result<mpsc::Receiver<Result<String>>>;

    async fn generate_from_audio(
        &self,
        audio: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String>;
}

/// Builds prompts and hands them to the model.
pub struct AnswerGenerator {
    model: Arc<dyn AnswerModel>,
}

impl AnswerGenerator {
    pub fn new(model: Arc<dyn AnswerModel>) -> Self {
        Self { model }
    }

    pub async fn answer(&self, request: &AnswerRequest) -> Result<String> {
        self.model.generate(&build_prompt(request)).await
    }

    pub async fn answer_stream(
        &self,
        request: &AnswerRequest,
    ) -> Result<mpsc::Receiver<Result<String>>> {
        self.model.generate_stream(&build_prompt(request)).await
    }

    /// Direct path: the model hears the audio itself and returns a
    /// labelled transcript-and-answer response.
    pub async fn answer_from_audio(
        &self,
        audio: &[u8],
        mime_type: &str,
        request: &AnswerRequest,
    ) -> Result<String> {
        self.model
            .generate_from_audio(audio, mime_type, &build_direct_prompt(request))
            .await
    }
}

fn language_name(code: &str) -> &'static str {
    match code {
        "vi" => "Vietnamese",
        _ => "English",
    }
}

fn push_context(prompt: &mut String, request: &AnswerRequest) {
    if let Some(topic) = &request.question_context {
        prompt.push_str(&format!("The question is about {}.\n", topic));
    }
    if let Some(extra) = &request.custom_context {
        prompt.push_str(&format!("Additional context: {}\n", extra));
    }
    if let Some(previous) = &request.previous_question {
        prompt.push_str(&format!(
            "The previous question was: \"{}\"\nTreat the new question as a follow-up to it.\n",
            previous
        ));
    }
}

fn build_prompt(request: &AnswerRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are a helpful assistant answering a spoken question.\n");
    prompt.push_str(&format!(
        "Answer in {}. Keep the answer clear and complete.\n",
        language_name(&request.language)
    ));
    push_context(&mut prompt, request);
    prompt.push_str(&format!("\nQuestion: {}", request.transcript));
    prompt
}

fn build_direct_prompt(request: &AnswerRequest) -> String {
    let mut prompt = String::new();
    prompt.push_str("Listen to the attached audio. It contains a spoken question.\n");
    prompt.push_str(&format!(
        "First transcribe the question, then answer it in {}.\n",
        language_name(&request.language)
    ));
    push_context(&mut prompt, request);
    prompt.push_str(
        "\nRespond in exactly this format:\nQuestion: <the transcribed question>\nAnswer: <your answer>",
    );
    prompt
}
