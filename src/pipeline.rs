//! The processing pipeline behind every endpoint.
//!
//! Handlers validate a request, hand it to the pipeline and return
//! immediately; everything after acceptance is reported through the
//! event publisher. One operation runs at a time per session, and a
//! cancellation suppresses all of its later output.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::answer::{
    split_response, AnswerGenerator, AnswerRequest, AnswerResult, UNEXTRACTED_PLACEHOLDER,
};
use crate::audio::{self, AudioStore, Recorder, StartOptions};
use crate::error::PipelineError;
use crate::events::{EventPublisher, PipelineEvent};
use crate::locale;
use crate::params::RequestParams;
use crate::session::{resolve_context, SessionStore};
use crate::stt::{RetryStrategy, TranscribeOptions, Transcriber, TranscriptionResult};

/// Timing knobs kept separate from [`crate::Config`] so tests can
/// shrink the waits.
#[derive(Debug, Clone)]
pub struct PipelineTimings {
    /// Delay before rechecking a zero-length audio file.
    pub empty_recheck: Duration,
}

impl Default for PipelineTimings {
    fn default() -> Self {
        Self {
            empty_recheck: Duration::from_secs(2),
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    session: SessionStore,
    recorder: Recorder,
    store: AudioStore,
    transcriber: Arc<Transcriber>,
    answers: Arc<AnswerGenerator>,
    publisher: Arc<dyn EventPublisher>,
    timings: PipelineTimings,
}

impl Pipeline {
    pub fn new(
        session: SessionStore,
        recorder: Recorder,
        store: AudioStore,
        transcriber: Arc<Transcriber>,
        answers: Arc<AnswerGenerator>,
        publisher: Arc<dyn EventPublisher>,
        timings: PipelineTimings,
    ) -> Self {
        Self {
            session,
            recorder,
            store,
            transcriber,
            answers,
            publisher,
            timings,
        }
    }

    pub fn session(&self) -> &SessionStore {
        &self.session
    }

    fn emit(&self, event: PipelineEvent) {
        self.publisher.emit(event);
    }

    // ========================================================================
    // Entry points called by the HTTP layer
    // ========================================================================

    /// Begin a capture. A new recording invalidates the retry counter.
    pub async fn start_recording(&self, duration_secs: Option<u64>) -> Result<(), PipelineError> {
        if self.session.is_recording() {
            return Err(PipelineError::AlreadyRecording);
        }
        let path = self
            .recorder
            .start(StartOptions { duration_secs }, self.fault_hook())
            .await?;
        self.session.set_recording(true);
        self.session.set_current_output_file(Some(path.clone()));
        self.session.reset_retry_count();
        info!("recording started: {}", path.display());
        Ok(())
    }

    /// Stop the capture and process the recorded file in the background.
    pub async fn stop_and_process(&self, params: RequestParams) -> Result<(), PipelineError> {
        let path = self.recorder.stop().await?;
        self.session.set_recording(false);
        self.session.set_current_output_file(None);
        self.spawn_default(path, params);
        Ok(())
    }

    /// Persist an uploaded audio body for later processing.
    pub async fn save_upload(
        &self,
        original_name: Option<&str>,
        bytes: &[u8],
    ) -> anyhow::Result<PathBuf> {
        self.store.save_upload(original_name, bytes).await
    }

    /// Process an already-saved upload in the background.
    pub fn process_upload(&self, file: PathBuf, params: RequestParams) {
        self.spawn_default(file, params);
    }

    /// Re-transcribe the file named in the request, or the last
    /// processed one, with the next retry strategy.
    pub fn process_retry(&self, params: RequestParams) -> Result<(), PipelineError> {
        let file = params
            .audio_file
            .clone()
            .or_else(|| self.session.last_processed_file())
            .ok_or(PipelineError::NoAudioAvailable)?;
        // Switching files resets the counter before the strategy is picked.
        self.session.set_last_processed_file(file.clone());
        let attempt = self.session.next_retry_attempt();
        let strategy = RetryStrategy::for_attempt(attempt);
        info!(
            "transcription retry {} using the {} strategy",
            attempt + 1,
            strategy.name()
        );
        let options = strategy.options(&params.speech_language, params.speech_speed);
        self.spawn_operation(file, options, params);
        Ok(())
    }

    /// Send the audio itself to the answer model, skipping separate
    /// transcription.
    pub fn process_direct(&self, params: RequestParams) -> Result<(), PipelineError> {
        let file = params
            .audio_file
            .clone()
            .or_else(|| self.session.last_processed_file())
            .ok_or(PipelineError::NoAudioAvailable)?;
        self.session.set_last_processed_file(file.clone());
        self.session.reset_retry_count();
        let pipeline = self.clone();
        let token = self.session.cancel_token();
        tokio::spawn(async move { pipeline.run_direct(file, params, token).await });
        Ok(())
    }

    /// Stream an answer for a transcript the client already has.
    pub fn process_transcript(
        &self,
        transcript: String,
        processed_directly: bool,
        params: RequestParams,
    ) {
        let pipeline = self.clone();
        let token = self.session.cancel_token();
        tokio::spawn(async move {
            pipeline
                .run_transcript(transcript, processed_directly, params, token)
                .await;
        });
    }

    /// Cancel whatever is in flight and acknowledge it immediately.
    pub fn cancel(&self) {
        info!("cancelling in-flight processing");
        self.session.cancel_current();
        self.emit(PipelineEvent::ProcessingCancelled {
            message: "Processing cancelled".to_string(),
        });
    }

    // ========================================================================
    // Background operations
    // ========================================================================

    fn fault_hook(&self) -> audio::FaultHook {
        let session = self.session.clone();
        let publisher = Arc::clone(&self.publisher);
        Arc::new(move |fault| {
            session.set_recording(false);
            session.set_current_output_file(None);
            publisher.emit(PipelineEvent::Error {
                message: fault.message().to_string(),
            });
        })
    }

    fn spawn_default(&self, file: PathBuf, params: RequestParams) {
        self.session.set_last_processed_file(file.clone());
        let options = TranscribeOptions::new(params.speech_language.clone(), params.speech_speed);
        self.spawn_operation(file, options, params);
    }

    fn spawn_operation(&self, file: PathBuf, options: TranscribeOptions, params: RequestParams) {
        let pipeline = self.clone();
        // Captured once so a cancellation cannot leak into operations
        // started after the token re-arms.
        let token = self.session.cancel_token();
        tokio::spawn(async move {
            pipeline.run_operation(file, options, params, token).await;
        });
    }

    async fn run_operation(
        self,
        file: PathBuf,
        options: TranscribeOptions,
        params: RequestParams,
        token: CancellationToken,
    ) {
        let operation = Uuid::new_v4();
        info!("processing {} (operation {})", file.display(), operation);
        self.emit(PipelineEvent::Processing);
        if token.is_cancelled() {
            return;
        }

        let validated = match audio::validate(&file, self.timings.empty_recheck).await {
            Ok(v) => v,
            Err(e) => {
                if !token.is_cancelled() {
                    error!("audio validation failed: {}", e);
                    self.emit(PipelineEvent::Error {
                        message: e.to_string(),
                    });
                }
                return;
            }
        };
        if token.is_cancelled() {
            return;
        }

        let result = match self
            .transcriber
            .transcribe(&validated.path, &options, &token)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                // A hard first-attempt failure renders the same as
                // silence: an empty transcript with the apology answer.
                error!("transcription failed: {}", e);
                TranscriptionResult::empty(validated.path.clone())
            }
        };
        if token.is_cancelled() {
            return;
        }

        self.deliver(result, &params, &token, false).await;
        self.prune_after().await;
    }

    /// Turn a transcription into an answer and publish the outcome.
    async fn deliver(
        &self,
        result: TranscriptionResult,
        params: &RequestParams,
        token: &CancellationToken,
        processed_directly: bool,
    ) {
        let audio_file = Some(result.audio_file.display().to_string());

        if result.is_empty() {
            // Nothing was recognized; apologize instead of guessing.
            info!("no speech recognized in {}", result.audio_file.display());
            if !token.is_cancelled() {
                self.emit(PipelineEvent::Update {
                    transcript: String::new(),
                    answer: locale::apology(&params.language).to_string(),
                    audio_file,
                    is_follow_up: params.is_follow_up,
                });
            }
            return;
        }

        let transcript = result.transcript.trim().to_string();
        let previous_question = resolve_context(&self.session, params.is_follow_up, &transcript);
        let request = AnswerRequest {
            transcript: transcript.clone(),
            language: params.language.clone(),
            question_context: params.question_context.clone(),
            custom_context: params.custom_context.clone(),
            previous_question,
        };

        if params.use_streaming {
            self.stream_answer(request, transcript, audio_file, params, token, processed_directly)
                .await;
            return;
        }

        match self.answers.answer(&request).await {
            Ok(answer) => {
                if token.is_cancelled() {
                    return;
                }
                self.emit(update_event(&AnswerResult {
                    transcript,
                    answer,
                    audio_file,
                    is_follow_up: params.is_follow_up,
                    processed_directly,
                }));
            }
            Err(e) => {
                if token.is_cancelled() {
                    return;
                }
                error!("answer generation failed: {}", e);
                self.emit(PipelineEvent::Error {
                    message: PipelineError::AnswerGeneration(e.to_string()).to_string(),
                });
                self.emit(PipelineEvent::Update {
                    transcript,
                    answer: format!("{}{}", locale::error_prefix(&params.language), e),
                    audio_file,
                    is_follow_up: params.is_follow_up,
                });
            }
        }
    }

    /// Stream answer fragments as they arrive, checking the token
    /// before every emission.
    async fn stream_answer(
        &self,
        request: AnswerRequest,
        transcript: String,
        audio_file: Option<String>,
        params: &RequestParams,
        token: &CancellationToken,
        processed_directly: bool,
    ) {
        if token.is_cancelled() {
            return;
        }
        self.emit(PipelineEvent::Transcript {
            transcript: transcript.clone(),
        });

        let mut fragments = match self.answers.answer_stream(&request).await {
            Ok(rx) => rx,
            Err(e) => {
                if token.is_cancelled() {
                    return;
                }
                error!("failed to open the answer stream: {}", e);
                self.emit(PipelineEvent::Error {
                    message: PipelineError::AnswerGeneration(e.to_string()).to_string(),
                });
                self.emit(PipelineEvent::StreamError {
                    error: format!("{}{}", locale::error_prefix(&params.language), e),
                });
                return;
            }
        };

        let mut full_answer = String::new();
        while let Some(fragment) = fragments.recv().await {
            if token.is_cancelled() {
                // Dropping the receiver tells the producer to stop.
                info!("stream cancelled, discarding remaining fragments");
                return;
            }
            match fragment {
                Ok(chunk) => {
                    full_answer.push_str(&chunk);
                    self.emit(PipelineEvent::StreamChunk {
                        chunk,
                        transcript: transcript.clone(),
                        audio_file: audio_file.clone(),
                        processed_directly,
                    });
                }
                Err(e) => {
                    error!("answer stream failed: {}", e);
                    self.emit(PipelineEvent::Error {
                        message: PipelineError::AnswerGeneration(e.to_string()).to_string(),
                    });
                    self.emit(PipelineEvent::StreamError {
                        error: format!("{}{}", locale::error_prefix(&params.language), e),
                    });
                    return;
                }
            }
        }
        if token.is_cancelled() {
            return;
        }

        self.emit(stream_end_event(&AnswerResult {
            transcript,
            answer: full_answer,
            audio_file,
            is_follow_up: params.is_follow_up,
            processed_directly,
        }));
    }

    async fn run_direct(self, file: PathBuf, params: RequestParams, token: CancellationToken) {
        info!("direct processing {}", file.display());
        self.emit(PipelineEvent::Processing);
        if token.is_cancelled() {
            return;
        }

        let validated = match audio::validate(&file, self.timings.empty_recheck).await {
            Ok(v) => v,
            Err(e) => {
                if !token.is_cancelled() {
                    error!("audio validation failed: {}", e);
                    self.emit(PipelineEvent::Error {
                        message: e.to_string(),
                    });
                }
                return;
            }
        };
        let audio_bytes = match tokio::fs::read(&validated.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                if !token.is_cancelled() {
                    error!("failed to read {}: {}", validated.path.display(), e);
                    self.emit(PipelineEvent::Error {
                        message: format!("failed to read audio file: {}", e),
                    });
                }
                return;
            }
        };
        if token.is_cancelled() {
            return;
        }

        let audio_file = Some(validated.path.display().to_string());
        let previous_question = if params.is_follow_up {
            resolve_context(&self.session, true, "")
        } else {
            None
        };
        let request = AnswerRequest {
            transcript: String::new(),
            language: params.language.clone(),
            question_context: params.question_context.clone(),
            custom_context: params.custom_context.clone(),
            previous_question,
        };

        let response = match self
            .answers
            .answer_from_audio(&audio_bytes, audio::mime_type(&validated.path), &request)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                if token.is_cancelled() {
                    return;
                }
                error!("direct answer generation failed: {}", e);
                self.emit(PipelineEvent::Error {
                    message: PipelineError::AnswerGeneration(e.to_string()).to_string(),
                });
                self.emit(PipelineEvent::Update {
                    transcript: String::new(),
                    answer: format!("{}{}", locale::error_prefix(&params.language), e),
                    audio_file,
                    is_follow_up: params.is_follow_up,
                });
                return;
            }
        };
        if token.is_cancelled() {
            return;
        }

        let parts = split_response(&response);
        // A placeholder is shown to the client but never stored as
        // follow-up context.
        if !params.is_follow_up && parts.transcript != UNEXTRACTED_PLACEHOLDER {
            resolve_context(&self.session, false, &parts.transcript);
        }
        self.emit(PipelineEvent::Transcript {
            transcript: parts.transcript.clone(),
        });
        if token.is_cancelled() {
            return;
        }
        self.emit(update_event(&AnswerResult {
            transcript: parts.transcript,
            answer: parts.answer,
            audio_file,
            is_follow_up: params.is_follow_up,
            processed_directly: true,
        }));
        self.prune_after().await;
    }

    async fn run_transcript(
        self,
        transcript: String,
        processed_directly: bool,
        params: RequestParams,
        token: CancellationToken,
    ) {
        info!("streaming an answer for a provided transcript");
        self.emit(PipelineEvent::Processing);
        if token.is_cancelled() {
            return;
        }

        let transcript = transcript.trim().to_string();
        let previous_question = resolve_context(&self.session, params.is_follow_up, &transcript);
        let request = AnswerRequest {
            transcript: transcript.clone(),
            language: params.language.clone(),
            question_context: params.question_context.clone(),
            custom_context: params.custom_context.clone(),
            previous_question,
        };
        self.stream_answer(request, transcript, None, &params, &token, processed_directly)
            .await;
    }

    /// Drop files the session no longer references.
    async fn prune_after(&self) {
        let current = self.session.current_output_file();
        let last = self.session.last_processed_file();
        let keep: Vec<&Path> = [current.as_deref(), last.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        match self.store.prune_except(&keep).await {
            Ok(0) => {}
            Ok(removed) => debug!("pruned {} stale audio files", removed),
            Err(e) => warn!("audio prune failed: {}", e),
        }
    }
}

fn update_event(result: &AnswerResult) -> PipelineEvent {
    PipelineEvent::Update {
        transcript: result.transcript.clone(),
        answer: result.answer.clone(),
        audio_file: result.audio_file.clone(),
        is_follow_up: result.is_follow_up,
    }
}

fn stream_end_event(result: &AnswerResult) -> PipelineEvent {
    PipelineEvent::StreamEnd {
        full_answer: result.answer.clone(),
        transcript: result.transcript.clone(),
        audio_file: result.audio_file.clone(),
        is_follow_up: result.is_follow_up,
        processed_directly: result.processed_directly,
    }
}
