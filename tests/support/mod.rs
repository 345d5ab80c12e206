// Shared test doubles: scripted collaborators, a recording event
// publisher and a pipeline builder wired for fast timings.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use voice_qa::answer::{AnswerGenerator, AnswerModel};
use voice_qa::audio::{AudioStore, Recorder, RecorderConfig};
use voice_qa::events::{EventPublisher, PipelineEvent};
use voice_qa::pipeline::PipelineTimings;
use voice_qa::stt::{RecognizeConfig, SpeechToText, Transcriber, Transcription};
use voice_qa::{Pipeline, SessionStore};

// ============================================================================
// Speech collaborator double
// ============================================================================

/// Scripted recognizer: returns queued responses in order and records
/// every config it was called with. An exhausted queue yields empty
/// transcriptions.
pub struct MockSpeech {
    responses: Mutex<VecDeque<Result<Transcription>>>,
    calls: Mutex<Vec<RecognizeConfig>>,
}

impl MockSpeech {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn push_text(&self, text: &str) {
        self.responses.lock().unwrap().push_back(Ok(Transcription {
            text: text.to_string(),
            confidence: Some(0.9),
        }));
    }

    pub fn push_error(&self, message: &str) {
        self.responses
            .lock()
            .unwrap()
            .push_back(Err(anyhow!("{}", message)));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_configs(&self) -> Vec<RecognizeConfig> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechToText for MockSpeech {
    async fn recognize(&self, _audio: &[u8], config: &RecognizeConfig) -> Result<Transcription> {
        self.calls.lock().unwrap().push(config.clone());
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(Transcription::default()),
        }
    }
}

// ============================================================================
// Answer collaborator double
// ============================================================================

/// Scripted answer model covering the batch, streaming and direct paths.
pub struct MockModel {
    pub answer: Mutex<String>,
    pub chunks: Mutex<Vec<String>>,
    pub direct_response: Mutex<String>,
    /// Fail batch and direct calls.
    pub fail: AtomicBool,
    /// Fail opening the stream.
    pub fail_stream_open: AtomicBool,
    /// Emit an error in place of the fragment at this index.
    pub stream_error_at: Mutex<Option<usize>>,
    pub prompts: Mutex<Vec<String>>,
    pub mime_types: Mutex<Vec<String>>,
}

impl MockModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new("a helpful answer".to_string()),
            chunks: Mutex::new(vec!["part one ".to_string(), "part two".to_string()]),
            direct_response: Mutex::new(
                "Question: what was asked?\nAnswer: what was answered.".to_string(),
            ),
            fail: AtomicBool::new(false),
            fail_stream_open: AtomicBool::new(false),
            stream_error_at: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
            mime_types: Mutex::new(Vec::new()),
        })
    }

    pub fn set_answer(&self, answer: &str) {
        *self.answer.lock().unwrap() = answer.to_string();
    }

    pub fn set_chunks(&self, chunks: &[&str]) {
        *self.chunks.lock().unwrap() = chunks.iter().map(|c| c.to_string()).collect();
    }

    pub fn set_direct_response(&self, response: &str) {
        *self.direct_response.lock().unwrap() = response.to_string();
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn generate_calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl AnswerModel for MockModel {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("model offline"));
        }
        Ok(self.answer.lock().unwrap().clone())
    }

    async fn generate_stream(&self, prompt: &str) -> Result<mpsc::Receiver<Result<String>>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail_stream_open.load(Ordering::SeqCst) {
            return Err(anyhow!("stream refused"));
        }
        let chunks = self.chunks.lock().unwrap().clone();
        let error_at = *self.stream_error_at.lock().unwrap();
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(async move {
            for (index, chunk) in chunks.into_iter().enumerate() {
                if error_at == Some(index) {
                    let _ = tx.send(Err(anyhow!("stream interrupted"))).await;
                    return;
                }
                if tx.send(Ok(chunk)).await.is_err() {
                    return;
                }
            }
        });
        Ok(rx)
    }

    async fn generate_from_audio(
        &self,
        _audio: &[u8],
        mime_type: &str,
        prompt: &str,
    ) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.mime_types.lock().unwrap().push(mime_type.to_string());
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("model offline"));
        }
        Ok(self.direct_response.lock().unwrap().clone())
    }
}

// ============================================================================
// Event capture
// ============================================================================

type EmitHook = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Publisher that records every event in order. An optional hook runs
/// synchronously inside emit, which makes mid-operation cancellation
/// deterministic in tests.
pub struct RecordingPublisher {
    events: Mutex<Vec<PipelineEvent>>,
    hook: Mutex<Option<EmitHook>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            hook: Mutex::new(None),
        })
    }

    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn set_hook(&self, hook: impl Fn(&PipelineEvent) + Send + Sync + 'static) {
        *self.hook.lock().unwrap() = Some(Arc::new(hook));
    }

    pub fn count_matching(&self, pred: impl Fn(&PipelineEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl EventPublisher for RecordingPublisher {
    fn emit(&self, event: PipelineEvent) {
        self.events.lock().unwrap().push(event.clone());
        // Clone the hook out so a re-entrant emit cannot deadlock.
        let hook = self.hook.lock().unwrap().clone();
        if let Some(hook) = hook {
            hook(&event);
        }
    }
}

/// Wire-format tag of an event, for asserting whole sequences at once.
pub fn kind(event: &PipelineEvent) -> &'static str {
    match event {
        PipelineEvent::Processing => "processing",
        PipelineEvent::Transcript { .. } => "transcript",
        PipelineEvent::Update { .. } => "update",
        PipelineEvent::StreamChunk { .. } => "streamChunk",
        PipelineEvent::StreamEnd { .. } => "streamEnd",
        PipelineEvent::StreamError { .. } => "streamError",
        PipelineEvent::Error { .. } => "error",
        PipelineEvent::ProcessingCancelled { .. } => "processingCancelled",
    }
}

pub fn kinds(events: &[PipelineEvent]) -> Vec<&'static str> {
    events.iter().map(kind).collect()
}

/// Poll until the recorded events satisfy the predicate.
pub async fn wait_for_events(
    publisher: &RecordingPublisher,
    pred: impl Fn(&[PipelineEvent]) -> bool,
) {
    for _ in 0..300 {
        if pred(&publisher.events()) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for events, got: {:#?}", publisher.events());
}

// ============================================================================
// Pipeline wiring
// ============================================================================

pub const CANCEL_REARM: Duration = Duration::from_millis(50);

pub fn build_pipeline(
    speech: Arc<MockSpeech>,
    model: Arc<MockModel>,
    publisher: Arc<RecordingPublisher>,
    audio_dir: &Path,
) -> Pipeline {
    build_pipeline_with_bin(speech, model, publisher, audio_dir, "arecord")
}

pub fn build_pipeline_with_bin(
    speech: Arc<MockSpeech>,
    model: Arc<MockModel>,
    publisher: Arc<RecordingPublisher>,
    audio_dir: &Path,
    capture_bin: &str,
) -> Pipeline {
    let session = SessionStore::new(CANCEL_REARM);
    let store = AudioStore::new(audio_dir);
    let recorder = Recorder::new(
        RecorderConfig {
            capture_bin: capture_bin.to_string(),
            sample_rate: 16000,
            channels: 1,
            max_duration_secs: 60,
            stop_grace: Duration::from_millis(50),
        },
        store.clone(),
    );
    Pipeline::new(
        session,
        recorder,
        store,
        Arc::new(Transcriber::new(speech)),
        Arc::new(AnswerGenerator::new(model)),
        publisher,
        PipelineTimings {
            empty_recheck: Duration::from_millis(50),
        },
    )
}

/// Write a small but real WAV file.
pub fn write_wav(path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for i in 0..1600i32 {
        writer.write_sample(((i % 100) * 50) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}
