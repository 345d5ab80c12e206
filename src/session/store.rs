use serde::Serialize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const QUESTION_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Default)]
struct SessionState {
    recording: bool,
    current_output_file: Option<PathBuf>,
    last_processed_file: Option<PathBuf>,
    retry_count: u32,
    last_question: Option<String>,
}

/// Point-in-time view of the session for status queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub recording: bool,
    pub current_file: Option<String>,
    pub last_processed_file: Option<String>,
    pub has_last_question: bool,
    pub last_question_preview: Option<String>,
}

/// The single shared record of pipeline state.
///
/// All mutation goes through the setters so the invariants around the
/// retry counter and the cancellation token live in one place. Clones
/// share the same underlying state.
#[derive(Clone)]
pub struct SessionStore {
    state: Arc<Mutex<SessionState>>,
    cancel: Arc<Mutex<CancellationToken>>,
    cancel_rearm: Duration,
}

impl SessionStore {
    pub fn new(cancel_rearm: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            cancel: Arc::new(Mutex::new(CancellationToken::new())),
            cancel_rearm,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_recording(&self) -> bool {
        self.lock().recording
    }

    pub fn set_recording(&self, recording: bool) {
        self.lock().recording = recording;
    }

    pub fn current_output_file(&self) -> Option<PathBuf> {
        self.lock().current_output_file.clone()
    }

    pub fn set_current_output_file(&self, path: Option<PathBuf>) {
        self.lock().current_output_file = path;
    }

    pub fn last_processed_file(&self) -> Option<PathBuf> {
        self.lock().last_processed_file.clone()
    }

    /// Remember the file an operation ran on. Retry attempts only make
    /// sense against one file, so a different path resets the counter.
    pub fn set_last_processed_file(&self, path: PathBuf) {
        let mut state = self.lock();
        if state.last_processed_file.as_deref() != Some(path.as_path()) {
            state.retry_count = 0;
        }
        state.last_processed_file = Some(path);
    }

    pub fn retry_count(&self) -> u32 {
        self.lock().retry_count
    }

    pub fn reset_retry_count(&self) {
        self.lock().retry_count = 0;
    }

    /// Attempt number for an explicit retry; advances the counter.
    pub fn next_retry_attempt(&self) -> u32 {
        let mut state = self.lock();
        let attempt = state.retry_count;
        state.retry_count += 1;
        attempt
    }

    pub fn last_question(&self) -> Option<String> {
        self.lock().last_question.clone()
    }

    pub fn set_last_question(&self, question: Option<String>) {
        self.lock().last_question = question;
    }

    /// Token guarding the operation being started right now. Operations
    /// capture it once so a later cancellation cannot leak into work
    /// started after the token re-arms.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token().is_cancelled()
    }

    /// Cancel the in-flight operation. The token re-arms after the
    /// configured delay so the next operation starts unblocked.
    pub fn cancel_current(&self) {
        let token = self.cancel_token();
        token.cancel();
        debug!("cancellation armed, re-arming in {:?}", self.cancel_rearm);

        let slot = Arc::clone(&self.cancel);
        let delay = self.cancel_rearm;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut current = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            if current.is_cancelled() {
                *current = CancellationToken::new();
            }
        });
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            recording: state.recording,
            current_file: state
                .current_output_file
                .as_ref()
                .map(|p| p.display().to_string()),
            last_processed_file: state
                .last_processed_file
                .as_ref()
                .map(|p| p.display().to_string()),
            has_last_question: state.last_question.is_some(),
            last_question_preview: state
                .last_question
                .as_ref()
                .map(|q| q.chars().take(QUESTION_PREVIEW_CHARS).collect()),
        }
    }
}
