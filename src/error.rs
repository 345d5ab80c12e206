use std::path::PathBuf;
use thiserror::Error;

/// Category of a capture-device failure, derived from the capture
/// process's diagnostic output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFault {
    NotFound,
    PermissionDenied,
    Generic,
}

impl DeviceFault {
    /// User-facing description for the categorized `error` event.
    pub fn message(&self) -> &'static str {
        match self {
            DeviceFault::NotFound => "Audio device not found",
            DeviceFault::PermissionDenied => "Permission to use the audio device was denied",
            DeviceFault::Generic => "The audio device failed while recording",
        }
    }
}

/// Errors surfaced by the processing pipeline.
///
/// Cancellation deliberately has no variant here: a cancelled operation
/// is a suppressed success, not a failure.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error("{}", .0.message())]
    Device(DeviceFault),

    #[error("audio file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("audio file is empty: {}", .0.display())]
    EmptyFile(PathBuf),

    #[error("audio file disappeared while waiting for it to be written: {}", .0.display())]
    FileDisappeared(PathBuf),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("answer generation failed: {0}")]
    AnswerGeneration(String),

    #[error("no audio available to process")]
    NoAudioAvailable,

    #[error("audio capture failed: {0}")]
    CaptureFailed(String),
}
