//! Typed events exchanged with connected clients.
//!
//! Every frame on the wire is `{"event": "<name>", "data": {...}}` with
//! camelCase names on both sides of the envelope. Unit variants omit the
//! `data` member entirely.

mod publisher;

pub use publisher::{ChannelPublisher, EventPublisher};

use serde::{Deserialize, Serialize};

/// Events pushed from the pipeline to clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum PipelineEvent {
    /// An operation was accepted and is running.
    Processing,

    /// Transcript announced ahead of a streamed or direct answer.
    #[serde(rename_all = "camelCase")]
    Transcript { transcript: String },

    /// Terminal event of a batch operation.
    #[serde(rename_all = "camelCase")]
    Update {
        transcript: String,
        answer: String,
        audio_file: Option<String>,
        is_follow_up: bool,
    },

    /// One answer fragment of a streamed operation.
    #[serde(rename_all = "camelCase")]
    StreamChunk {
        chunk: String,
        transcript: String,
        audio_file: Option<String>,
        processed_directly: bool,
    },

    /// Terminal event of a streamed operation.
    #[serde(rename_all = "camelCase")]
    StreamEnd {
        full_answer: String,
        transcript: String,
        audio_file: Option<String>,
        is_follow_up: bool,
        processed_directly: bool,
    },

    /// A streamed operation failed after it started.
    #[serde(rename_all = "camelCase")]
    StreamError { error: String },

    /// Toast-style failure notice.
    #[serde(rename_all = "camelCase")]
    Error { message: String },

    /// Acknowledgement that an in-flight operation was cancelled.
    #[serde(rename_all = "camelCase")]
    ProcessingCancelled { message: String },
}

/// Frames clients may send on the event channel.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ClientEvent {
    Cancel,
}
