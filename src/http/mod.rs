//! HTTP API server for client shells (desktop overlay, browser panel)
//!
//! This module provides the REST surface for driving the pipeline:
//! - POST /api/v1/start - Begin a capture
//! - POST /api/v1/stop - Stop and process the recording
//! - POST /api/v1/upload - Process client-captured audio
//! - POST /api/v1/retry, /api/v1/retry-upload - Re-transcribe with the next strategy
//! - POST /api/v1/gemini, /api/v1/gemini-upload - Direct audio understanding
//! - POST /api/v1/stream - Stream an answer for a known transcript
//! - POST /api/v1/cancel - Cancel the in-flight operation
//! - GET /api/v1/status - Session snapshot
//! - GET /api/v1/events - WebSocket push-event channel
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;
mod ws;

pub use routes::create_router;
pub use state::AppState;
