//! Shared session state for the question-answering pipeline.
//!
//! One logical session exists per server process. The store tracks:
//! - Whether a capture is currently running and which file it writes
//! - The most recently processed audio file, for retries
//! - The retry counter that cycles the recognition strategies
//! - The previous question, for follow-up context
//! - The cancellation token for the in-flight operation

mod context;
mod store;

pub use context::resolve_context;
pub use store::{SessionSnapshot, SessionStore};
