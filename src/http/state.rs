use crate::events::ChannelPublisher;
use crate::pipeline::Pipeline;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The processing pipeline every endpoint drives
    pub pipeline: Pipeline,
    /// Event fan-out the WebSocket connections subscribe to
    pub events: Arc<ChannelPublisher>,
    /// Answer language used when a request names none
    pub default_language: String,
}

impl AppState {
    pub fn new(pipeline: Pipeline, events: Arc<ChannelPublisher>, default_language: String) -> Self {
        Self {
            pipeline,
            events,
            default_language,
        }
    }
}
