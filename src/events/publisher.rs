use tokio::sync::broadcast;
use tracing::debug;

use super::PipelineEvent;

/// Sink for pipeline events. The pipeline publishes through this trait
/// so the processing code never touches the transport.
pub trait EventPublisher: Send + Sync {
    fn emit(&self, event: PipelineEvent);
}

/// Fan-out publisher backed by a broadcast channel. Each connected
/// client subscribes and forwards frames over its own socket.
pub struct ChannelPublisher {
    tx: broadcast::Sender<PipelineEvent>,
}

impl ChannelPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.tx.subscribe()
    }
}

impl EventPublisher for ChannelPublisher {
    fn emit(&self, event: PipelineEvent) {
        // A send error only means no client is connected right now.
        if self.tx.send(event).is_err() {
            debug!("event dropped, no subscribers connected");
        }
    }
}
