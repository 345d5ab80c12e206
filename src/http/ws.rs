use super::state::AppState;
use crate::events::ClientEvent;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// GET /api/v1/events
/// Upgrade to the push-event channel
pub async fn events(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> impl IntoResponse {
    upgrade.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    info!("Event channel connected");
    let (mut sender, mut receiver) = socket.split();
    let mut events = state.events.subscribe();

    // Forward pipeline events to this client until it goes away.
    let send_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            error!("Failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event channel lagged, {} events dropped", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // The only inbound frame clients send is a cancel request.
    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(ClientEvent::Cancel) => state.pipeline.cancel(),
                Err(_) => debug!("Ignoring unrecognized client frame: {}", text),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    send_task.abort();
    info!("Event channel disconnected");
}
