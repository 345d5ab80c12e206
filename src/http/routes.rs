use super::handlers;
use super::state::AppState;
use super::ws;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Recording control
        .route("/api/v1/start", post(handlers::start))
        .route("/api/v1/stop", post(handlers::stop))
        // Audio processing
        .route("/api/v1/upload", post(handlers::upload))
        .route("/api/v1/retry", post(handlers::retry))
        .route("/api/v1/retry-upload", post(handlers::retry_upload))
        .route("/api/v1/gemini", post(handlers::gemini))
        .route("/api/v1/gemini-upload", post(handlers::gemini_upload))
        .route("/api/v1/stream", post(handlers::stream))
        // Session control and queries
        .route("/api/v1/cancel", post(handlers::cancel))
        .route("/api/v1/status", get(handlers::status))
        // Push-event channel
        .route("/api/v1/events", get(ws::events))
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
