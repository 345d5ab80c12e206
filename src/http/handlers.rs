use super::state::AppState;
use crate::error::PipelineError;
use crate::params::{RawParams, RequestParams};
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StartRequest {
    /// Capture length in seconds, capped by the configured maximum
    pub duration: Option<u64>,

    /// Accepted for parity with the processing endpoints; the speed is
    /// re-sent with the stop request that triggers transcription
    pub speech_speed: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Fields carried by the multipart upload endpoints alongside the audio.
#[derive(Debug, Default)]
struct UploadBody {
    audio: Option<Vec<u8>>,
    file_name: Option<String>,
    raw: RawParams,
}

fn accepted(message: &str) -> Response {
    (
        StatusCode::OK,
        Json(StatusResponse {
            status: "processing".to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

fn reject(error: PipelineError) -> Response {
    let status = match error {
        PipelineError::AlreadyRecording | PipelineError::NotRecording => StatusCode::CONFLICT,
        PipelineError::NoAudioAvailable | PipelineError::FileNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message })).into_response()
}

// ============================================================================
// Recording control
// ============================================================================

/// POST /api/v1/start
/// Begin a capture; the body is optional
pub async fn start(
    State(state): State<AppState>,
    body: Option<Json<StartRequest>>,
) -> impl IntoResponse {
    let req = body.map(|Json(r)| r).unwrap_or_default();
    info!("Start recording requested (duration: {:?})", req.duration);

    match state.pipeline.start_recording(req.duration).await {
        Ok(()) => (
            StatusCode::OK,
            Json(StatusResponse {
                status: "recording".to_string(),
                message: "Recording started".to_string(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to start recording: {}", e);
            reject(e)
        }
    }
}

/// POST /api/v1/stop
/// Stop the capture and process the recording in the background
pub async fn stop(State(state): State<AppState>, Json(raw): Json<RawParams>) -> impl IntoResponse {
    info!("Stop recording requested");
    let params = RequestParams::from_raw(&raw, &state.default_language);

    match state.pipeline.stop_and_process(params).await {
        Ok(()) => accepted("Recording stopped, processing"),
        Err(e) => {
            error!("Failed to stop recording: {}", e);
            reject(e)
        }
    }
}

// ============================================================================
// Audio processing
// ============================================================================

/// POST /api/v1/upload
/// Accept client-captured audio and process it
pub async fn upload(State(state): State<AppState>, multipart: Multipart) -> impl IntoResponse {
    let body = match parse_upload(multipart).await {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to parse upload: {}", e);
            return bad_request(format!("invalid multipart body: {}", e));
        }
    };
    let Some(audio) = body.audio else {
        return bad_request("missing audio field".to_string());
    };
    info!("Received upload ({} bytes)", audio.len());

    let params = RequestParams::from_raw(&body.raw, &state.default_language);
    let path = match state
        .pipeline
        .save_upload(body.file_name.as_deref(), &audio)
        .await
    {
        Ok(path) => path,
        Err(e) => {
            error!("Failed to save upload: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("failed to save upload: {}", e),
                }),
            )
                .into_response();
        }
    };
    state.pipeline.process_upload(path, params);
    accepted("Audio received, processing")
}

/// POST /api/v1/retry
/// Re-transcribe the named or last processed audio with the next strategy
pub async fn retry(State(state): State<AppState>, Json(raw): Json<RawParams>) -> impl IntoResponse {
    info!("Transcription retry requested");
    let params = RequestParams::from_raw(&raw, &state.default_language);

    match state.pipeline.process_retry(params) {
        Ok(()) => accepted("Retrying transcription"),
        Err(e) => {
            error!("Failed to retry: {}", e);
            reject(e)
        }
    }
}

/// POST /api/v1/retry-upload
/// Retry against freshly uploaded audio
pub async fn retry_upload(State(state): State<AppState>, multipart: Multipart) -> impl IntoResponse {
    let body = match parse_upload(multipart).await {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to parse retry upload: {}", e);
            return bad_request(format!("invalid multipart body: {}", e));
        }
    };
    let Some(audio) = body.audio else {
        return bad_request("missing audio field".to_string());
    };
    info!("Received retry upload ({} bytes)", audio.len());

    let mut params = RequestParams::from_raw(&body.raw, &state.default_language);
    match state
        .pipeline
        .save_upload(body.file_name.as_deref(), &audio)
        .await
    {
        Ok(path) => params.audio_file = Some(path),
        Err(e) => {
            error!("Failed to save retry upload: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("failed to save upload: {}", e),
                }),
            )
                .into_response();
        }
    };
    match state.pipeline.process_retry(params) {
        Ok(()) => accepted("Retrying transcription with new audio"),
        Err(e) => {
            error!("Failed to retry: {}", e);
            reject(e)
        }
    }
}

// ============================================================================
// Direct audio understanding
// ============================================================================

/// POST /api/v1/gemini
/// Send the named or last processed audio directly to the answer model
pub async fn gemini(State(state): State<AppState>, Json(raw): Json<RawParams>) -> impl IntoResponse {
    info!("Direct processing requested");
    let params = RequestParams::from_raw(&raw, &state.default_language);

    match state.pipeline.process_direct(params) {
        Ok(()) => accepted("Processing audio directly"),
        Err(e) => {
            error!("Failed to start direct processing: {}", e);
            reject(e)
        }
    }
}

/// POST /api/v1/gemini-upload
/// Direct processing of freshly uploaded audio
pub async fn gemini_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> impl IntoResponse {
    let body = match parse_upload(multipart).await {
        Ok(body) => body,
        Err(e) => {
            error!("Failed to parse direct upload: {}", e);
            return bad_request(format!("invalid multipart body: {}", e));
        }
    };
    let Some(audio) = body.audio else {
        return bad_request("missing audio field".to_string());
    };
    info!("Received direct upload ({} bytes)", audio.len());

    let mut params = RequestParams::from_raw(&body.raw, &state.default_language);
    match state
        .pipeline
        .save_upload(body.file_name.as_deref(), &audio)
        .await
    {
        Ok(path) => params.audio_file = Some(path),
        Err(e) => {
            error!("Failed to save direct upload: {}", e);
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("failed to save upload: {}", e),
                }),
            )
                .into_response();
        }
    };
    match state.pipeline.process_direct(params) {
        Ok(()) => accepted("Processing audio directly"),
        Err(e) => {
            error!("Failed to start direct processing: {}", e);
            reject(e)
        }
    }
}

// ============================================================================
// Streaming and session control
// ============================================================================

/// POST /api/v1/stream
/// Stream an answer for a transcript the client already has
pub async fn stream(State(state): State<AppState>, Json(raw): Json<RawParams>) -> impl IntoResponse {
    let Some(transcript) = raw
        .transcript
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
    else {
        return bad_request("missing transcript field".to_string());
    };
    info!("Answer stream requested for a provided transcript");

    let processed_directly = raw.processed_directly;
    let params = RequestParams::from_raw(&raw, &state.default_language);
    state
        .pipeline
        .process_transcript(transcript, processed_directly, params);
    accepted("Streaming answer")
}

/// POST /api/v1/cancel
/// Cancel the in-flight operation; the body is ignored
pub async fn cancel(State(state): State<AppState>) -> impl IntoResponse {
    info!("Cancel requested");
    state.pipeline.cancel();
    (
        StatusCode::OK,
        Json(StatusResponse {
            status: "cancelled".to_string(),
            message: "Processing cancelled".to_string(),
        }),
    )
        .into_response()
}

/// GET /api/v1/status
/// Snapshot of the session state
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.pipeline.session().snapshot())).into_response()
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

// ============================================================================
// Multipart parsing
// ============================================================================

async fn parse_upload(mut multipart: Multipart) -> anyhow::Result<UploadBody> {
    let mut body = UploadBody::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "audio" => {
                body.file_name = field.file_name().map(str::to_string);
                body.audio = Some(field.bytes().await?.to_vec());
            }
            "language" => body.raw.language = Some(field.text().await?),
            "speechLanguage" => body.raw.speech_language = Some(field.text().await?),
            "speechSpeed" => body.raw.speech_speed = Some(field.text().await?),
            "questionContext" => body.raw.question_context = Some(field.text().await?),
            "customContext" => body.raw.custom_context = Some(field.text().await?),
            "isFollowUp" => body.raw.is_follow_up = parse_bool(&field.text().await?),
            "useStreaming" => body.raw.use_streaming = parse_bool(&field.text().await?),
            _ => {}
        }
    }
    Ok(body)
}

fn parse_bool(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}
