//! API request handlers.

use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::relay::{ChatRequest, RelayOutcome};
use crate::store::SessionAnalytics;

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Relay a chat turn.
///
/// Streams the assistant reply as chunked plain text, or answers with a JSON
/// throttle notice when the caller is sending too fast.
#[instrument(skip_all)]
pub async fn chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload?;
    let conversation_id = request.conversation_id.clone();

    match state.relay.relay(request).await? {
        RelayOutcome::Throttled(notice) => Ok(Json(notice).into_response()),
        RelayOutcome::Streaming(stream) => {
            info!(conversation_id = %conversation_id, "Streaming chat reply");
            let body = Body::from_stream(stream.into_body_stream());

            Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
                .header(header::CACHE_CONTROL, "no-cache")
                .header("X-Accel-Buffering", "no") // Disable nginx buffering if present
                .body(body)
                .map_err(|e| ApiError::internal(format!("Failed to build stream response: {}", e)))
        }
    }
}

/// Body of `POST /analytics/session`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAnalyticsRequest {
    pub user_id: String,
    pub duration: i64,
    pub message_count: i64,
    pub timestamp: String,
}

impl From<SessionAnalyticsRequest> for SessionAnalytics {
    fn from(req: SessionAnalyticsRequest) -> Self {
        Self {
            user_id: req.user_id,
            duration: req.duration,
            message_count: req.message_count,
            session_date: req.timestamp,
        }
    }
}

/// Record usage for a finished chat session.
#[instrument(skip_all)]
pub async fn record_session_analytics(
    State(state): State<AppState>,
    payload: Result<Json<SessionAnalyticsRequest>, JsonRejection>,
) -> ApiResult<Json<serde_json::Value>> {
    let Json(request) = payload?;
    if request.user_id.trim().is_empty() {
        return Err(ApiError::bad_request("userId must not be empty"));
    }

    let analytics = SessionAnalytics::from(request);
    if let Err(err) = state.store.record_session(&analytics).await {
        warn!(
            user_id = %analytics.user_id,
            backend = state.store.backend_name(),
            error = %err,
            "Error storing session analytics"
        );
        return Err(ApiError::internal("Failed to store analytics"));
    }

    info!(
        user_id = %analytics.user_id,
        messages = analytics.message_count,
        "Recorded session analytics"
    );
    Ok(Json(json!({ "success": true })))
}
