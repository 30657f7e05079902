//! Streaming relay endpoint.
//!
//! Opens a response on the assistant backend and forwards its body to the
//! client unchanged. Frames are not parsed here; decoding is the client's job.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use parley_core::ConversationId;
use parley_session::StreamRequest;

use crate::error::ApiError;
use crate::state::GatewayState;

const DEFAULT_CONTENT_TYPE: &str = "text/event-stream";

/// Relay a streamed assistant response.
///
/// ```text
/// POST /v1/conversations/:id/stream
/// { "content": "Flats in Lyon?", "flashCardFlags": {...} }
///
/// Response: 200 OK (body streamed from upstream)
/// ```
///
/// # Errors
///
/// Returns `BadRequest` for a malformed id or empty content, and the relay's
/// upstream errors when the backend cannot start the response.
pub async fn stream_response(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
    Json(request): Json<StreamRequest>,
) -> Result<Response, ApiError> {
    let id: ConversationId = id.parse()?;
    if request.content.trim().is_empty() {
        return Err(ApiError::BadRequest("content must not be empty".into()));
    }

    tracing::info!(
        conversation_id = %id,
        has_flags = request.flash_card_flags.is_some(),
        "Relaying stream"
    );

    let upstream = state.relay.open(&id, &request).await?;
    let content_type = upstream
        .headers()
        .get(CONTENT_TYPE)
        .cloned()
        .unwrap_or_else(|| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

    let body = Body::from_stream(upstream.bytes_stream());

    Ok((
        StatusCode::OK,
        [
            (CONTENT_TYPE, content_type),
            (CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        body,
    )
        .into_response())
}
