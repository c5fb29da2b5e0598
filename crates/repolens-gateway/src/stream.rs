//! The streaming endpoint — one agent run relayed as SSE frames.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, error};

use repolens_agent::clip_event;
use repolens_core::protocol::{AgentEvent, StreamRequest};
use repolens_core::sse::encode_frame;

use crate::state::GatewayState;

/// `POST /api/chat/stream`
///
/// Opens one agent run and forwards its events as `data: <JSON>\n\n`
/// frames, unbuffered. Tool results are clipped before they hit the
/// wire, and the stream always terminates with a `done` frame. Source
/// errors raised mid-run surface in-band as `error` events — the HTTP
/// status is already committed by then.
pub async fn stream_handler(
    State(state): State<Arc<GatewayState>>,
    Json(request): Json<StreamRequest>,
) -> Response {
    if request.prompt.trim().is_empty() {
        return StatusCode::BAD_REQUEST.into_response();
    }

    debug!(
        history_len = request.history.len(),
        "Opening agent run"
    );

    let events = match state.source.run(&request.prompt, &request.history).await {
        Ok(events) => events,
        Err(e) => {
            error!(%e, "Agent source failed to start");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let frames = events
        .map(|item| match item {
            Ok(event) => clip_event(event),
            Err(e) => AgentEvent::Error {
                content: e.to_string(),
            },
        })
        .chain(futures::stream::once(async { AgentEvent::Done }))
        .filter_map(|event| async move {
            match encode_frame(&event) {
                Ok(frame) => Some(Ok::<_, Infallible>(Bytes::from(frame))),
                Err(e) => {
                    error!(%e, "Failed to encode frame");
                    None
                }
            }
        });

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}
