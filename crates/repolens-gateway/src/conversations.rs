//! Conversation listing and deletion endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use tracing::error;

use repolens_core::types::ConversationId;
use repolens_store::Page;

use crate::state::GatewayState;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub user: Option<String>,
}

/// `GET /api/conversations?limit=&offset=`
pub async fn list_handler(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<ListQuery>,
) -> Response {
    let page = Page {
        limit: query.limit.unwrap_or(20),
        offset: query.offset.unwrap_or(0),
    };
    let user = query.user.as_deref().unwrap_or("local");

    match state.backend.list_conversations(user, page).await {
        Ok(listing) => Json(listing).into_response(),
        Err(e) => {
            error!(%e, "Failed to list conversations");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// `DELETE /api/conversations/{id}` — turns are never deleted
/// individually, only whole conversations.
pub async fn delete_handler(
    State(state): State<Arc<GatewayState>>,
    Path(id): Path<String>,
) -> StatusCode {
    match state.backend.delete_conversation(&ConversationId(id)).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(e) => {
            error!(%e, "Failed to delete conversation");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
