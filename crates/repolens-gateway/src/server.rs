//! Axum-based HTTP server.

use std::sync::Arc;

use axum::{
    extract::State,
    response::IntoResponse,
    routing::{delete, get, post},
    Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::conversations::{delete_handler, list_handler};
use crate::state::GatewayState;
use crate::stream::stream_handler;

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/api/chat/stream", post(stream_handler))
        .route("/api/conversations", get(list_handler))
        .route("/api/conversations/{id}", delete(delete_handler))
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the gateway server.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state.config.gateway_bind();
    let app = router(state);

    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health_handler(State(_state): State<Arc<GatewayState>>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C handler");
    info!("Shutdown signal received");
}
