//! Liveness endpoints.
//!
//! - `GET /health` - Process is up and serving
//! - `GET /api/v1` - API root answers

use axum::Json;
use tracing::instrument;

use crate::models::{HealthResponse, MessageResponse};

/// Health check endpoint. Always 200 while the process serves traffic.
#[instrument]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// API root.
#[instrument]
pub async fn api_status() -> Json<MessageResponse> {
    Json(MessageResponse {
        message: "API is working!",
    })
}
