//! Health check endpoint.

use axum::Json;
use serde::Serialize;

use crate::config;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// `GET /health` — static readiness payload.
pub async fn check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: config::APP_VERSION,
    })
}
