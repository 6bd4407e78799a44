use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use log::error;
use serde::{Deserialize, Serialize};

use crate::api::AppState;

/// Response for node health
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    /// Crate version
    pub version: String,
    /// Store backend name
    pub store: String,
}

/// Liveness plus a store round-trip
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(e) => {
            error!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "degraded")
        }
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store: state.store.backend().to_string(),
        }),
    )
}
