//! Liveness endpoint; needs no credentials.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use tracing::warn;

use crate::AppState;
use crate::models::HealthResponse;

/// `GET /api/v1/health`: storage reachability and the active signing algorithm.
///
/// Answers 503 while storage is unreachable so load balancers drain the node.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_connected = match state.storage.ping().await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "storage ping failed");
            false
        }
    };
    let (status, label) = if db_connected {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };
    (
        status,
        Json(HealthResponse {
            status: label.into(),
            db_connected,
            signing_algorithm: state.tokens().algorithm().to_string(),
        }),
    )
}
