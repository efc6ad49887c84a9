//! Probes and telemetry ingest. All of these bypass API auth.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use crate::state::AppState;

pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness: a live catalog ping. 503 until the database answers.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.deployer.catalog.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ready" }))),
        Err(e) => {
            tracing::warn!(error = %e, "readiness probe failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": "not ready" })),
            )
        }
    }
}

pub async fn version() -> Json<serde_json::Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION") }))
}

/// End-user telemetry beacons. The core only acknowledges and counts them;
/// storage and analysis live outside this service.
pub async fn ingest_telemetry(body: Bytes) -> (StatusCode, Json<serde_json::Value>) {
    let events = match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(serde_json::Value::Array(items)) => items.len(),
        Ok(_) => 1,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": "telemetry body must be JSON" })),
            );
        }
    };
    tracing::debug!(events, bytes = body.len(), "telemetry accepted");
    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "accepted", "events": events })),
    )
}
