//! Health and identification endpoints.
//!
//! `/health` is intended for load balancers and liveness probes; it also
//! reports whether signature verification is active so a misconfigured
//! deployment (no secret in production) is visible at a glance.

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use super::AppState;

/// Health check handler.
///
/// Returns 200 with a JSON body reporting liveness and whether inbound
/// signatures are being verified.
pub async fn health_handler(State(app_state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "signature_verification": app_state.config().signature_verification_active(),
    }))
}

/// Service identification banner at `/`.
pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "message": "vibe-pilot webhook automation",
        "status": "running",
    }))
}
