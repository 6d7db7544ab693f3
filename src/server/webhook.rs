//! Webhook intake endpoint: the full event pipeline.
//!
//! One request drives the whole sequence: signature verification → payload
//! normalization → idempotent event recording → trigger filtering → prompt
//! rendering → orchestration. The response is not produced until
//! orchestration finishes or times out (the synchronous behavior is a
//! documented design decision — see DESIGN.md).
//!
//! Response policy: signature and parse failures are HTTP errors (401/400)
//! and never reach the store; storage failures are 500; everything after a
//! successful append is a 200 — trigger skips say so in the body, and
//! orchestration stage failures ride inside the acknowledgment rather than
//! becoming HTTP errors, so the upstream sender never retries a delivery
//! that was recorded.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::automation::{AutomationRun, EntityInfo};
use crate::prompt;
use crate::store::StoreError;
use crate::trigger::{self, TriggerDecision};
use crate::types::{DeliveryId, EntityId};
use crate::webhooks::{EventAction, ParseError, parse_envelope, verify_request};

/// Header carrying the unique delivery ID.
const HEADER_DELIVERY: &str = "x-delivery-id";
/// Header naming the upstream event type (logged, not trusted).
const HEADER_EVENT: &str = "x-event-type";
/// Header carrying the hex HMAC-SHA256 signature of the raw body.
const HEADER_SIGNATURE: &str = "x-signature";

/// Errors that terminate the pipeline with an HTTP error status.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Missing required header.
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    /// Invalid or missing signature.
    #[error("invalid signature")]
    InvalidSignature,

    /// Malformed or schema-violating body.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Persistence failure.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingHeader(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::Parse(_) => StatusCode::BAD_REQUEST,
            WebhookError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Body of a 200 acknowledgment.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    pub message: String,
    pub entity_type: String,
    pub action: EventAction,
    pub entity_id: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub automation: Option<AutomationRun>,
}

/// Webhook intake handler.
///
/// # Request
///
/// - Method: POST
/// - Headers: `X-Delivery-Id` (required), `X-Event-Type` (informational),
///   `X-Signature` (required when a secret is configured; bare hex
///   HMAC-SHA256 of the raw body)
/// - Body: JSON event payload
///
/// # Response
///
/// - 200 with `status: "success"` — event recorded; `automation` reports
///   how far orchestration got (inspect `stage_failures`)
/// - 200 with `status: "skipped"` — event recorded (or already known) but
///   deliberately not acted on; `reason` says why
/// - 400 missing header or malformed/invalid body
/// - 401 signature verification failed
/// - 500 storage or unexpected failure
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<WebhookResponse>), WebhookError> {
    let delivery_id = DeliveryId::new(
        get_header(&headers, HEADER_DELIVERY).ok_or(WebhookError::MissingHeader(HEADER_DELIVERY))?,
    );
    let event_header = get_header(&headers, HEADER_EVENT);

    debug!(
        delivery_id = %delivery_id,
        event_type = event_header.as_deref().unwrap_or("-"),
        "Received webhook delivery"
    );

    // Verify the signature BEFORE any parsing or I/O: forged requests must
    // never reach the store.
    let signature = get_header(&headers, HEADER_SIGNATURE);
    let secret = app_state.config().webhook_secret.as_deref();
    if !verify_request(secret.map(str::as_bytes), signature.as_deref(), &body) {
        warn!(delivery_id = %delivery_id, "Invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    let envelope = parse_envelope(&body)?;
    let entity_id = envelope.entity_id();

    // Record the event exactly once. A redelivery with the same delivery id
    // is acknowledged as skipped — the sender must not retry.
    let stored = match app_state.store().append(&envelope, &delivery_id, &body).await {
        Ok(stored) => stored,
        Err(StoreError::DuplicateDelivery(_)) => {
            info!(delivery_id = %delivery_id, "Duplicate delivery; already recorded");
            return Ok((
                StatusCode::OK,
                Json(WebhookResponse {
                    status: "skipped",
                    message: format!("delivery {delivery_id} already recorded"),
                    entity_type: envelope.entity_type,
                    action: envelope.action,
                    entity_id,
                    event_id: None,
                    reason: Some("duplicate_delivery".to_string()),
                    automation: None,
                }),
            ));
        }
        Err(e) => {
            error!(delivery_id = %delivery_id, error = %e, "Failed to store webhook event");
            return Err(e.into());
        }
    };

    let decision = trigger::evaluate(
        &envelope,
        &delivery_id,
        app_state.store(),
        &app_state.config().trigger,
    )
    .await?;

    let skip_reason = match decision {
        TriggerDecision::Accepted => None,
        TriggerDecision::Skipped(reason) => Some(reason),
    };

    if let Some(reason) = skip_reason {
        debug!(
            delivery_id = %delivery_id,
            reason = reason.as_str(),
            "Event recorded but not triggering automation"
        );
        return Ok((
            StatusCode::OK,
            Json(WebhookResponse {
                status: "skipped",
                message: reason.message().to_string(),
                entity_type: stored.entity_type,
                action: stored.action,
                entity_id: stored.entity_id,
                event_id: Some(stored.id),
                reason: Some(reason.as_str().to_string()),
                automation: None,
            }),
        ));
    }

    // Accepted: render the task and drive the automation pipeline. The
    // delivery is acknowledged as received regardless of how the run ends;
    // failures ride inside the response body.
    info!(
        delivery_id = %delivery_id,
        entity_id = %stored.entity_id,
        "Trigger accepted; starting automation"
    );

    let rendered = prompt::render(
        &stored.entity_type,
        stored.action,
        &stored.data,
        &app_state.config().trigger.label,
    );
    let entity_info = EntityInfo::from_envelope(&envelope);
    let run = app_state
        .orchestrator()
        .run(&app_state.config().repo_path, &entity_info, &rendered)
        .await;

    if !run.stage_failures.is_empty() {
        warn!(
            delivery_id = %delivery_id,
            failures = run.stage_failures.len(),
            "Automation finished with stage failures"
        );
    }

    Ok((
        StatusCode::OK,
        Json(WebhookResponse {
            status: "success",
            message: format!(
                "webhook event {} for {} processed",
                stored.action, stored.entity_type
            ),
            entity_type: stored.entity_type,
            action: stored.action,
            entity_id: stored.entity_id,
            event_id: Some(stored.id),
            reason: None,
            automation: Some(run),
        }),
    ))
}

fn get_header(headers: &HeaderMap, name: &'static str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
