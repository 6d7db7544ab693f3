//! Read-only event query endpoints.
//!
//! These expose the append-only store for debugging and audit: list with
//! filters and pagination, fetch by store id, fetch by delivery id.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use thiserror::Error;

use super::AppState;
use crate::store::{ListFilter, StoreError, StoredEvent};
use crate::types::DeliveryId;
use crate::webhooks::EventAction;

/// Upper bound on a single page; larger requests are clamped.
const MAX_PAGE_SIZE: u32 = 500;

/// Errors from the query endpoints.
#[derive(Debug, Error)]
pub enum QueryError {
    /// No event matches the requested identifier.
    #[error("event not found")]
    NotFound,

    /// The `action` filter is not a known action.
    #[error("unknown action filter: {0:?}")]
    UnknownAction(String),

    /// Store failure.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match &self {
            QueryError::NotFound => StatusCode::NOT_FOUND,
            QueryError::UnknownAction(_) => StatusCode::BAD_REQUEST,
            QueryError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}

/// Query string for the list endpoint.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub skip: u32,
    pub limit: Option<u32>,
    pub entity_type: Option<String>,
    pub action: Option<String>,
}

/// `GET /webhook/events?skip&limit&entity_type&action`
///
/// Returns stored events newest-first.
pub async fn list_events_handler(
    State(app_state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<StoredEvent>>, QueryError> {
    let action = match &params.action {
        Some(raw) => Some(
            EventAction::parse(raw).ok_or_else(|| QueryError::UnknownAction(raw.clone()))?,
        ),
        None => None,
    };

    let filter = ListFilter {
        entity_type: params.entity_type,
        action,
    };
    let limit = params.limit.unwrap_or(100).min(MAX_PAGE_SIZE);

    let events = app_state.store().list(filter, params.skip, limit).await?;
    Ok(Json(events))
}

/// `GET /webhook/events/{id}`
pub async fn get_event_handler(
    State(app_state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<StoredEvent>, QueryError> {
    let event = app_state.store().get(id).await?.ok_or(QueryError::NotFound)?;
    Ok(Json(event))
}

/// `GET /webhook/events/by-delivery/{delivery_id}`
pub async fn get_event_by_delivery_handler(
    State(app_state): State<AppState>,
    Path(delivery_id): Path<String>,
) -> Result<Json<StoredEvent>, QueryError> {
    let event = app_state
        .store()
        .get_by_delivery(&DeliveryId::new(delivery_id))
        .await?
        .ok_or(QueryError::NotFound)?;
    Ok(Json(event))
}
