//! HTTP server for the webhook automation service.
//!
//! # Endpoints
//!
//! - `POST /webhook/linear` - Webhook intake; runs the full pipeline
//! - `GET /webhook/events` - List stored events (newest first)
//! - `GET /webhook/events/{id}` - Fetch one event by store id
//! - `GET /webhook/events/by-delivery/{delivery_id}` - Fetch by delivery id
//! - `GET /health` - Liveness plus signature-verification status
//! - `GET /` - Service identification banner

use std::sync::Arc;

pub mod events;
pub mod health;
pub mod webhook;

pub use events::{get_event_by_delivery_handler, get_event_handler, list_events_handler};
pub use health::{health_handler, root_handler};
pub use webhook::webhook_handler;

use crate::automation::Orchestrator;
use crate::config::AppConfig;
use crate::store::EventStore;

/// Shared application state, passed to all handlers via Axum's `State`
/// extractor.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: AppConfig,
    store: EventStore,
    orchestrator: Orchestrator,
}

impl AppState {
    pub fn new(config: AppConfig, store: EventStore, orchestrator: Orchestrator) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                config,
                store,
                orchestrator,
            }),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &EventStore {
        &self.inner.store
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.inner.orchestrator
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    axum::Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route("/webhook/linear", post(webhook_handler))
        .route("/webhook/events", get(list_events_handler))
        .route("/webhook/events/{id}", get(get_event_handler))
        .route(
            "/webhook/events/by-delivery/{delivery_id}",
            get(get_event_by_delivery_handler),
        )
        .with_state(app_state)
}
