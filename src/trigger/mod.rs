//! Trigger filtering: which events launch automation.
//!
//! Label-gating avoids running automation on every issue edit, and the
//! cooldown absorbs the duplicate deliveries the upstream service is known
//! to send. Evaluation is a pure function of the envelope plus one store
//! lookup; the filter keeps no state of its own.
//!
//! The checks run in a fixed order and short-circuit at the first miss:
//!
//! 1. entity type must be `Issue`, action must be `update`
//! 2. `data.labels` must be present and non-empty
//! 3. some label name must equal the configured trigger label
//!    (case-insensitive)
//! 4. no accepted event for the same `(entity_type, entity_id, action)` may
//!    exist within the cooldown window
//!
//! The cooldown check is read-then-act: two concurrent deliveries can both
//! pass it. That race is an accepted tolerance, not a strict exclusion
//! guarantee.

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::store::{EventStore, StoreError};
use crate::types::DeliveryId;
use crate::webhooks::{EventAction, WebhookEnvelope};

/// The entity type automation responds to.
const TRIGGER_ENTITY_TYPE: &str = "Issue";

/// Configuration for the trigger filter.
#[derive(Debug, Clone)]
pub struct TriggerConfig {
    /// Label name whose presence on an issue marks it for automation.
    pub label: String,

    /// Minimum time between two accepted events for the same entity/action.
    pub cooldown: Duration,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        TriggerConfig {
            label: "vibe-coding".to_string(),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Why an event did not launch automation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    NotApplicableEntity,
    NotApplicableAction,
    NoLabels,
    LabelNotPresent,
    DuplicateWithinCooldown,
}

impl SkipReason {
    /// Snake-case form used in response bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotApplicableEntity => "not_applicable_entity",
            SkipReason::NotApplicableAction => "not_applicable_action",
            SkipReason::NoLabels => "no_labels",
            SkipReason::LabelNotPresent => "label_not_present",
            SkipReason::DuplicateWithinCooldown => "duplicate_within_cooldown",
        }
    }

    /// Human-readable explanation for the response body.
    pub fn message(&self) -> &'static str {
        match self {
            SkipReason::NotApplicableEntity => "entity type does not trigger automation",
            SkipReason::NotApplicableAction => "action does not trigger automation",
            SkipReason::NoLabels => "issue has no labels",
            SkipReason::LabelNotPresent => "trigger label not present",
            SkipReason::DuplicateWithinCooldown => {
                "duplicate delivery for this entity within the cooldown window"
            }
        }
    }
}

/// The outcome of trigger evaluation. Computed fresh per event; never
/// persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// The event should launch automation.
    Accepted,

    /// The event is a deliberate no-op.
    Skipped(SkipReason),
}

impl TriggerDecision {
    pub fn should_run(&self) -> bool {
        matches!(self, TriggerDecision::Accepted)
    }
}

/// Evaluates whether an event should launch automation.
///
/// `delivery_id` names the current delivery so the cooldown lookup never
/// matches the event's own just-appended row.
///
/// # Errors
///
/// Only the cooldown lookup touches the store; a store failure propagates
/// as [`StoreError`].
pub async fn evaluate(
    envelope: &WebhookEnvelope,
    delivery_id: &DeliveryId,
    store: &EventStore,
    config: &TriggerConfig,
) -> Result<TriggerDecision, StoreError> {
    if envelope.entity_type != TRIGGER_ENTITY_TYPE {
        return Ok(TriggerDecision::Skipped(SkipReason::NotApplicableEntity));
    }
    if envelope.action != EventAction::Update {
        return Ok(TriggerDecision::Skipped(SkipReason::NotApplicableAction));
    }

    let labels = label_names(envelope);
    if labels.is_empty() {
        return Ok(TriggerDecision::Skipped(SkipReason::NoLabels));
    }
    if !labels
        .iter()
        .any(|name| name.eq_ignore_ascii_case(&config.label))
    {
        return Ok(TriggerDecision::Skipped(SkipReason::LabelNotPresent));
    }

    let entity_id = envelope.entity_id();
    let recent = store
        .find_recent(
            &envelope.entity_type,
            &entity_id,
            envelope.action,
            config.cooldown,
            Some(delivery_id),
        )
        .await?;

    if let Some(prior) = recent {
        debug!(
            entity_id = %entity_id,
            prior_delivery = %prior.delivery_id,
            "Suppressing duplicate trigger within cooldown"
        );
        return Ok(TriggerDecision::Skipped(SkipReason::DuplicateWithinCooldown));
    }

    Ok(TriggerDecision::Accepted)
}

/// Extracts label names from `data.labels`.
///
/// Tolerant of shape drift: a missing or non-array `labels` field reads as
/// no labels, and entries without a string `name` are ignored.
fn label_names(envelope: &WebhookEnvelope) -> Vec<&str> {
    let Some(Value::Array(labels)) = envelope.data.get("labels") else {
        return Vec::new();
    };

    labels
        .iter()
        .filter_map(|label| label.get("name").and_then(Value::as_str))
        .collect()
}
