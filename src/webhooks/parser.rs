//! Webhook payload normalization.
//!
//! This module parses raw webhook JSON bodies into typed [`WebhookEnvelope`]
//! values. The parser is deliberately tolerant: the upstream event schema
//! evolves, so unknown fields are never rejected and optional fields accept
//! both snake_case and camelCase spellings.
//!
//! # Parsing Strategy
//!
//! 1. The body must be a JSON object — anything else is `MalformedJson` or
//!    a root-level `SchemaViolation`
//! 2. `action`, `type`, and `data` are required; everything else is optional
//! 3. Unknown top-level fields are ignored; unknown fields inside `data`
//!    are preserved verbatim (the envelope carries the whole object)
//!
//! Parsing is pure: no side effects, no I/O.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::types::EntityId;

/// Error type for payload normalization failures.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The body is not valid JSON at all.
    #[error("malformed JSON body: {0}")]
    MalformedJson(#[source] serde_json::Error),

    /// The body is JSON but a required field is missing or has the wrong shape.
    #[error("schema violation at {field}: {detail}")]
    SchemaViolation { field: &'static str, detail: String },
}

impl ParseError {
    fn violation(field: &'static str, detail: impl Into<String>) -> Self {
        ParseError::SchemaViolation {
            field,
            detail: detail.into(),
        }
    }
}

/// What happened to the entity this event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Create,
    Update,
    Remove,
}

impl EventAction {
    /// Parses the wire representation. Returns `None` for unknown actions.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(EventAction::Create),
            "update" => Some(EventAction::Update),
            "remove" => Some(EventAction::Remove),
            _ => None,
        }
    }

    /// The wire representation (also used for store columns and responses).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::Create => "create",
            EventAction::Update => "update",
            EventAction::Remove => "remove",
        }
    }
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized webhook event, one per request.
///
/// The inner shape of `data` varies by `entity_type` and is carried opaquely;
/// downstream consumers (trigger filter, prompt formatter) pull what they
/// need with defaults for anything missing.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEnvelope {
    pub action: EventAction,

    /// The entity kind, e.g. "Issue", "Comment", "Reaction".
    pub entity_type: String,

    /// Opaque entity snapshot. Always present; inner shape varies.
    pub data: Map<String, Value>,

    /// Canonical URL of the entity, when the upstream provides one.
    pub url: Option<String>,

    /// The entity's own creation timestamp as reported upstream
    /// (wire field `createdAt`). Not used for dedup — the store's
    /// `received_at` is authoritative there.
    pub created_at: Option<String>,

    /// Previous values of changed fields; present only on updates
    /// (wire field `updatedFrom`).
    pub updated_from: Option<Map<String, Value>>,

    /// Upstream delivery timestamp in epoch milliseconds
    /// (wire field `webhookTimestamp`).
    pub webhook_timestamp: Option<i64>,

    /// Upstream webhook configuration id (wire field `webhookId`).
    pub webhook_id: Option<String>,
}

impl WebhookEnvelope {
    /// Extracts the entity id from `data.id`.
    ///
    /// String ids pass through; numeric ids are stringified; anything else
    /// (including an absent field) yields the `"unknown"` sentinel.
    pub fn entity_id(&self) -> EntityId {
        match self.data.get("id") {
            Some(Value::String(s)) => EntityId::new(s.clone()),
            Some(Value::Number(n)) => EntityId::new(n.to_string()),
            _ => EntityId::unknown(),
        }
    }
}

/// Parses a raw webhook body into a [`WebhookEnvelope`].
///
/// # Errors
///
/// * [`ParseError::MalformedJson`] — the body is not valid JSON
/// * [`ParseError::SchemaViolation`] — `action`, `type`, or `data` is
///   missing or has the wrong shape, or `action` is not one of
///   create/update/remove
pub fn parse_envelope(raw: &[u8]) -> Result<WebhookEnvelope, ParseError> {
    let value: Value = serde_json::from_slice(raw).map_err(ParseError::MalformedJson)?;

    let Value::Object(body) = value else {
        return Err(ParseError::violation("<root>", "expected a JSON object"));
    };

    let action_str = require_str(&body, "action")?;
    let action = EventAction::parse(action_str).ok_or_else(|| {
        ParseError::violation("action", format!("unknown action: {action_str:?}"))
    })?;

    let entity_type = require_str(&body, "type")?.to_string();

    let data = match body.get("data") {
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(ParseError::violation(
                "data",
                format!("expected an object, got {}", kind_of(other)),
            ));
        }
        None => return Err(ParseError::violation("data", "missing required field")),
    };

    Ok(WebhookEnvelope {
        action,
        entity_type,
        data,
        url: optional_str(&body, &["url"]),
        created_at: optional_str(&body, &["createdAt", "created_at"]),
        updated_from: optional_object(&body, &["updatedFrom", "updated_from"]),
        webhook_timestamp: optional_i64(&body, &["webhookTimestamp", "webhook_timestamp"]),
        webhook_id: optional_str(&body, &["webhookId", "webhook_id"]),
    })
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn require_str<'a>(body: &'a Map<String, Value>, field: &'static str) -> Result<&'a str, ParseError> {
    match body.get(field) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(ParseError::violation(
            field,
            format!("expected a string, got {}", kind_of(other)),
        )),
        None => Err(ParseError::violation(field, "missing required field")),
    }
}

/// Looks up the first present alias and coerces to a string.
/// Wrong-typed or absent optional fields default to `None`, never an error.
fn optional_str(body: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .find_map(|name| body.get(*name))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn optional_object(body: &Map<String, Value>, aliases: &[&str]) -> Option<Map<String, Value>> {
    aliases
        .iter()
        .find_map(|name| body.get(*name))
        .and_then(Value::as_object)
        .cloned()
}

fn optional_i64(body: &Map<String, Value>, aliases: &[&str]) -> Option<i64> {
    aliases
        .iter()
        .find_map(|name| body.get(*name))
        .and_then(Value::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Result<WebhookEnvelope, ParseError> {
        parse_envelope(&serde_json::to_vec(&value).unwrap())
    }

    #[test]
    fn parse_issue_update() {
        let envelope = parse(json!({
            "action": "update",
            "type": "Issue",
            "data": {
                "id": "a41cdb5f-3e1c-4d2b-9f6a-7f29f4b0c111",
                "title": "Fix login flow",
                "labels": [{ "name": "vibe-coding" }]
            },
            "url": "https://linear.app/acme/issue/ENG-123",
            "createdAt": "2024-05-01T10:00:00.000Z",
            "updatedFrom": { "updatedAt": "2024-04-30T09:00:00.000Z" },
            "webhookTimestamp": 1714556400123i64,
            "webhookId": "wh-1"
        }))
        .unwrap();

        assert_eq!(envelope.action, EventAction::Update);
        assert_eq!(envelope.entity_type, "Issue");
        assert_eq!(
            envelope.entity_id().as_str(),
            "a41cdb5f-3e1c-4d2b-9f6a-7f29f4b0c111"
        );
        assert_eq!(
            envelope.url.as_deref(),
            Some("https://linear.app/acme/issue/ENG-123")
        );
        assert_eq!(
            envelope.created_at.as_deref(),
            Some("2024-05-01T10:00:00.000Z")
        );
        assert!(envelope.updated_from.is_some());
        assert_eq!(envelope.webhook_timestamp, Some(1714556400123));
        assert_eq!(envelope.webhook_id.as_deref(), Some("wh-1"));
    }

    #[test]
    fn snake_case_aliases_accepted() {
        let envelope = parse(json!({
            "action": "create",
            "type": "Comment",
            "data": { "id": "c-1" },
            "created_at": "2024-05-01T10:00:00.000Z",
            "updated_from": { "body": "old" }
        }))
        .unwrap();

        assert_eq!(
            envelope.created_at.as_deref(),
            Some("2024-05-01T10:00:00.000Z")
        );
        assert!(envelope.updated_from.is_some());
    }

    #[test]
    fn minimal_envelope_parses() {
        let envelope = parse(json!({
            "action": "remove",
            "type": "Reaction",
            "data": {}
        }))
        .unwrap();

        assert_eq!(envelope.action, EventAction::Remove);
        assert_eq!(envelope.entity_id(), EntityId::unknown());
        assert!(envelope.url.is_none());
        assert!(envelope.created_at.is_none());
        assert!(envelope.updated_from.is_none());
    }

    #[test]
    fn unknown_fields_are_tolerated_and_data_preserved() {
        let envelope = parse(json!({
            "action": "update",
            "type": "Issue",
            "data": {
                "id": "i-1",
                "someFutureField": { "deeply": ["nested", 42] }
            },
            "organizationId": "org-9",
            "someOtherNewTopLevelField": true
        }))
        .unwrap();

        // Unknown fields inside data survive verbatim
        assert_eq!(
            envelope.data.get("someFutureField"),
            Some(&json!({ "deeply": ["nested", 42] }))
        );
    }

    #[test]
    fn numeric_entity_id_is_stringified() {
        let envelope = parse(json!({
            "action": "create",
            "type": "Issue",
            "data": { "id": 42 }
        }))
        .unwrap();

        assert_eq!(envelope.entity_id().as_str(), "42");
    }

    #[test]
    fn malformed_json_is_rejected() {
        let result = parse_envelope(b"not valid json");
        assert!(matches!(result, Err(ParseError::MalformedJson(_))));
    }

    #[test]
    fn non_object_root_is_rejected() {
        let result = parse_envelope(b"[1, 2, 3]");
        assert!(matches!(
            result,
            Err(ParseError::SchemaViolation { field: "<root>", .. })
        ));
    }

    #[test]
    fn missing_required_fields_are_rejected() {
        let no_action = parse(json!({ "type": "Issue", "data": {} }));
        assert!(matches!(
            no_action,
            Err(ParseError::SchemaViolation { field: "action", .. })
        ));

        let no_type = parse(json!({ "action": "update", "data": {} }));
        assert!(matches!(
            no_type,
            Err(ParseError::SchemaViolation { field: "type", .. })
        ));

        let no_data = parse(json!({ "action": "update", "type": "Issue" }));
        assert!(matches!(
            no_data,
            Err(ParseError::SchemaViolation { field: "data", .. })
        ));
    }

    #[test]
    fn wrong_shape_required_fields_are_rejected() {
        let result = parse(json!({
            "action": "update",
            "type": "Issue",
            "data": "not an object"
        }));
        assert!(matches!(
            result,
            Err(ParseError::SchemaViolation { field: "data", .. })
        ));
    }

    #[test]
    fn unknown_action_is_rejected() {
        let result = parse(json!({
            "action": "archive",
            "type": "Issue",
            "data": {}
        }));
        assert!(matches!(
            result,
            Err(ParseError::SchemaViolation { field: "action", .. })
        ));
    }

    #[test]
    fn wrong_typed_optional_fields_default_to_absent() {
        // Tolerant parse: a number where a string was expected in an optional
        // field is treated as absent, not an error.
        let envelope = parse(json!({
            "action": "update",
            "type": "Issue",
            "data": { "id": "i-1" },
            "url": 17,
            "webhookTimestamp": "not-a-number"
        }))
        .unwrap();

        assert!(envelope.url.is_none());
        assert!(envelope.webhook_timestamp.is_none());
    }

    #[test]
    fn action_wire_representation_roundtrips() {
        for action in [EventAction::Create, EventAction::Update, EventAction::Remove] {
            assert_eq!(EventAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(EventAction::parse("delete"), None);
    }
}
