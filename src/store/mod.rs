//! SQLite-backed event store.
//!
//! Every accepted webhook delivery is persisted exactly once, keyed by its
//! delivery id. Rows are append-only: nothing in the core ever updates or
//! deletes them (retention is an external policy).
//!
//! # Schema Versioning
//!
//! The database has a `schema_version` table that tracks the schema version.
//! When the schema needs to change, increment `CURRENT_SCHEMA_VERSION` and
//! add a migration in `run_migrations()`. Migrations run sequentially from
//! the current version to the target version.
//!
//! # Async Access
//!
//! rusqlite is synchronous, so the connection lives behind an
//! `Arc<Mutex<Connection>>` and the public async methods run their queries
//! on `tokio::task::spawn_blocking` to avoid stalling the async runtime.
//!
//! # Dedup Clock
//!
//! `received_at` is assigned by this store at insert time and is the only
//! timestamp the cooldown lookup compares against. The payload's
//! self-reported `createdAt` is stored but never trusted for recency —
//! upstream clock skew must not affect dedup.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::types::{DeliveryId, EntityId};
use crate::webhooks::{EventAction, WebhookEnvelope};

/// Current schema version. Increment this when making schema changes and add
/// corresponding migration logic in `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database operation failed.
    #[error("storage error during {operation}: {detail}")]
    Storage {
        operation: &'static str,
        detail: String,
    },

    /// A row with this delivery id already exists.
    #[error("duplicate delivery ID: {0}")]
    DuplicateDelivery(DeliveryId),
}

impl StoreError {
    fn storage(operation: &'static str, detail: impl ToString) -> Self {
        StoreError::Storage {
            operation,
            detail: detail.to_string(),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// A persisted webhook event.
///
/// All envelope fields plus the store-assigned `id` and `received_at`, the
/// extracted `entity_id`, and the verbatim `raw_payload` kept for
/// audit/replay. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredEvent {
    pub id: i64,
    pub delivery_id: DeliveryId,
    pub entity_type: String,
    pub entity_id: EntityId,
    pub action: EventAction,
    pub data: Map<String, Value>,
    pub updated_from: Option<Map<String, Value>>,
    pub url: Option<String>,
    pub created_at: Option<String>,
    pub webhook_timestamp: Option<i64>,
    pub webhook_id: Option<String>,
    pub raw_payload: String,
    pub received_at: DateTime<Utc>,
}

/// Filter for [`EventStore::list`]. Empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub entity_type: Option<String>,
    pub action: Option<EventAction>,
}

/// SQLite-backed append/query store for webhook events.
#[derive(Clone)]
pub struct EventStore {
    conn: Arc<Mutex<Connection>>,
}

impl EventStore {
    /// Opens (or creates) the store at the given path.
    ///
    /// The database is configured with `journal_mode = WAL` and a busy
    /// timeout so concurrent readers don't fail outright. Runs any pending
    /// schema migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::storage(
                    "create database directory",
                    format!("{}: {}", parent.display(), e),
                )
            })?;
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| StoreError::storage("open database", e))?;

        Self::from_connection(conn)
    }

    /// Opens an in-memory store. Used by tests and ephemeral deployments.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::storage("open database", e))?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        // WAL gives crash safety and concurrent readers. In-memory databases
        // report "memory" instead, which is fine — they are ephemeral by
        // design.
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| StoreError::storage("set journal_mode", e))?;
        if !journal_mode.eq_ignore_ascii_case("wal") && !journal_mode.eq_ignore_ascii_case("memory")
        {
            return Err(StoreError::storage(
                "set journal_mode",
                format!("expected wal, got {journal_mode}"),
            ));
        }

        conn.execute_batch("PRAGMA busy_timeout = 5000;")
            .map_err(|e| StoreError::storage("configure pragmas", e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| StoreError::storage("create schema_version table", e))?;

        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| StoreError::storage("get schema version", e))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(EventStore {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run migrations from `from_version` to `CURRENT_SCHEMA_VERSION`.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<()> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(StoreError::storage(
                "schema version",
                format!(
                    "database schema version {from_version} is newer than supported \
                     version {CURRENT_SCHEMA_VERSION}; upgrade the application"
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS webhook_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    delivery_id TEXT NOT NULL UNIQUE,
                    entity_type TEXT NOT NULL,
                    entity_id TEXT NOT NULL,
                    action TEXT NOT NULL,
                    data TEXT NOT NULL,
                    updated_from TEXT,
                    url TEXT,
                    created_at TEXT,
                    webhook_timestamp INTEGER,
                    webhook_id TEXT,
                    raw_payload TEXT NOT NULL,
                    received_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_entity_recency
                    ON webhook_events(entity_type, entity_id, action, received_at DESC);
                CREATE INDEX IF NOT EXISTS idx_received_at
                    ON webhook_events(received_at DESC);
                "#,
            )
            .map_err(|e| StoreError::storage("migration v1", e))?;
        }

        conn.execute(
            "INSERT INTO schema_version (id, version) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET version = ?1",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| StoreError::storage("record schema version", e))?;

        Ok(())
    }

    /// Persists an accepted envelope.
    ///
    /// Assigns the monotonic row id and `received_at`, and returns the
    /// stored record. The insert is a single atomic statement: either the
    /// whole row lands or nothing does. A delivery id that already exists
    /// yields [`StoreError::DuplicateDelivery`].
    pub async fn append(
        &self,
        envelope: &WebhookEnvelope,
        delivery_id: &DeliveryId,
        raw_body: &[u8],
    ) -> Result<StoredEvent> {
        let conn = Arc::clone(&self.conn);
        let envelope = envelope.clone();
        let delivery_id = delivery_id.clone();
        let raw_payload = String::from_utf8_lossy(raw_body).into_owned();

        run_blocking("append", move || {
            let conn = lock(&conn, "append")?;
            append_inner(&conn, &envelope, &delivery_id, &raw_payload)
        })
        .await
    }

    /// Returns the most recent event matching `(entity_type, entity_id,
    /// action)` whose `received_at` is within `within` of now, or `None`.
    ///
    /// `exclude` skips the named delivery so a just-appended event never
    /// dedups against itself. The comparison uses the store's own
    /// `received_at` clock, not the payload's self-reported timestamps.
    pub async fn find_recent(
        &self,
        entity_type: &str,
        entity_id: &EntityId,
        action: EventAction,
        within: Duration,
        exclude: Option<&DeliveryId>,
    ) -> Result<Option<StoredEvent>> {
        let conn = Arc::clone(&self.conn);
        let entity_type = entity_type.to_string();
        let entity_id = entity_id.clone();
        let exclude = exclude.cloned();

        run_blocking("find_recent", move || {
            let conn = lock(&conn, "find_recent")?;
            let excluded = exclude.as_ref().map(|d| d.as_str()).unwrap_or("");
            let row = conn
                .query_row(
                    "SELECT * FROM webhook_events
                     WHERE entity_type = ?1 AND entity_id = ?2 AND action = ?3
                       AND delivery_id <> ?4
                     ORDER BY received_at DESC, id DESC
                     LIMIT 1",
                    params![entity_type, entity_id.as_str(), action.as_str(), excluded],
                    row_to_event,
                )
                .optional()
                .map_err(|e| StoreError::storage("find_recent", e))?;

            let Some(event) = row else { return Ok(None) };

            let age = Utc::now().signed_duration_since(event.received_at);
            let window = chrono::Duration::from_std(within)
                .map_err(|e| StoreError::storage("find_recent", e))?;
            if age <= window {
                Ok(Some(event))
            } else {
                Ok(None)
            }
        })
        .await
    }

    /// Lists stored events ordered by `received_at` descending (id as the
    /// tiebreaker), optionally filtered by entity type and action.
    pub async fn list(
        &self,
        filter: ListFilter,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<StoredEvent>> {
        let conn = Arc::clone(&self.conn);

        run_blocking("list", move || {
            let conn = lock(&conn, "list")?;

            let mut sql = String::from("SELECT * FROM webhook_events WHERE 1=1");
            let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(entity_type) = &filter.entity_type {
                sql.push_str(" AND entity_type = ?");
                args.push(Box::new(entity_type.clone()));
            }
            if let Some(action) = filter.action {
                sql.push_str(" AND action = ?");
                args.push(Box::new(action.as_str()));
            }
            sql.push_str(" ORDER BY received_at DESC, id DESC LIMIT ? OFFSET ?");
            args.push(Box::new(limit));
            args.push(Box::new(skip));

            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| StoreError::storage("list", e))?;
            let params = rusqlite::params_from_iter(args.iter().map(|a| a.as_ref()));
            let rows = stmt
                .query_map(params, row_to_event)
                .map_err(|e| StoreError::storage("list", e))?;

            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(|e| StoreError::storage("list", e))
        })
        .await
    }

    /// Fetches a stored event by its store-assigned id.
    pub async fn get(&self, id: i64) -> Result<Option<StoredEvent>> {
        let conn = Arc::clone(&self.conn);

        run_blocking("get", move || {
            let conn = lock(&conn, "get")?;
            conn.query_row(
                "SELECT * FROM webhook_events WHERE id = ?1",
                params![id],
                row_to_event,
            )
            .optional()
            .map_err(|e| StoreError::storage("get", e))
        })
        .await
    }

    /// Fetches a stored event by its delivery id.
    pub async fn get_by_delivery(&self, delivery_id: &DeliveryId) -> Result<Option<StoredEvent>> {
        let conn = Arc::clone(&self.conn);
        let delivery_id = delivery_id.clone();

        run_blocking("get_by_delivery", move || {
            let conn = lock(&conn, "get_by_delivery")?;
            conn.query_row(
                "SELECT * FROM webhook_events WHERE delivery_id = ?1",
                params![delivery_id.as_str()],
                row_to_event,
            )
            .optional()
            .map_err(|e| StoreError::storage("get_by_delivery", e))
        })
        .await
    }

    /// Rewrites a row's `received_at`, for exercising the cooldown window
    /// in tests. The production surface is append-only.
    #[cfg(test)]
    pub(crate) async fn set_received_at(&self, id: i64, received_at: DateTime<Utc>) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        run_blocking("set_received_at", move || {
            let conn = lock(&conn, "set_received_at")?;
            conn.execute(
                "UPDATE webhook_events SET received_at = ?1 WHERE id = ?2",
                params![encode_timestamp(&received_at), id],
            )
            .map_err(|e| StoreError::storage("set_received_at", e))?;
            Ok(())
        })
        .await
    }
}

/// Runs a closure on the blocking pool, mapping join failures to storage
/// errors.
async fn run_blocking<T, F>(operation: &'static str, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StoreError::storage(operation, format!("blocking task failed: {e}")))?
}

fn lock<'a>(
    conn: &'a Arc<Mutex<Connection>>,
    operation: &'static str,
) -> Result<std::sync::MutexGuard<'a, Connection>> {
    conn.lock()
        .map_err(|_| StoreError::storage(operation, "connection mutex poisoned"))
}

fn append_inner(
    conn: &Connection,
    envelope: &WebhookEnvelope,
    delivery_id: &DeliveryId,
    raw_payload: &str,
) -> Result<StoredEvent> {
    let entity_id = envelope.entity_id();
    // Truncate to the same microsecond precision used by `encode_timestamp`,
    // so the value returned here matches the value read back from the store.
    let received_at = Utc::now().trunc_subsecs(6);

    let data_json = serde_json::to_string(&envelope.data)
        .map_err(|e| StoreError::storage("append", e))?;
    let updated_from_json = envelope
        .updated_from
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StoreError::storage("append", e))?;

    let inserted = conn.execute(
        "INSERT INTO webhook_events
            (delivery_id, entity_type, entity_id, action, data, updated_from,
             url, created_at, webhook_timestamp, webhook_id, raw_payload, received_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            delivery_id.as_str(),
            envelope.entity_type,
            entity_id.as_str(),
            envelope.action.as_str(),
            data_json,
            updated_from_json,
            envelope.url,
            envelope.created_at,
            envelope.webhook_timestamp,
            envelope.webhook_id,
            raw_payload,
            encode_timestamp(&received_at),
        ],
    );

    match inserted {
        Ok(_) => {}
        Err(rusqlite::Error::SqliteFailure(e, Some(msg)))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && msg.contains("delivery_id") =>
        {
            return Err(StoreError::DuplicateDelivery(delivery_id.clone()));
        }
        Err(e) => return Err(StoreError::storage("append", e)),
    }

    let id = conn.last_insert_rowid();
    debug!(event_id = id, delivery_id = %delivery_id, "Stored webhook event");

    Ok(StoredEvent {
        id,
        delivery_id: delivery_id.clone(),
        entity_type: envelope.entity_type.clone(),
        entity_id,
        action: envelope.action,
        data: envelope.data.clone(),
        updated_from: envelope.updated_from.clone(),
        url: envelope.url.clone(),
        created_at: envelope.created_at.clone(),
        webhook_timestamp: envelope.webhook_timestamp,
        webhook_id: envelope.webhook_id.clone(),
        raw_payload: raw_payload.to_string(),
        received_at,
    })
}

/// RFC 3339 with microsecond precision. A fixed format keeps the textual
/// ordering consistent with the chronological ordering.
fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredEvent> {
    let data_json: String = row.get("data")?;
    let data = decode_object(&data_json)?;

    let updated_from = match row.get::<_, Option<String>>("updated_from")? {
        Some(json) => Some(decode_object(&json)?),
        None => None,
    };

    let action_str: String = row.get("action")?;
    let action = EventAction::parse(&action_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            format!("unknown action in store: {action_str:?}").into(),
        )
    })?;

    let received_at_str: String = row.get("received_at")?;
    let received_at = DateTime::parse_from_rfc3339(&received_at_str)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })?
        .with_timezone(&Utc);

    Ok(StoredEvent {
        id: row.get("id")?,
        delivery_id: DeliveryId::new(row.get::<_, String>("delivery_id")?),
        entity_type: row.get("entity_type")?,
        entity_id: EntityId::new(row.get::<_, String>("entity_id")?),
        action,
        data,
        updated_from,
        url: row.get("url")?,
        created_at: row.get("created_at")?,
        webhook_timestamp: row.get("webhook_timestamp")?,
        webhook_id: row.get("webhook_id")?,
        raw_payload: row.get("raw_payload")?,
        received_at,
    })
}

fn decode_object(json: &str) -> rusqlite::Result<Map<String, Value>> {
    serde_json::from_str(json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhooks::parse_envelope;
    use serde_json::json;

    fn envelope(value: serde_json::Value) -> WebhookEnvelope {
        parse_envelope(&serde_json::to_vec(&value).unwrap()).unwrap()
    }

    fn issue_update(id: &str) -> WebhookEnvelope {
        envelope(json!({
            "action": "update",
            "type": "Issue",
            "data": {
                "id": id,
                "title": "Fix login flow",
                "labels": [{ "name": "vibe-coding" }],
                "nested": { "deep": [1, 2, { "three": true }] }
            },
            "updatedFrom": { "updatedAt": "2024-04-30T09:00:00.000Z" },
            "url": "https://linear.app/acme/issue/ENG-123"
        }))
    }

    #[tokio::test]
    async fn append_roundtrips_structured_fields() {
        let store = EventStore::open_in_memory().unwrap();
        let env = issue_update("i-1");
        let raw = br#"{"verbatim":"body"}"#;

        let stored = store
            .append(&env, &DeliveryId::new("d-1"), raw)
            .await
            .unwrap();

        assert_eq!(stored.entity_id.as_str(), "i-1");
        assert_eq!(stored.raw_payload, r#"{"verbatim":"body"}"#);

        // Round-trip through SQLite keeps the nested structure intact —
        // no lossy string coercion.
        let fetched = store.get(stored.id).await.unwrap().unwrap();
        assert_eq!(fetched.data, env.data);
        assert_eq!(fetched.updated_from, env.updated_from);
        assert_eq!(fetched, stored);
    }

    #[tokio::test]
    async fn get_is_idempotent() {
        let store = EventStore::open_in_memory().unwrap();
        let stored = store
            .append(&issue_update("i-1"), &DeliveryId::new("d-1"), b"{}")
            .await
            .unwrap();

        let first = store.get(stored.id).await.unwrap().unwrap();
        let second = store.get(stored.id).await.unwrap().unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn duplicate_delivery_id_is_rejected() {
        let store = EventStore::open_in_memory().unwrap();
        let env = issue_update("i-1");

        store
            .append(&env, &DeliveryId::new("d-1"), b"{}")
            .await
            .unwrap();
        let result = store.append(&env, &DeliveryId::new("d-1"), b"{}").await;

        assert!(matches!(result, Err(StoreError::DuplicateDelivery(d)) if d.as_str() == "d-1"));
    }

    #[tokio::test]
    async fn identical_events_with_distinct_deliveries_both_stored() {
        let store = EventStore::open_in_memory().unwrap();
        let env = issue_update("i-1");

        let a = store
            .append(&env, &DeliveryId::new("d-1"), b"{}")
            .await
            .unwrap();
        let b = store
            .append(&env, &DeliveryId::new("d-2"), b"{}")
            .await
            .unwrap();

        assert_ne!(a.id, b.id);
        assert!(b.id > a.id, "row ids are monotonic");
    }

    #[tokio::test]
    async fn get_by_delivery_finds_row() {
        let store = EventStore::open_in_memory().unwrap();
        let stored = store
            .append(&issue_update("i-1"), &DeliveryId::new("d-42"), b"{}")
            .await
            .unwrap();

        let fetched = store
            .get_by_delivery(&DeliveryId::new("d-42"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.id, stored.id);

        assert!(
            store
                .get_by_delivery(&DeliveryId::new("d-404"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn list_orders_newest_first_and_paginates() {
        let store = EventStore::open_in_memory().unwrap();
        for i in 0..5 {
            store
                .append(
                    &issue_update(&format!("i-{i}")),
                    &DeliveryId::new(format!("d-{i}")),
                    b"{}",
                )
                .await
                .unwrap();
        }

        let all = store.list(ListFilter::default(), 0, 100).await.unwrap();
        assert_eq!(all.len(), 5);
        // Newest first
        assert_eq!(all[0].entity_id.as_str(), "i-4");
        assert_eq!(all[4].entity_id.as_str(), "i-0");

        let page = store.list(ListFilter::default(), 2, 2).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].entity_id.as_str(), "i-2");
        assert_eq!(page[1].entity_id.as_str(), "i-1");
    }

    #[tokio::test]
    async fn list_filters_by_entity_type_and_action() {
        let store = EventStore::open_in_memory().unwrap();
        store
            .append(&issue_update("i-1"), &DeliveryId::new("d-1"), b"{}")
            .await
            .unwrap();
        store
            .append(
                &envelope(json!({
                    "action": "create",
                    "type": "Comment",
                    "data": { "id": "c-1" }
                })),
                &DeliveryId::new("d-2"),
                b"{}",
            )
            .await
            .unwrap();

        let issues = store
            .list(
                ListFilter {
                    entity_type: Some("Issue".to_string()),
                    action: None,
                },
                0,
                100,
            )
            .await
            .unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].entity_type, "Issue");

        let creates = store
            .list(
                ListFilter {
                    entity_type: None,
                    action: Some(EventAction::Create),
                },
                0,
                100,
            )
            .await
            .unwrap();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].action, EventAction::Create);
    }

    #[tokio::test]
    async fn find_recent_respects_window() {
        let store = EventStore::open_in_memory().unwrap();
        let stored = store
            .append(&issue_update("i-1"), &DeliveryId::new("d-1"), b"{}")
            .await
            .unwrap();

        let entity_id = EntityId::new("i-1");

        // Fresh event is inside a 30s window
        let hit = store
            .find_recent(
                "Issue",
                &entity_id,
                EventAction::Update,
                Duration::from_secs(30),
                None,
            )
            .await
            .unwrap();
        assert!(hit.is_some());

        // Backdate it past the window
        store
            .set_received_at(stored.id, Utc::now() - chrono::Duration::seconds(31))
            .await
            .unwrap();

        let miss = store
            .find_recent(
                "Issue",
                &entity_id,
                EventAction::Update,
                Duration::from_secs(30),
                None,
            )
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn find_recent_excludes_named_delivery() {
        let store = EventStore::open_in_memory().unwrap();
        store
            .append(&issue_update("i-1"), &DeliveryId::new("d-1"), b"{}")
            .await
            .unwrap();

        // The event must not dedup against itself
        let excluded = store
            .find_recent(
                "Issue",
                &EntityId::new("i-1"),
                EventAction::Update,
                Duration::from_secs(30),
                Some(&DeliveryId::new("d-1")),
            )
            .await
            .unwrap();
        assert!(excluded.is_none());

        // A different delivery for the same entity is still found
        store
            .append(&issue_update("i-1"), &DeliveryId::new("d-2"), b"{}")
            .await
            .unwrap();
        let hit = store
            .find_recent(
                "Issue",
                &EntityId::new("i-1"),
                EventAction::Update,
                Duration::from_secs(30),
                Some(&DeliveryId::new("d-2")),
            )
            .await
            .unwrap();
        assert_eq!(hit.unwrap().delivery_id.as_str(), "d-1");
    }

    #[tokio::test]
    async fn find_recent_ignores_other_entity_or_action() {
        let store = EventStore::open_in_memory().unwrap();
        store
            .append(&issue_update("i-1"), &DeliveryId::new("d-1"), b"{}")
            .await
            .unwrap();

        let other_entity = store
            .find_recent(
                "Issue",
                &EntityId::new("i-2"),
                EventAction::Update,
                Duration::from_secs(30),
                None,
            )
            .await
            .unwrap();
        assert!(other_entity.is_none());

        let other_action = store
            .find_recent(
                "Issue",
                &EntityId::new("i-1"),
                EventAction::Create,
                Duration::from_secs(30),
                None,
            )
            .await
            .unwrap();
        assert!(other_action.is_none());
    }

    #[tokio::test]
    async fn open_creates_database_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("events.db");

        let store = EventStore::open(&path).unwrap();
        store
            .append(&issue_update("i-1"), &DeliveryId::new("d-1"), b"{}")
            .await
            .unwrap();
        drop(store);

        // Reopen and confirm the row survived
        let reopened = EventStore::open(&path).unwrap();
        let events = reopened.list(ListFilter::default(), 0, 10).await.unwrap();
        assert_eq!(events.len(), 1);
    }
}
