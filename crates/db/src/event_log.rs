//! Append-only event ledger over SQLite

use crate::event::{resolve_resource_type, EventLogEntry, EventPayload};
use chrono::{DateTime, Utc};
use drydock_core::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::debug;

fn db_err(context: &str, err: sqlx::Error) -> Error {
    Error::Database(format!("{context}: {err}"))
}

/// Ledger repository
///
/// Entries are append-only: the only mutation ever applied after insert is
/// the processed-at transition.
#[derive(Clone)]
pub struct EventLogger {
    pool: SqlitePool,
}

impl EventLogger {
    /// Create a ledger over a pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the events table and indexes
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                resource_type TEXT,
                resource_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                processed_at TEXT,
                data TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("failed to create events table", e))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_processed_at ON events (processed_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("failed to create events index", e))?;

        Ok(())
    }

    /// Append one entry, assigning its identity
    ///
    /// The payload must be present and the resource identifiers set; the
    /// resource type tag is always written top-level, never nested.
    pub async fn log_event(&self, entry: &mut EventLogEntry) -> Result<()> {
        let data = entry
            .data
            .as_ref()
            .ok_or_else(|| Error::Validation("event log entry cannot have nil data".to_string()))?;
        if entry.resource_id.is_empty() {
            return Err(Error::Validation("event log entry has no resource id".to_string()));
        }
        if entry.event_type.is_empty() {
            return Err(Error::Validation("event log entry has no event type".to_string()));
        }

        let value = data.to_value()?;
        let result = sqlx::query(
            r#"
            INSERT INTO events (resource_type, resource_id, event_type, timestamp, processed_at, data)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.resource_type.as_str())
        .bind(&entry.resource_id)
        .bind(&entry.event_type)
        .bind(entry.timestamp)
        .bind(entry.processed_at)
        .bind(value.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("failed to insert event", e))?;

        entry.id = Some(result.last_insert_rowid());
        debug!(
            id = entry.id,
            resource = %entry.resource_id,
            event_type = %entry.event_type,
            "logged event"
        );
        Ok(())
    }

    /// Entries not yet handled by a downstream consumer, in insertion order
    pub async fn find_unprocessed_events(&self) -> Result<Vec<EventLogEntry>> {
        let rows = sqlx::query(
            "SELECT * FROM events WHERE processed_at IS NULL ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("failed to query unprocessed events", e))?;

        rows.iter().map(row_to_entry).collect()
    }

    /// Number of unprocessed entries
    pub async fn count_unprocessed_events(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM events WHERE processed_at IS NULL")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| db_err("failed to count unprocessed events", e))
    }

    /// Most recently processed entry, if any
    pub async fn find_last_processed_event(&self) -> Result<Option<EventLogEntry>> {
        let row = sqlx::query(
            "SELECT * FROM events WHERE processed_at IS NOT NULL ORDER BY processed_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("failed to query last processed event", e))?;

        row.as_ref().map(row_to_entry).transpose()
    }

    /// Fetch one entry by identity
    pub async fn find_by_id(&self, id: i64) -> Result<Option<EventLogEntry>> {
        let row = sqlx::query("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("failed to query event", e))?;

        row.as_ref().map(row_to_entry).transpose()
    }

    /// All entries for one resource, in insertion order
    pub async fn find_by_resource(&self, resource_id: &str) -> Result<Vec<EventLogEntry>> {
        let rows = sqlx::query("SELECT * FROM events WHERE resource_id = ? ORDER BY id ASC")
            .bind(resource_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| db_err("failed to query events by resource", e))?;

        rows.iter().map(row_to_entry).collect()
    }

    /// Record that a downstream consumer handled the entry
    ///
    /// Requires a persisted identity. A concurrent double-invocation is a
    /// no-op success; a genuinely missing record is `NotFound` so lost
    /// updates are detected instead of silently succeeding.
    pub async fn mark_processed(&self, entry: &mut EventLogEntry) -> Result<()> {
        let id = entry
            .id
            .ok_or_else(|| Error::MissingIdentity("event has no ID".to_string()))?;

        let now = Utc::now();
        let result = sqlx::query("UPDATE events SET processed_at = ? WHERE id = ? AND processed_at IS NULL")
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("failed to update 'processed at' time", e))?;

        if result.rows_affected() == 0 {
            let existing = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
                "SELECT processed_at FROM events WHERE id = ?",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| db_err("failed to re-check event", e))?;

            return match existing {
                None => Err(Error::NotFound(
                    "failed to update 'processed at' time: not found".to_string(),
                )),
                Some(processed_at) => {
                    // someone else marked it first; adopt their timestamp
                    entry.processed_at = processed_at;
                    Ok(())
                }
            };
        }

        entry.processed_at = Some(now);
        Ok(())
    }

    /// Bulk-mark every unprocessed entry
    ///
    /// Idempotent: already-processed timestamps are never rewritten.
    pub async fn mark_all_events_processed(&self) -> Result<()> {
        sqlx::query("UPDATE events SET processed_at = ? WHERE processed_at IS NULL")
            .bind(Utc::now())
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("failed to mark events processed", e))?;
        Ok(())
    }
}

fn row_to_entry(row: &SqliteRow) -> Result<EventLogEntry> {
    let id: i64 = row.try_get("id").map_err(|e| db_err("bad event row", e))?;
    let top_level: Option<String> = row
        .try_get("resource_type")
        .map_err(|e| db_err("bad event row", e))?;
    let resource_id: String = row
        .try_get("resource_id")
        .map_err(|e| db_err("bad event row", e))?;
    let event_type: String = row
        .try_get("event_type")
        .map_err(|e| db_err("bad event row", e))?;
    let timestamp: DateTime<Utc> = row
        .try_get("timestamp")
        .map_err(|e| db_err("bad event row", e))?;
    let processed_at: Option<DateTime<Utc>> = row
        .try_get("processed_at")
        .map_err(|e| db_err("bad event row", e))?;
    let data_text: Option<String> = row.try_get("data").map_err(|e| db_err("bad event row", e))?;

    let value: serde_json::Value = match data_text.as_deref() {
        Some(text) if !text.is_empty() => serde_json::from_str(text)?,
        _ => {
            return Err(Error::Validation(format!(
                "event {id} has no payload data"
            )))
        }
    };

    let resource_type = resolve_resource_type(top_level.as_deref(), &event_type, &value)?;
    let data = EventPayload::from_value(&event_type, value)?;

    Ok(EventLogEntry {
        id: Some(id),
        resource_type,
        resource_id,
        event_type,
        timestamp,
        processed_at,
        data: Some(data),
    })
}
