//! SQLite-backed repository for the event log.

use chrono::{DateTime, Utc};
use qaint_core::time::{format_utc, parse_utc};
use qaint_store::{SqlitePool, StoreError};
use serde_json::Value;
use sqlx::Row;

use crate::error::EventError;
use crate::model::{Event, NewEvent};

/// Derive the deterministic id that makes re-delivery of the same callback
/// a no-op: `hash(event_kind | subject_key | source_timestamp)`.
#[must_use]
pub fn event_id(event_kind: &str, subject_key: &str, source_timestamp: i64) -> String {
    let digest = md5::compute(format!("{event_kind}|{subject_key}|{source_timestamp}"));
    format!("{digest:x}")
}

/// Repository over the `events` table.
#[derive(Clone)]
pub struct EventRepository {
    pool: SqlitePool,
}

impl EventRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new event row unless one with the same id already exists.
    /// Returns `true` if this call performed the insert, `false` if it was
    /// a duplicate.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] if the query fails.
    pub async fn insert_or_ignore(&self, event: &NewEvent) -> Result<bool, EventError> {
        let now = format_utc(Utc::now());
        let result = sqlx::query(
            "INSERT OR IGNORE INTO events (
                id, event_kind, subject_id, subject_key, source_timestamp, actor_id,
                raw_payload, changelog, processed, received_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&event.id)
        .bind(&event.event_kind)
        .bind(&event.subject_id)
        .bind(&event.subject_key)
        .bind(event.source_timestamp)
        .bind(&event.actor_id)
        .bind(&event.raw_payload)
        .bind(event.changelog.as_ref().map(Value::to_string))
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(result.rows_affected() > 0)
    }

    /// Fetch an event by id.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] if the query fails.
    pub async fn get(&self, id: &str) -> Result<Option<Event>, EventError> {
        let row = sqlx::query("SELECT * FROM events WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        row.map(|r| row_to_event(&r)).transpose()
    }

    /// Mark an event processed.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] if the update fails.
    pub async fn mark_processed(&self, id: &str) -> Result<u64, EventError> {
        let now = format_utc(Utc::now());
        let result = sqlx::query(
            "UPDATE events SET processed = 1, processed_at = ?, processing_error = NULL WHERE id = ?",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(result.rows_affected())
    }

    /// Record a dispatch failure without aborting the producer's response;
    /// the row stays `processed = false` for the retry sweep to pick up.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] if the update fails.
    pub async fn mark_error(&self, id: &str, message: &str) -> Result<u64, EventError> {
        let result = sqlx::query("UPDATE events SET processing_error = ? WHERE id = ?")
            .bind(message)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(result.rows_affected())
    }

    /// Unprocessed rows older than `threshold`, for the retry sweep.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] if the query fails.
    pub async fn find_unprocessed_older_than(&self, threshold: DateTime<Utc>) -> Result<Vec<Event>, EventError> {
        let rows = sqlx::query("SELECT * FROM events WHERE processed = 0 AND received_at < ? ORDER BY received_at ASC")
            .bind(format_utc(threshold))
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;
        rows.iter().map(row_to_event).collect()
    }

    /// Delete processed rows received before `cutoff`, enforcing the event
    /// retention horizon.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] if the delete fails.
    pub async fn prune_processed_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, EventError> {
        let result = sqlx::query("DELETE FROM events WHERE processed = 1 AND received_at < ?")
            .bind(format_utc(cutoff))
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(result.rows_affected())
    }
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<Event, EventError> {
    let get_str = |name: &'static str| -> Result<String, EventError> {
        row.try_get(name).map_err(|e| EventError::Store(e.into()))
    };
    let get_opt_str = |name: &'static str| -> Result<Option<String>, EventError> {
        row.try_get(name).map_err(|e| EventError::Store(e.into()))
    };

    let changelog_text: Option<String> = get_opt_str("changelog")?;
    let changelog = changelog_text.and_then(|s| serde_json::from_str(&s).ok());

    let processed: i64 = row.try_get("processed").map_err(|e| EventError::Store(e.into()))?;
    let processed_at_text: Option<String> = get_opt_str("processed_at")?;
    let processed_at = processed_at_text
        .map(|s| parse_utc(&s).map_err(|_| EventError::Store(StoreError::not_found("events", "processed_at"))))
        .transpose()?;

    Ok(Event {
        id: get_str("id")?,
        event_kind: get_str("event_kind")?,
        subject_id: get_str("subject_id")?,
        subject_key: get_str("subject_key")?,
        source_timestamp: row.try_get("source_timestamp").map_err(|e| EventError::Store(e.into()))?,
        actor_id: get_opt_str("actor_id")?,
        raw_payload: row.try_get("raw_payload").map_err(|e| EventError::Store(e.into()))?,
        changelog,
        processed: processed != 0,
        processed_at,
        processing_error: get_opt_str("processing_error")?,
        received_at: parse_utc(&get_str("received_at")?)
            .map_err(|_| EventError::Store(StoreError::not_found("events", "received_at")))?,
    })
}
