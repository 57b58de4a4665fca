//! SQLite-backed repository for the mapping table.

use chrono::Utc;
use qaint_core::time::{format_utc, parse_utc};
use qaint_store::{SqlitePool, StoreError};
use sqlx::Row;
use uuid::Uuid;

use crate::error::MappingError;
use crate::model::{
    ExternalUpdate, Mapping, ResolutionStatus, SyncStatus, WorkerDescriptor,
    resolution_from_external_status,
};

/// Repository over the `mappings` table.
///
/// Find-or-create is split across two calls deliberately: `find` is a plain
/// read used by producers to decide whether to enqueue `create_issue`, and
/// `create_from_worker` is only called from the worker path after the
/// external issue actually exists, so a race between two producers is
/// arbitrated by the table's `(test_run_id, test_name, fingerprint)`
/// uniqueness constraint rather than by an application-level lock.
#[derive(Clone)]
pub struct MappingRepository {
    pool: SqlitePool,
}

impl MappingRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Look up an existing mapping for `(test_run_id, test_name, fingerprint)`.
    ///
    /// Returns `None` when no mapping exists yet; the caller's cue to
    /// enqueue a `create_issue` operation.
    ///
    /// # Errors
    ///
    /// Returns a [`MappingError`] if the query fails.
    pub async fn find(
        &self,
        test_run_id: &str,
        test_name: &str,
        fingerprint: &str,
    ) -> Result<Option<Mapping>, MappingError> {
        let row = sqlx::query(
            "SELECT * FROM mappings WHERE test_run_id = ? AND test_name = ? AND fingerprint = ?",
        )
        .bind(test_run_id)
        .bind(test_name)
        .bind(fingerprint)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from)?;

        row.map(|r| row_to_mapping(&r)).transpose()
    }

    /// Fetch a mapping by its external issue key, as used by the Event
    /// Processor when an inbound callback arrives.
    ///
    /// # Errors
    ///
    /// Returns a [`MappingError`] if the query fails.
    pub async fn find_by_external_key(
        &self,
        external_issue_key: &str,
    ) -> Result<Option<Mapping>, MappingError> {
        let row = sqlx::query("SELECT * FROM mappings WHERE external_issue_key = ?")
            .bind(external_issue_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        row.map(|r| row_to_mapping(&r)).transpose()
    }

    /// Insert a new mapping row after a worker's `create_issue` operation
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::AlreadyExists`] if another worker won the
    /// race for this `(test_run_id, test_name, fingerprint)` triple, and
    /// [`MappingError::Store`] for any other store failure.
    pub async fn create_from_worker(
        &self,
        test_run_id: &str,
        test_name: &str,
        fingerprint: &str,
        descriptor: WorkerDescriptor,
    ) -> Result<Mapping, MappingError> {
        let now = Utc::now();
        let id = Uuid::new_v4().to_string();

        let result = sqlx::query(
            "INSERT INTO mappings (
                id, fingerprint, test_run_id, test_name,
                external_issue_id, external_issue_key, external_project_key,
                summary, status, priority, issue_type, assignee,
                sync_status, resolution_status, last_synced_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(fingerprint)
        .bind(test_run_id)
        .bind(test_name)
        .bind(&descriptor.external_issue_id)
        .bind(&descriptor.external_issue_key)
        .bind(&descriptor.external_project_key)
        .bind(&descriptor.summary)
        .bind(&descriptor.status)
        .bind(&descriptor.priority)
        .bind(&descriptor.issue_type)
        .bind(&descriptor.assignee)
        .bind(SyncStatus::Synced.as_str())
        .bind(ResolutionStatus::Open.as_str())
        .bind(format_utc(now))
        .bind(format_utc(now))
        .bind(format_utc(now))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => self
                .find(test_run_id, test_name, fingerprint)
                .await?
                .ok_or_else(|| MappingError::Store(StoreError::not_found("mappings", id))),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                Err(MappingError::AlreadyExists)
            }
            Err(e) => Err(MappingError::Store(StoreError::from(e))),
        }
    }

    /// Apply worker-authoritative fields after a non-creating outbound
    /// operation (`update_issue`, `add_comment`, `link`) completes.
    ///
    /// # Errors
    ///
    /// Returns a [`MappingError`] if the update fails.
    pub async fn update_from_worker(
        &self,
        mapping_id: &str,
        descriptor: WorkerDescriptor,
    ) -> Result<u64, MappingError> {
        let now = format_utc(Utc::now());
        let result = sqlx::query(
            "UPDATE mappings SET
                external_issue_id = COALESCE(?, external_issue_id),
                external_issue_key = COALESCE(?, external_issue_key),
                external_project_key = COALESCE(?, external_project_key),
                summary = COALESCE(?, summary),
                status = COALESCE(?, status),
                priority = COALESCE(?, priority),
                issue_type = COALESCE(?, issue_type),
                assignee = COALESCE(?, assignee),
                sync_status = ?,
                last_synced_at = ?,
                updated_at = ?
             WHERE id = ?",
        )
        .bind(&descriptor.external_issue_id)
        .bind(&descriptor.external_issue_key)
        .bind(&descriptor.external_project_key)
        .bind(&descriptor.summary)
        .bind(&descriptor.status)
        .bind(&descriptor.priority)
        .bind(&descriptor.issue_type)
        .bind(&descriptor.assignee)
        .bind(SyncStatus::Synced.as_str())
        .bind(&now)
        .bind(&now)
        .bind(mapping_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(result.rows_affected())
    }

    /// Apply an inbound-callback-driven update to the mapping addressed by
    /// `external_issue_key`, recomputing `resolution_status`.
    ///
    /// Returns `false` if no mapping exists for that key yet (the external
    /// tracker may have an issue we don't own, or the `Created` event for
    /// it hasn't produced a mapping); the caller treats this as a no-op,
    /// not an error.
    ///
    /// # Errors
    ///
    /// Returns a [`MappingError`] if the update fails.
    pub async fn update_from_event(
        &self,
        external_issue_key: &str,
        update: ExternalUpdate,
    ) -> Result<bool, MappingError> {
        let Some(existing) = self.find_by_external_key(external_issue_key).await? else {
            return Ok(false);
        };

        let effective_status = update.status.as_deref().unwrap_or(
            existing
                .status
                .as_deref()
                .unwrap_or(existing.resolution_status.as_str()),
        );
        let resolution = resolution_from_external_status(effective_status);
        let now = Utc::now();
        let resolved_at = if resolution.is_terminal() && existing.resolved_at.is_none() {
            Some(format_utc(now))
        } else {
            existing.resolved_at.map(format_utc)
        };

        let result = sqlx::query(
            "UPDATE mappings SET
                status = COALESCE(?, status),
                priority = COALESCE(?, priority),
                issue_type = COALESCE(?, issue_type),
                assignee = COALESCE(?, assignee),
                resolution_status = ?,
                resolved_at = ?,
                sync_status = ?,
                last_synced_at = ?,
                updated_at = ?
             WHERE external_issue_key = ?",
        )
        .bind(&update.status)
        .bind(&update.priority)
        .bind(&update.issue_type)
        .bind(&update.assignee)
        .bind(resolution.as_str())
        .bind(&resolved_at)
        .bind(SyncStatus::Synced.as_str())
        .bind(format_utc(now))
        .bind(format_utc(now))
        .bind(external_issue_key)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(result.rows_affected() > 0)
    }

    /// Fetch a mapping by its opaque id.
    ///
    /// # Errors
    ///
    /// Returns a [`MappingError`] if the query fails.
    pub async fn get(&self, id: &str) -> Result<Option<Mapping>, MappingError> {
        let row = sqlx::query("SELECT * FROM mappings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        row.map(|r| row_to_mapping(&r)).transpose()
    }
}

fn row_to_mapping(row: &sqlx::sqlite::SqliteRow) -> Result<Mapping, MappingError> {
    let parse_ts = |s: Option<String>| -> Result<Option<chrono::DateTime<Utc>>, MappingError> {
        s.map(|s| parse_utc(&s).map_err(|_| MappingError::Store(StoreError::not_found("mappings", "unparseable timestamp"))))
            .transpose()
    };

    Ok(Mapping {
        id: row.try_get("id").map_err(StoreError::from)?,
        fingerprint: row.try_get("fingerprint").map_err(StoreError::from)?,
        test_run_id: row.try_get("test_run_id").map_err(StoreError::from)?,
        test_name: row.try_get("test_name").map_err(StoreError::from)?,
        external_issue_id: row.try_get("external_issue_id").map_err(StoreError::from)?,
        external_issue_key: row.try_get("external_issue_key").map_err(StoreError::from)?,
        external_project_key: row
            .try_get("external_project_key")
            .map_err(StoreError::from)?,
        summary: row.try_get("summary").map_err(StoreError::from)?,
        status: row.try_get("status").map_err(StoreError::from)?,
        priority: row.try_get("priority").map_err(StoreError::from)?,
        issue_type: row.try_get("issue_type").map_err(StoreError::from)?,
        assignee: row.try_get("assignee").map_err(StoreError::from)?,
        failure_category: row.try_get("failure_category").map_err(StoreError::from)?,
        module: row.try_get("module").map_err(StoreError::from)?,
        language: row.try_get("language").map_err(StoreError::from)?,
        environment: row.try_get("environment").map_err(StoreError::from)?,
        browser: row.try_get("browser").map_err(StoreError::from)?,
        last_synced_at: parse_ts(row.try_get("last_synced_at").map_err(StoreError::from)?)?,
        sync_status: SyncStatus::parse(&row.try_get::<String, _>("sync_status").map_err(StoreError::from)?),
        sync_error: row.try_get("sync_error").map_err(StoreError::from)?,
        resolution_status: ResolutionStatus::parse(
            &row.try_get::<String, _>("resolution_status")
                .map_err(StoreError::from)?,
        ),
        resolved_at: parse_ts(row.try_get("resolved_at").map_err(StoreError::from)?)?,
        created_at: parse_utc(&row.try_get::<String, _>("created_at").map_err(StoreError::from)?)
            .map_err(|_| MappingError::Store(StoreError::not_found("mappings", "created_at")))?,
        updated_at: parse_utc(&row.try_get::<String, _>("updated_at").map_err(StoreError::from)?)
            .map_err(|_| MappingError::Store(StoreError::not_found("mappings", "updated_at")))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use qaint_store::{connect, run_migrations};

    async fn test_repo() -> MappingRepository {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        MappingRepository::new(pool)
    }

    #[tokio::test]
    async fn find_returns_none_before_creation() {
        let repo = test_repo().await;
        let found = repo.find("run-1", "login", "fp-1").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn create_then_find_round_trips() {
        let repo = test_repo().await;
        let descriptor = WorkerDescriptor {
            external_issue_id: Some("1001".into()),
            external_issue_key: Some("QA-1".into()),
            external_project_key: Some("QA".into()),
            ..Default::default()
        };
        let created = repo
            .create_from_worker("run-1", "login", "fp-1", descriptor)
            .await
            .unwrap();
        assert_eq!(created.external_issue_key.as_deref(), Some("QA-1"));

        let found = repo.find("run-1", "login", "fp-1").await.unwrap().unwrap();
        assert_eq!(found.id, created.id);
    }

    #[tokio::test]
    async fn second_create_for_same_triple_is_rejected() {
        let repo = test_repo().await;
        let descriptor = WorkerDescriptor {
            external_issue_key: Some("QA-1".into()),
            ..Default::default()
        };
        repo.create_from_worker("run-1", "login", "fp-1", descriptor.clone())
            .await
            .unwrap();

        let second = repo
            .create_from_worker(
                "run-1",
                "login",
                "fp-1",
                WorkerDescriptor {
                    external_issue_key: Some("QA-2".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(second, Err(MappingError::AlreadyExists)));
    }

    #[tokio::test]
    async fn update_from_event_recomputes_resolution_status() {
        let repo = test_repo().await;
        repo.create_from_worker(
            "run-1",
            "login",
            "fp-1",
            WorkerDescriptor {
                external_issue_key: Some("QA-1".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let updated = repo
            .update_from_event(
                "QA-1",
                ExternalUpdate {
                    status: Some("Resolved".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated);

        let mapping = repo.find("run-1", "login", "fp-1").await.unwrap().unwrap();
        assert_eq!(mapping.resolution_status, ResolutionStatus::Resolved);
        assert!(mapping.resolved_at.is_some());
    }

    #[tokio::test]
    async fn update_from_event_on_unknown_key_is_noop() {
        let repo = test_repo().await;
        let updated = repo
            .update_from_event("QA-999", ExternalUpdate::default())
            .await
            .unwrap();
        assert!(!updated);
    }
}
