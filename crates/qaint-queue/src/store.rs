//! SQLite-backed repository for the operation queue, including the claim
//! query and outcome-handling updates that are the heart of the design.
//!
//! Grounded on the claim-then-conditional-update pattern used by the
//! dispatcher store in the reference corpus: sweep expired leases, select
//! eligible candidates, then issue one conditional `UPDATE ... WHERE
//! status = 'pending' RETURNING *` per candidate and keep only the rows
//! the update actually touched. That per-row `rows_affected`/`RETURNING`
//! check is what makes two coordinators racing on the same row safe
//! without a distributed lock: SQLite serializes writers, so each
//! conditional UPDATE is atomic, and a candidate that lost the race simply
//! returns zero rows and is dropped from the claim.

use chrono::{DateTime, Duration, Utc};
use qaint_core::time::{format_utc, parse_utc};
use qaint_store::{SqlitePool, StoreError};
use serde_json::Value;
use sqlx::Row;
use uuid::Uuid;

use crate::error::QueueError;
use crate::model::{EnqueueRequest, Operation, OperationKind, OperationStatus, QueueStats, DEFAULT_PRIORITY};

/// Repository over the `operations` table.
#[derive(Clone)]
pub struct OperationRepository {
    pool: SqlitePool,
}

impl OperationRepository {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a new pending operation and return its id.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if the insert fails.
    pub async fn enqueue(&self, req: EnqueueRequest) -> Result<String, QueueError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let scheduled_at = req.scheduled_at.unwrap_or(now);

        sqlx::query(
            "INSERT INTO operations (
                id, kind, payload, affinity_key, mapping_ref, test_run_id, test_name,
                fingerprint, status, priority,
                scheduled_at, attempt, max_attempts, rate_limit_until,
                cancel_requested, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, NULL, 0, ?, ?)",
        )
        .bind(&id)
        .bind(req.kind.as_str())
        .bind(req.payload.to_string())
        .bind(&req.affinity_key)
        .bind(&req.mapping_ref)
        .bind(&req.test_run_id)
        .bind(&req.test_name)
        .bind(&req.fingerprint)
        .bind(OperationStatus::Pending.as_str())
        .bind(req.priority.unwrap_or(DEFAULT_PRIORITY))
        .bind(format_utc(scheduled_at))
        .bind(req.max_attempts.unwrap_or(3))
        .bind(format_utc(now))
        .bind(format_utc(now))
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(id)
    }

    /// Fetch an operation by id.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if the query fails.
    pub async fn get(&self, id: &str) -> Result<Option<Operation>, QueueError> {
        let row = sqlx::query("SELECT * FROM operations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        row.map(|r| row_to_operation(&r)).transpose()
    }

    /// Cancel an operation. Succeeds (returns `true`) only when the current
    /// status is `pending` (transitions immediately to `cancelled`) or
    /// `in_flight` (flags `cancel_requested`; the worker observes this on
    /// completion and treats it as terminal instead of writing its outcome).
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if the update fails.
    pub async fn cancel(&self, id: &str) -> Result<bool, QueueError> {
        let now = format_utc(Utc::now());

        let pending_result = sqlx::query(
            "UPDATE operations SET status = ?, updated_at = ? WHERE id = ? AND status = 'pending'",
        )
        .bind(OperationStatus::Cancelled.as_str())
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        if pending_result.rows_affected() > 0 {
            return Ok(true);
        }

        let in_flight_result = sqlx::query(
            "UPDATE operations SET cancel_requested = 1, updated_at = ? WHERE id = ? AND status = 'in_flight'",
        )
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        Ok(in_flight_result.rows_affected() > 0)
    }

    /// Count operations by status.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if the query fails.
    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        let rows = sqlx::query("SELECT status, count(*) as n FROM operations GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;

        let mut stats = QueueStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(StoreError::from)?;
            let n: i64 = row.try_get("n").map_err(StoreError::from)?;
            match OperationStatus::parse(&status) {
                OperationStatus::Pending => stats.pending = n,
                OperationStatus::InFlight => stats.in_flight = n,
                OperationStatus::Completed => stats.completed = n,
                OperationStatus::Failed => stats.failed = n,
                OperationStatus::Cancelled => stats.cancelled = n,
            }
        }
        Ok(stats)
    }

    /// Reclaim leases that expired without the worker reaching a terminal
    /// state, returning expired rows to `pending` with no backoff.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if the update fails.
    pub async fn reclaim_expired_leases(&self) -> Result<u64, QueueError> {
        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE operations
             SET status = 'pending', scheduled_at = ?, lease_owner = NULL,
                 lease_expires_at = NULL, updated_at = ?
             WHERE status = 'in_flight' AND lease_expires_at < ?",
        )
        .bind(format_utc(now))
        .bind(format_utc(now))
        .bind(format_utc(now))
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(result.rows_affected())
    }

    /// Atomically claim up to `max` eligible pending operations for
    /// `worker_id`.
    ///
    /// Eligibility: `status = pending`, `scheduled_at <= now`, and
    /// `rate_limit_until` is null or in the past. Candidates are ordered by
    /// `priority` ascending then `scheduled_at` ascending. Each candidate is
    /// claimed with its own conditional `UPDATE ... WHERE status =
    /// 'pending' RETURNING *`; a candidate that another coordinator beat us
    /// to returns zero rows and is silently dropped from the claim.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if a query fails.
    pub async fn claim(
        &self,
        worker_id: &str,
        max: u32,
        lease_duration: Duration,
    ) -> Result<Vec<Operation>, QueueError> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let now = Utc::now();
        let candidate_ids: Vec<String> = sqlx::query_scalar(
            "SELECT id FROM operations
             WHERE status = 'pending'
               AND scheduled_at <= ?
               AND (rate_limit_until IS NULL OR rate_limit_until <= ?)
             ORDER BY priority ASC, scheduled_at ASC
             LIMIT ?",
        )
        .bind(format_utc(now))
        .bind(format_utc(now))
        .bind(max)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        let lease_expires_at = now + lease_duration;
        let mut claimed = Vec::with_capacity(candidate_ids.len());

        for id in candidate_ids {
            let row = sqlx::query(
                "UPDATE operations
                 SET status = 'in_flight', lease_owner = ?, lease_expires_at = ?,
                     started_at = ?, attempt = attempt + 1, updated_at = ?
                 WHERE id = ? AND status = 'pending'
                 RETURNING *",
            )
            .bind(worker_id)
            .bind(format_utc(lease_expires_at))
            .bind(format_utc(now))
            .bind(format_utc(now))
            .bind(&id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

            if let Some(row) = row {
                claimed.push(row_to_operation(&row)?);
            }
        }

        Ok(claimed)
    }

    /// Record a successful outcome. No-ops (returns `0`) if the lease was
    /// reclaimed out from under the worker.
    ///
    /// `mapping_ref`, when given, is the Mapping row this operation's
    /// `create_issue` call found-or-created; every other kind already
    /// carries its `mapping_ref` at enqueue time and passes `None` here.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if the update fails.
    pub async fn complete(
        &self,
        id: &str,
        worker_id: &str,
        mapping_ref: Option<&str>,
    ) -> Result<u64, QueueError> {
        let now = format_utc(Utc::now());
        let result = sqlx::query(
            "UPDATE operations SET status = 'completed', completed_at = ?, updated_at = ?,
                 mapping_ref = COALESCE(?, mapping_ref)
             WHERE id = ? AND status = 'in_flight' AND lease_owner = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(mapping_ref)
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(result.rows_affected())
    }

    /// Record a rate-limit outcome. Decrements `attempt` by one to undo the
    /// increment `claim` applied, so a rate-limited call never consumes
    /// retry budget, and clears the lease so the row is immediately
    /// reclaimable once `rate_limit_until` passes.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if the update fails.
    pub async fn reschedule_rate_limited(
        &self,
        id: &str,
        worker_id: &str,
        rate_limit_until: DateTime<Utc>,
    ) -> Result<u64, QueueError> {
        let now = format_utc(Utc::now());
        let result = sqlx::query(
            "UPDATE operations
             SET status = 'pending', rate_limit_until = ?, attempt = attempt - 1,
                 lease_owner = NULL, lease_expires_at = NULL, updated_at = ?
             WHERE id = ? AND status = 'in_flight' AND lease_owner = ?",
        )
        .bind(format_utc(rate_limit_until))
        .bind(&now)
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(result.rows_affected())
    }

    /// Record a retryable outcome: reschedule under linear backoff, keep
    /// `status = pending`. `attempt` was already incremented by `claim`.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if the update fails.
    pub async fn reschedule_retryable(
        &self,
        id: &str,
        worker_id: &str,
        scheduled_at: DateTime<Utc>,
        last_error: &str,
    ) -> Result<u64, QueueError> {
        let now = format_utc(Utc::now());
        let result = sqlx::query(
            "UPDATE operations
             SET status = 'pending', scheduled_at = ?, last_error = ?,
                 lease_owner = NULL, lease_expires_at = NULL, updated_at = ?
             WHERE id = ? AND status = 'in_flight' AND lease_owner = ?",
        )
        .bind(format_utc(scheduled_at))
        .bind(last_error)
        .bind(&now)
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(result.rows_affected())
    }

    /// Record a fatal outcome: terminal `failed` state.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if the update fails.
    pub async fn fail(
        &self,
        id: &str,
        worker_id: &str,
        last_error: &str,
        error_detail: &Value,
    ) -> Result<u64, QueueError> {
        let now = format_utc(Utc::now());
        let result = sqlx::query(
            "UPDATE operations
             SET status = 'failed', last_error = ?, error_detail = ?, updated_at = ?
             WHERE id = ? AND status = 'in_flight' AND lease_owner = ?",
        )
        .bind(last_error)
        .bind(error_detail.to_string())
        .bind(&now)
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(result.rows_affected())
    }

    /// Record a cooperative cancellation reached while `in_flight`.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if the update fails.
    pub async fn mark_cancelled(&self, id: &str, worker_id: &str) -> Result<u64, QueueError> {
        let now = format_utc(Utc::now());
        let result = sqlx::query(
            "UPDATE operations SET status = 'cancelled', updated_at = ?
             WHERE id = ? AND status = 'in_flight' AND lease_owner = ?",
        )
        .bind(&now)
        .bind(id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;
        Ok(result.rows_affected())
    }

    /// Whether cancellation was requested while this operation was
    /// in-flight. Checked by the worker after the external call returns,
    /// before it decides how to write its outcome.
    ///
    /// # Errors
    ///
    /// Returns a [`QueueError`] if the query fails.
    pub async fn is_cancel_requested(&self, id: &str) -> Result<bool, QueueError> {
        let flag: Option<i64> = sqlx::query_scalar("SELECT cancel_requested FROM operations WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(flag.unwrap_or(0) != 0)
    }
}

fn row_to_operation(row: &sqlx::sqlite::SqliteRow) -> Result<Operation, QueueError> {
    let parse_ts = |s: Option<String>| -> Result<Option<DateTime<Utc>>, QueueError> {
        s.map(|s| {
            parse_utc(&s).map_err(|_| QueueError::Store(StoreError::not_found("operations", "unparseable timestamp")))
        })
        .transpose()
    };
    let get_str = |name: &'static str| -> Result<String, QueueError> {
        row.try_get(name).map_err(|e| QueueError::Store(e.into()))
    };
    let get_opt_str = |name: &'static str| -> Result<Option<String>, QueueError> {
        row.try_get(name).map_err(|e| QueueError::Store(e.into()))
    };

    let kind_str: String = get_str("kind")?;
    let kind = OperationKind::parse(&kind_str)
        .ok_or_else(|| QueueError::Store(StoreError::not_found("operations", format!("unknown kind {kind_str}"))))?;

    let payload_text: String = get_str("payload")?;
    let payload: Value = serde_json::from_str(&payload_text).unwrap_or(Value::Null);

    let error_detail_text: Option<String> = get_opt_str("error_detail")?;
    let error_detail = error_detail_text.and_then(|s| serde_json::from_str(&s).ok());

    let cancel_requested: i64 = row.try_get("cancel_requested").map_err(|e| QueueError::Store(e.into()))?;

    Ok(Operation {
        id: get_str("id")?,
        kind,
        payload,
        affinity_key: get_opt_str("affinity_key")?,
        mapping_ref: get_opt_str("mapping_ref")?,
        test_run_id: get_opt_str("test_run_id")?,
        test_name: get_opt_str("test_name")?,
        fingerprint: get_opt_str("fingerprint")?,
        status: OperationStatus::parse(&get_str("status")?),
        priority: row.try_get("priority").map_err(|e| QueueError::Store(e.into()))?,
        scheduled_at: parse_utc(&get_str("scheduled_at")?)
            .map_err(|_| QueueError::Store(StoreError::not_found("operations", "scheduled_at")))?,
        started_at: parse_ts(get_opt_str("started_at")?)?,
        completed_at: parse_ts(get_opt_str("completed_at")?)?,
        attempt: row.try_get("attempt").map_err(|e| QueueError::Store(e.into()))?,
        max_attempts: row.try_get("max_attempts").map_err(|e| QueueError::Store(e.into()))?,
        last_error: get_opt_str("last_error")?,
        error_detail,
        rate_limit_until: parse_ts(get_opt_str("rate_limit_until")?)?,
        lease_owner: get_opt_str("lease_owner")?,
        lease_expires_at: parse_ts(get_opt_str("lease_expires_at")?)?,
        cancel_requested: cancel_requested != 0,
        created_at: parse_utc(&get_str("created_at")?)
            .map_err(|_| QueueError::Store(StoreError::not_found("operations", "created_at")))?,
        updated_at: parse_utc(&get_str("updated_at")?)
            .map_err(|_| QueueError::Store(StoreError::not_found("operations", "updated_at")))?,
    })
}
