//! The mapping domain model: a failure fingerprint's association with an
//! external issue, and the pure status-classification rule that keeps
//! `resolution_status` in sync with whatever the external tracker reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reconciliation state between our cached fields and the external tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Synced,
    Pending,
    Error,
}

impl SyncStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "synced",
            Self::Pending => "pending",
            Self::Error => "error",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "synced" => Self::Synced,
            "error" => Self::Error,
            _ => Self::Pending,
        }
    }
}

/// The mapping's resolution lifecycle, derived from the external tracker's
/// free-text status via [`resolution_from_external_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStatus {
    Open,
    InProgress,
    Resolved,
    Closed,
}

impl ResolutionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "in_progress" => Self::InProgress,
            "resolved" => Self::Resolved,
            "closed" => Self::Closed,
            _ => Self::Open,
        }
    }

    /// Whether this status should stamp `resolved_at` if it is still empty.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

/// Classify an external tracker status string into our resolution lifecycle.
///
/// Case-insensitive substring test, first match wins, in this fixed order:
/// `done`/`resolved`/`fixed` → resolved, `closed` → closed,
/// `progress`/`review`/`testing` → in_progress, else → open.
///
/// This is a documented, preserved quirk rather than a bug: an external
/// status literally named "needs review" will match `review` and classify
/// as `in_progress`, which is the source behavior this mapping preserves.
#[must_use]
pub fn resolution_from_external_status(external_status: &str) -> ResolutionStatus {
    let lower = external_status.to_lowercase();
    if lower.contains("done") || lower.contains("resolved") || lower.contains("fixed") {
        ResolutionStatus::Resolved
    } else if lower.contains("closed") {
        ResolutionStatus::Closed
    } else if lower.contains("progress") || lower.contains("review") || lower.contains("testing") {
        ResolutionStatus::InProgress
    } else {
        ResolutionStatus::Open
    }
}

/// A row in the mapping table: the durable association between a failure
/// fingerprint and an external issue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mapping {
    pub id: String,
    pub fingerprint: String,
    pub test_run_id: String,
    pub test_name: String,
    pub external_issue_id: Option<String>,
    pub external_issue_key: Option<String>,
    pub external_project_key: Option<String>,
    pub summary: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub issue_type: Option<String>,
    pub assignee: Option<String>,
    pub failure_category: Option<String>,
    pub module: Option<String>,
    pub language: Option<String>,
    pub environment: Option<String>,
    pub browser: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_status: SyncStatus,
    pub sync_error: Option<String>,
    pub resolution_status: ResolutionStatus,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a worker learns about an external issue right after creating or
/// mutating it. Authoritative for the fields it sets.
#[derive(Debug, Clone, Default)]
pub struct WorkerDescriptor {
    pub external_issue_id: Option<String>,
    pub external_issue_key: Option<String>,
    pub external_project_key: Option<String>,
    pub summary: Option<String>,
    pub status: Option<String>,
    pub priority: Option<String>,
    pub issue_type: Option<String>,
    pub assignee: Option<String>,
}

/// Fields the Event Processor learns from an inbound callback. Authoritative
/// for upstream-driven fields; only fields that actually changed per the
/// changelog should be set here.
#[derive(Debug, Clone, Default)]
pub struct ExternalUpdate {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub issue_type: Option<String>,
    pub assignee: Option<String>,
}
