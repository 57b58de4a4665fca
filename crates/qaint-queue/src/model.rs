//! Operation domain model: the unit of deferred external work the queue
//! manages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of external action an operation performs once claimed.
///
/// Opaque to the queue itself — the coordinator only uses this to pick
/// which [`crate::port::ExternalPort`] method to call; it never interprets
/// `payload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    CreateIssue,
    UpdateIssue,
    AddComment,
    Link,
    BulkCreate,
}

impl OperationKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateIssue => "create_issue",
            Self::UpdateIssue => "update_issue",
            Self::AddComment => "add_comment",
            Self::Link => "link",
            Self::BulkCreate => "bulk_create",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "create_issue" => Some(Self::CreateIssue),
            "update_issue" => Some(Self::UpdateIssue),
            "add_comment" => Some(Self::AddComment),
            "link" => Some(Self::Link),
            "bulk_create" => Some(Self::BulkCreate),
            _ => None,
        }
    }
}

/// Lifecycle state of an operation row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending,
    InFlight,
    Completed,
    Failed,
    Cancelled,
}

impl OperationStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value {
            "in_flight" => Self::InFlight,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => Self::Pending,
        }
    }
}

/// A unit of deferred external work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: String,
    pub kind: OperationKind,
    pub payload: serde_json::Value,
    pub affinity_key: Option<String>,
    pub mapping_ref: Option<String>,
    /// Correlation triple for a `create_issue` operation's post-completion
    /// mapping write. Not part of `payload` — the port never sees these —
    /// but the queue needs them to find-or-create the Mapping row without
    /// having to parse the opaque payload it hands to the port.
    pub test_run_id: Option<String>,
    pub test_name: Option<String>,
    pub fingerprint: Option<String>,
    pub status: OperationStatus,
    pub priority: i64,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub attempt: i64,
    pub max_attempts: i64,
    pub last_error: Option<String>,
    pub error_detail: Option<serde_json::Value>,
    pub rate_limit_until: Option<DateTime<Utc>>,
    pub lease_owner: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub cancel_requested: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Default priority for an enqueue request that doesn't specify one.
pub const DEFAULT_PRIORITY: i64 = 100;

/// Parameters accepted by [`crate::store::OperationRepository::enqueue`].
#[derive(Debug, Clone, Default)]
pub struct EnqueueRequest {
    pub kind: OperationKind,
    pub payload: serde_json::Value,
    pub priority: Option<i64>,
    pub affinity_key: Option<String>,
    pub mapping_ref: Option<String>,
    pub max_attempts: Option<i64>,
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Required for `kind = CreateIssue`; ignored for every other kind,
    /// which instead carries an already-known `mapping_ref`.
    pub test_run_id: Option<String>,
    pub test_name: Option<String>,
    pub fingerprint: Option<String>,
}

impl Default for OperationKind {
    fn default() -> Self {
        Self::CreateIssue
    }
}

/// Aggregate counts returned by `stats()`.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueStats {
    pub pending: i64,
    pub in_flight: i64,
    pub completed: i64,
    pub failed: i64,
    pub cancelled: i64,
}
