//! Event domain model: the durable record of one inbound callback, and the
//! pure classification that decides what it means.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A durable record of one inbound callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub event_kind: String,
    pub subject_id: String,
    pub subject_key: String,
    pub source_timestamp: i64,
    pub actor_id: Option<String>,
    pub raw_payload: Vec<u8>,
    pub changelog: Option<Value>,
    pub processed: bool,
    pub processed_at: Option<DateTime<Utc>>,
    pub processing_error: Option<String>,
    pub received_at: DateTime<Utc>,
}

/// Fields needed to insert a new event row. Everything else (`processed`,
/// `received_at`, …) is the repository's concern.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub id: String,
    pub event_kind: String,
    pub subject_id: String,
    pub subject_key: String,
    pub source_timestamp: i64,
    pub actor_id: Option<String>,
    pub raw_payload: Vec<u8>,
    pub changelog: Option<Value>,
}

/// The minimal shape the processor parses out of an inbound payload. Any
/// additional fields a real tracker sends are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundPayload {
    pub event_kind: String,
    pub subject_id: String,
    pub subject_key: String,
    pub timestamp: i64,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub changelog: Option<Value>,
}

/// The domain transition a dispatched event represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Created,
    Updated,
    Deleted,
}

/// Event kinds recognized out of the box. Anything else is filtered out at
/// the allow-list step and acknowledged with `reason=ignored`.
pub const DEFAULT_EVENT_KINDS: &[&str] = &["issue_created", "issue_updated", "issue_deleted"];

/// Classify an `event_kind` into the transition it represents, or `None` if
/// it isn't on the allow-list.
#[must_use]
pub fn transition_for_kind(event_kind: &str) -> Option<Transition> {
    match event_kind {
        "issue_created" => Some(Transition::Created),
        "issue_updated" => Some(Transition::Updated),
        "issue_deleted" => Some(Transition::Deleted),
        _ => None,
    }
}

/// The outcome handed back to the producer. Mirrors the response contract:
/// 2xx when `accepted`, 4xx when not and the producer can correct it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessResult {
    pub accepted: bool,
    pub reason: Reason,
}

impl ProcessResult {
    #[must_use]
    pub fn accepted(reason: Reason) -> Self {
        Self { accepted: true, reason }
    }

    #[must_use]
    pub fn rejected(reason: Reason) -> Self {
        Self { accepted: false, reason }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    Ok,
    Ignored,
    Duplicate,
    InvalidSignature,
    MissingSignature,
    BadPayload,
}

impl Reason {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Ignored => "ignored",
            Self::Duplicate => "duplicate",
            Self::InvalidSignature => "invalid_signature",
            Self::MissingSignature => "missing_signature",
            Self::BadPayload => "bad_payload",
        }
    }
}

/// Extract the fields `update_from_event` needs from a changelog, keeping
/// only the "to" side of a change and only for the columns the Mapping
/// table tracks.
#[must_use]
pub fn external_update_from_changelog(changelog: &Value) -> qaint_mapping::ExternalUpdate {
    let to = |field: &str| {
        changelog
            .get(field)
            .and_then(|c| c.get("to"))
            .and_then(Value::as_str)
            .map(String::from)
    };
    qaint_mapping::ExternalUpdate {
        status: to("status"),
        priority: to("priority"),
        issue_type: to("type"),
        assignee: to("assignee"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_kind_has_no_transition() {
        assert_eq!(transition_for_kind("comment_added"), None);
    }

    #[test]
    fn reason_as_str_matches_serde_rename() {
        assert_eq!(Reason::InvalidSignature.as_str(), "invalid_signature");
        assert_eq!(Reason::MissingSignature.as_str(), "missing_signature");
        assert_eq!(Reason::BadPayload.as_str(), "bad_payload");
        assert_eq!(
            serde_json::to_value(Reason::BadPayload).unwrap(),
            json!(Reason::BadPayload.as_str())
        );
    }

    #[test]
    fn known_kinds_map_to_transitions() {
        assert_eq!(transition_for_kind("issue_created"), Some(Transition::Created));
        assert_eq!(transition_for_kind("issue_updated"), Some(Transition::Updated));
        assert_eq!(transition_for_kind("issue_deleted"), Some(Transition::Deleted));
    }

    #[test]
    fn changelog_extraction_keeps_only_to_side() {
        let changelog = json!({
            "status": {"from": "Open", "to": "In Progress"},
            "assignee": {"from": null, "to": "alice"},
            "summary": {"from": "a", "to": "b"},
        });
        let update = external_update_from_changelog(&changelog);
        assert_eq!(update.status.as_deref(), Some("In Progress"));
        assert_eq!(update.assignee.as_deref(), Some("alice"));
        assert_eq!(update.priority, None);
    }
}
