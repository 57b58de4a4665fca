//! Placeholder outbound adapter for the external issue tracker.
//!
//! The issue-tracker REST client is an opaque effectful port the core only
//! consumes; a real deployment swaps this adapter for one
//! that actually calls the tracker's API. This one logs the call and
//! fabricates a descriptor, which is enough to exercise the queue's
//! dispatch, dedupe, and retry paths end to end without a live dependency.

use qaint_queue::{ExternalPort, IssueDescriptor, PortError};
use serde_json::Value;
use tracing::info;
use uuid::Uuid;

/// An [`ExternalPort`] that logs every call and returns a synthetic
/// success descriptor. Never used in place of a real tracker client in
/// production; wired here so `qaint-app` boots and the pipeline's claim/
/// dispatch/outcome loop is observable without external credentials.
#[derive(Debug, Clone, Default)]
pub struct LoggingIssueTrackerPort;

impl ExternalPort for LoggingIssueTrackerPort {
    async fn create_issue(&self, payload: Value) -> Result<IssueDescriptor, PortError> {
        let key = format!("QA-{}", short_id());
        info!(%key, %payload, "create_issue (placeholder port)");
        Ok(IssueDescriptor {
            id: Uuid::new_v4().to_string(),
            key,
            project: "QA".to_string(),
            fields: payload,
        })
    }

    async fn update_issue(&self, key: &str, updates: Value) -> Result<IssueDescriptor, PortError> {
        info!(%key, %updates, "update_issue (placeholder port)");
        Ok(IssueDescriptor {
            id: Uuid::new_v4().to_string(),
            key: key.to_string(),
            project: "QA".to_string(),
            fields: updates,
        })
    }

    async fn add_comment(&self, key: &str, comment: Value) -> Result<IssueDescriptor, PortError> {
        info!(%key, %comment, "add_comment (placeholder port)");
        Ok(IssueDescriptor {
            id: Uuid::new_v4().to_string(),
            key: key.to_string(),
            project: "QA".to_string(),
            fields: Value::Null,
        })
    }

    async fn link(&self, inward: &str, outward: &str, link_type: &str) -> Result<(), PortError> {
        info!(%inward, %outward, %link_type, "link (placeholder port)");
        Ok(())
    }

    async fn bulk_create(&self, items: Vec<Value>) -> Result<Vec<IssueDescriptor>, PortError> {
        info!(count = items.len(), "bulk_create (placeholder port)");
        Ok(items
            .into_iter()
            .map(|fields| IssueDescriptor {
                id: Uuid::new_v4().to_string(),
                key: format!("QA-{}", short_id()),
                project: "QA".to_string(),
                fields,
            })
            .collect())
    }
}

fn short_id() -> String {
    Uuid::new_v4().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_issue_returns_a_synthetic_descriptor() {
        let port = LoggingIssueTrackerPort;
        let descriptor = port.create_issue(json!({"summary": "flaky test"})).await.unwrap();
        assert!(descriptor.key.starts_with("QA-"));
        assert_eq!(descriptor.project, "QA");
    }

    #[tokio::test]
    async fn bulk_create_returns_one_descriptor_per_item() {
        let port = LoggingIssueTrackerPort;
        let descriptors = port.bulk_create(vec![json!({}), json!({})]).await.unwrap();
        assert_eq!(descriptors.len(), 2);
    }
}
