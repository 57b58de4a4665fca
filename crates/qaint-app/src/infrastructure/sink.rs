//! Metrics sink: records operation and event lifecycle transitions as
//! Prometheus counters via the named sink traits each domain crate exposes,
//! rather than a global pub/sub bus.

use std::future::Future;
use std::pin::Pin;

use metrics::{counter, histogram};
use qaint_events::{Event, EventSink};
use qaint_queue::{Operation, OperationSink, OperationStatus};

use super::metrics::{
    CLAIM_BATCH_SIZE, EVENTS_DUPLICATE_TOTAL, EVENTS_RECEIVED_TOTAL, OPERATIONS_COMPLETED_TOTAL,
    OPERATIONS_FAILED_TOTAL, OPERATIONS_RATE_LIMITED_TOTAL,
};

/// Records queue and event lifecycle transitions as counters. Holds no
/// state of its own; every method is a pure side effect against the
/// globally installed Prometheus recorder.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSink;

impl OperationSink for MetricsSink {
    fn operation_completed<'a>(&'a self, op: &'a Operation) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            debug_assert_eq!(op.status, OperationStatus::Completed);
            counter!(OPERATIONS_COMPLETED_TOTAL, "kind" => op.kind.as_str()).increment(1);
        })
    }

    fn operation_failed<'a>(&'a self, op: &'a Operation) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            debug_assert_eq!(op.status, OperationStatus::Failed);
            counter!(OPERATIONS_FAILED_TOTAL, "kind" => op.kind.as_str()).increment(1);
        })
    }

    fn operation_rate_limited<'a>(&'a self, op: &'a Operation) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            counter!(OPERATIONS_RATE_LIMITED_TOTAL, "kind" => op.kind.as_str()).increment(1);
        })
    }

    #[allow(clippy::as_conversions)]
    fn operations_claimed<'a>(&'a self, count: usize) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            histogram!(CLAIM_BATCH_SIZE).record(count as f64);
        })
    }
}

impl EventSink for MetricsSink {
    fn issue_created<'a>(&'a self, _event: &'a Event) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            counter!(EVENTS_RECEIVED_TOTAL, "transition" => "created").increment(1);
        })
    }

    fn issue_updated<'a>(&'a self, _event: &'a Event) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            counter!(EVENTS_RECEIVED_TOTAL, "transition" => "updated").increment(1);
        })
    }

    fn issue_deleted<'a>(&'a self, _event: &'a Event) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            counter!(EVENTS_RECEIVED_TOTAL, "transition" => "deleted").increment(1);
        })
    }
}

/// Record a duplicate delivery. Not a sink method because dedup is
/// short-circuited before a transition exists to notify about; called
/// directly from the webhook handler instead.
pub fn record_duplicate_event() {
    counter!(EVENTS_DUPLICATE_TOTAL).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use qaint_queue::{Operation, OperationKind};
    use serde_json::json;

    fn sample_operation(status: OperationStatus) -> Operation {
        Operation {
            id: "op-1".to_string(),
            kind: OperationKind::CreateIssue,
            payload: json!({}),
            affinity_key: None,
            mapping_ref: None,
            test_run_id: None,
            test_name: None,
            fingerprint: None,
            status,
            priority: 100,
            scheduled_at: Utc::now(),
            started_at: None,
            completed_at: None,
            attempt: 1,
            max_attempts: 3,
            last_error: None,
            error_detail: None,
            rate_limit_until: None,
            lease_owner: None,
            lease_expires_at: None,
            cancel_requested: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn sink_methods_do_not_panic_without_an_installed_recorder() {
        let sink = MetricsSink;
        sink.operation_completed(&sample_operation(OperationStatus::Completed)).await;
        sink.operation_failed(&sample_operation(OperationStatus::Failed)).await;
        sink.operation_rate_limited(&sample_operation(OperationStatus::Pending)).await;
        sink.operations_claimed(3).await;
        record_duplicate_event();
    }
}
