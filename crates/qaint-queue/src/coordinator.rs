//! The coordinator: a periodic tick that claims eligible operations and
//! dispatches them to the external port, plus the outcome-interpretation
//! logic that turns a port result into a terminal or re-schedulable store
//! write.
//!
//! One [`Coordinator`] runs per process. Its `in_flight` counter is a
//! per-coordinator optimization for computing how many more operations it
//! may claim this tick. Correctness against a second coordinator sharing
//! the same store never depends on it, only on
//! [`crate::store::OperationRepository::claim`]'s conditional update.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use qaint_mapping::{MappingError, MappingRepository, WorkerDescriptor};
use serde_json::{Value, json};
use tokio::sync::{Notify, watch};
use tracing::{info, warn};

use crate::classify::{Classification, classify, retry_after_secs};
use crate::config::QueueConfig;
use crate::model::{Operation, OperationKind};
use crate::port::{ExternalPort, IssueDescriptor, PortError};
use crate::sink::OperationSink;
use crate::store::OperationRepository;

/// What a successful port invocation produced, before it is folded into a
/// Mapping write. `AlreadyMapped` never touched the port at all: it is the
/// dedupe short-circuit that keeps a race between two `create_issue`
/// operations for the same fingerprint from producing two external issues.
enum Outcome {
    AlreadyMapped(qaint_mapping::Mapping),
    Created(IssueDescriptor),
    Updated(IssueDescriptor),
    Linked,
    BulkCreated(Vec<IssueDescriptor>),
}

/// Ticks a claim query against the store and dispatches claimed operations
/// to the external port.
pub struct Coordinator<P> {
    repo: OperationRepository,
    mapping_repo: MappingRepository,
    port: Arc<P>,
    config: QueueConfig,
    worker_id: String,
    sinks: Vec<Arc<dyn OperationSink>>,
    in_flight: AtomicUsize,
    wake: Notify,
}

impl<P> Coordinator<P>
where
    P: ExternalPort + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(
        repo: OperationRepository,
        mapping_repo: MappingRepository,
        port: Arc<P>,
        config: QueueConfig,
    ) -> Self {
        Self {
            repo,
            mapping_repo,
            port,
            config,
            worker_id: format!("coordinator-{}", uuid::Uuid::new_v4()),
            sinks: Vec::new(),
            in_flight: AtomicUsize::new(0),
            wake: Notify::new(),
        }
    }

    /// Register a sink to be notified of operation completions/failures.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn OperationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Signal the coordinator to run a tick immediately instead of waiting
    /// out the rest of `tick_interval`. Producers call this after `enqueue`.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Run the tick loop until `shutdown` is set to `true`.
    ///
    /// Honors a shared cancellation signal: when it fires, the loop stops
    /// issuing new claims, but any operations already dispatched this tick
    /// run to a terminal store state before their spawned tasks exit. See
    /// [`Self::dispatch`].
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let tick_interval = self
                .config
                .tick_interval
                .to_std()
                .unwrap_or(std::time::Duration::from_secs(2));

            tokio::select! {
                () = tokio::time::sleep(tick_interval) => {}
                () = self.wake.notified() => {}
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }

            if *shutdown.borrow() {
                break;
            }

            self.tick().await;
        }
    }

    /// One coordinator cycle: reclaim expired leases, compute how many more
    /// operations this coordinator may run concurrently, claim up to that
    /// many, and spawn a dispatch task per claimed operation.
    pub async fn tick(self: &Arc<Self>) {
        match self.repo.reclaim_expired_leases().await {
            Ok(n) if n > 0 => info!(reclaimed = n, "reclaimed expired leases"),
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "lease reclaim sweep failed");
                return;
            }
        }

        let in_flight = self.in_flight.load(Ordering::SeqCst);
        let max_concurrent = usize::try_from(self.config.max_concurrent).unwrap_or(usize::MAX);
        let available = max_concurrent.saturating_sub(in_flight);
        if available == 0 {
            return;
        }

        let claimed = match self
            .repo
            .claim(
                &self.worker_id,
                u32::try_from(available).unwrap_or(u32::MAX),
                self.config.lease_duration,
            )
            .await
        {
            Ok(ops) => ops,
            Err(e) => {
                warn!(error = %e, "claim failed");
                return;
            }
        };

        for sink in &self.sinks {
            sink.operations_claimed(claimed.len()).await;
        }

        for op in claimed {
            self.in_flight.fetch_add(1, Ordering::SeqCst);
            let this = Arc::clone(self);
            tokio::spawn(async move {
                this.dispatch(op).await;
                this.in_flight.fetch_sub(1, Ordering::SeqCst);
            });
        }
    }

    /// Run one claimed operation to completion: invoke the port under a
    /// deadline, interpret the result, and write back a terminal or
    /// re-schedulable outcome. Every path through this function reaches a
    /// store write before returning.
    async fn dispatch(&self, op: Operation) {
        let timeout = self
            .config
            .op_timeout
            .to_std()
            .unwrap_or(std::time::Duration::from_secs(30));

        let result = match tokio::time::timeout(timeout, self.invoke(&op)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(PortError::new("operation timed out").with_code("NETWORK_ERROR")),
        };

        match self.repo.is_cancel_requested(&op.id).await {
            Ok(true) => {
                if let Err(e) = self.repo.mark_cancelled(&op.id, &self.worker_id).await {
                    warn!(operation_id = %op.id, error = %e, "failed to record cooperative cancellation");
                }
                return;
            }
            Ok(false) => {}
            Err(e) => warn!(operation_id = %op.id, error = %e, "cancellation check failed, proceeding"),
        }

        match result {
            Ok(outcome) => self.handle_success(&op, outcome).await,
            Err(port_error) => self.handle_error(&op, port_error).await,
        }
    }

    async fn invoke(&self, op: &Operation) -> Result<Outcome, PortError> {
        match op.kind {
            OperationKind::CreateIssue => {
                if let (Some(run_id), Some(name), Some(fp)) =
                    (&op.test_run_id, &op.test_name, &op.fingerprint)
                {
                    match self.mapping_repo.find(run_id, name, fp).await {
                        Ok(Some(existing)) => return Ok(Outcome::AlreadyMapped(existing)),
                        Ok(None) => {}
                        Err(e) => return Err(PortError::new(format!("mapping lookup failed: {e}"))),
                    }
                }
                self.port.create_issue(op.payload.clone()).await.map(Outcome::Created)
            }
            OperationKind::UpdateIssue => {
                let key = issue_key_from_payload(&op.payload)?;
                let updates = op
                    .payload
                    .get("updates")
                    .cloned()
                    .unwrap_or(Value::Null);
                self.port.update_issue(&key, updates).await.map(Outcome::Updated)
            }
            OperationKind::AddComment => {
                let key = issue_key_from_payload(&op.payload)?;
                let comment = op
                    .payload
                    .get("comment")
                    .cloned()
                    .unwrap_or(Value::Null);
                self.port.add_comment(&key, comment).await.map(Outcome::Updated)
            }
            OperationKind::Link => {
                let inward = op
                    .payload
                    .get("inward")
                    .and_then(Value::as_str)
                    .ok_or_else(|| PortError::new("payload missing 'inward'"))?;
                let outward = op
                    .payload
                    .get("outward")
                    .and_then(Value::as_str)
                    .ok_or_else(|| PortError::new("payload missing 'outward'"))?;
                let link_type = op
                    .payload
                    .get("link_type")
                    .and_then(Value::as_str)
                    .unwrap_or("relates to");
                self.port.link(inward, outward, link_type).await.map(|()| Outcome::Linked)
            }
            OperationKind::BulkCreate => {
                let items = op
                    .payload
                    .get("items")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                self.port.bulk_create(items).await.map(Outcome::BulkCreated)
            }
        }
    }

    async fn handle_success(&self, op: &Operation, outcome: Outcome) {
        let mapping_ref = match outcome {
            Outcome::AlreadyMapped(mapping) => Some(mapping.id),
            Outcome::Created(descriptor) => match self.link_created_mapping(op, &descriptor).await {
                Ok(id) => id,
                Err(()) => return self.fail_mapping_write(op).await,
            },
            Outcome::Updated(descriptor) => {
                if self.apply_worker_update(op, &descriptor).await.is_err() {
                    return self.fail_mapping_write(op).await;
                }
                None
            }
            Outcome::Linked | Outcome::BulkCreated(_) => None,
        };

        match self.repo.complete(&op.id, &self.worker_id, mapping_ref.as_deref()).await {
            Ok(0) => info!(operation_id = %op.id, "completion dropped, lease was reclaimed"),
            Ok(_) => {
                if let Ok(Some(completed)) = self.repo.get(&op.id).await {
                    for sink in &self.sinks {
                        sink.operation_completed(&completed).await;
                    }
                }
            }
            Err(e) => warn!(operation_id = %op.id, error = %e, "failed to record completion"),
        }
    }

    /// Find-or-create the Mapping row for a `create_issue` result. Returns
    /// `Err(())` (infra failure, short-circuited to the fatal path per the
    /// propagation policy) or `Ok(mapping_id)`.
    async fn link_created_mapping(&self, op: &Operation, descriptor: &IssueDescriptor) -> Result<Option<String>, ()> {
        let (Some(run_id), Some(name), Some(fp)) = (&op.test_run_id, &op.test_name, &op.fingerprint) else {
            // No correlation triple supplied: the mapping is the producer's
            // concern for this operation, nothing to link.
            return Ok(None);
        };

        match self
            .mapping_repo
            .create_from_worker(run_id, name, fp, worker_descriptor(descriptor))
            .await
        {
            Ok(mapping) => Ok(Some(mapping.id)),
            Err(MappingError::AlreadyExists) => match self.mapping_repo.find(run_id, name, fp).await {
                Ok(Some(existing)) => Ok(Some(existing.id)),
                Ok(None) => {
                    warn!(operation_id = %op.id, "lost create_issue race but winner's row vanished");
                    Ok(None)
                }
                Err(e) => {
                    warn!(operation_id = %op.id, error = %e, "failed to look up winning mapping");
                    Err(())
                }
            },
            Err(e) => {
                warn!(operation_id = %op.id, error = %e, "mapping creation failed");
                Err(())
            }
        }
    }

    async fn apply_worker_update(&self, op: &Operation, descriptor: &IssueDescriptor) -> Result<(), ()> {
        let Some(mapping_ref) = &op.mapping_ref else {
            warn!(operation_id = %op.id, "mutating operation has no mapping_ref, skipping mapping update");
            return Ok(());
        };
        self.mapping_repo
            .update_from_worker(mapping_ref, worker_descriptor(descriptor))
            .await
            .map(|_rows| ())
            .map_err(|e| warn!(operation_id = %op.id, error = %e, "mapping update failed"))
    }

    async fn fail_mapping_write(&self, op: &Operation) {
        let detail = json!({"message": "mapping write failed", "attempt": op.attempt});
        if let Err(e) = self
            .repo
            .fail(&op.id, &self.worker_id, "mapping write failed", &detail)
            .await
        {
            warn!(operation_id = %op.id, error = %e, "failed to record mapping-write failure");
        }
    }

    async fn handle_error(&self, op: &Operation, port_error: PortError) {
        match classify(&port_error) {
            Classification::RateLimited => {
                let default_secs = u64::try_from(self.config.rate_limit_buffer.num_seconds()).unwrap_or(60);
                let retry_after = retry_after_secs(&port_error, default_secs);
                let rate_limit_until =
                    Utc::now() + chrono::Duration::seconds(i64::try_from(retry_after).unwrap_or(i64::MAX));
                match self
                    .repo
                    .reschedule_rate_limited(&op.id, &self.worker_id, rate_limit_until)
                    .await
                {
                    Ok(_) => {
                        if let Ok(Some(rescheduled)) = self.repo.get(&op.id).await {
                            for sink in &self.sinks {
                                sink.operation_rate_limited(&rescheduled).await;
                            }
                        }
                    }
                    Err(e) => warn!(operation_id = %op.id, error = %e, "failed to record rate-limit reschedule"),
                }
            }
            Classification::Retryable if op.attempt < op.max_attempts => {
                let multiplier = i32::try_from(op.attempt).unwrap_or(1).max(1);
                let scheduled_at = Utc::now() + self.config.retry_backoff * multiplier;
                if let Err(e) = self
                    .repo
                    .reschedule_retryable(&op.id, &self.worker_id, scheduled_at, &port_error.message)
                    .await
                {
                    warn!(operation_id = %op.id, error = %e, "failed to record retry reschedule");
                }
            }
            Classification::Retryable | Classification::Fatal => {
                let detail = json!({"message": port_error.message, "attempt": op.attempt});
                match self
                    .repo
                    .fail(&op.id, &self.worker_id, &port_error.message, &detail)
                    .await
                {
                    Ok(0) => {}
                    Ok(_) => {
                        if let Ok(Some(failed)) = self.repo.get(&op.id).await {
                            for sink in &self.sinks {
                                sink.operation_failed(&failed).await;
                            }
                        }
                    }
                    Err(e) => warn!(operation_id = %op.id, error = %e, "failed to record fatal outcome"),
                }
            }
        }
    }
}

fn worker_descriptor(descriptor: &IssueDescriptor) -> WorkerDescriptor {
    let field = |name: &str| descriptor.fields.get(name).and_then(Value::as_str).map(String::from);
    WorkerDescriptor {
        external_issue_id: Some(descriptor.id.clone()),
        external_issue_key: Some(descriptor.key.clone()),
        external_project_key: Some(descriptor.project.clone()),
        summary: field("summary"),
        status: field("status"),
        priority: field("priority"),
        issue_type: field("type"),
        assignee: field("assignee"),
    }
}

fn issue_key_from_payload(payload: &Value) -> Result<String, PortError> {
    payload
        .get("key")
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| PortError::new("payload missing 'key'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EnqueueRequest;
    use qaint_store::{connect, run_migrations};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakePort {
        create_calls: StdMutex<u32>,
        create_result: StdMutex<Option<Result<IssueDescriptor, PortError>>>,
    }

    impl ExternalPort for FakePort {
        async fn create_issue(&self, _payload: Value) -> Result<IssueDescriptor, PortError> {
            *self.create_calls.lock().unwrap_or_else(|e| e.into_inner()) += 1;
            self.create_result
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take()
                .unwrap_or_else(|| {
                    Ok(IssueDescriptor {
                        id: "1".into(),
                        key: "QA-1".into(),
                        project: "QA".into(),
                        fields: json!({}),
                    })
                })
        }

        async fn update_issue(&self, _key: &str, _updates: Value) -> Result<IssueDescriptor, PortError> {
            Ok(IssueDescriptor::default())
        }

        async fn add_comment(&self, _key: &str, _comment: Value) -> Result<IssueDescriptor, PortError> {
            Ok(IssueDescriptor::default())
        }

        async fn link(&self, _inward: &str, _outward: &str, _link_type: &str) -> Result<(), PortError> {
            Ok(())
        }

        async fn bulk_create(&self, _items: Vec<Value>) -> Result<Vec<IssueDescriptor>, PortError> {
            Ok(Vec::new())
        }
    }

    async fn harness() -> (OperationRepository, MappingRepository) {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        (OperationRepository::new(pool.clone()), MappingRepository::new(pool))
    }

    #[tokio::test]
    async fn create_issue_dedupes_against_existing_mapping_without_calling_port() {
        let (ops, mappings) = harness().await;
        mappings
            .create_from_worker(
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

        let port = Arc::new(FakePort::default());
        let coordinator = Arc::new(Coordinator::new(ops.clone(), mappings.clone(), Arc::clone(&port), QueueConfig::default()));

        let id = ops
            .enqueue(EnqueueRequest {
                kind: OperationKind::CreateIssue,
                payload: json!({}),
                test_run_id: Some("run-1".into()),
                test_name: Some("login".into()),
                fingerprint: Some("fp-1".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        coordinator.tick().await;
        // Give the spawned dispatch task a chance to run.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(*port.create_calls.lock().unwrap(), 0, "dedup must short-circuit the port call");
        let op = ops.get(&id).await.unwrap().unwrap();
        assert_eq!(op.status, crate::model::OperationStatus::Completed);
        assert!(op.mapping_ref.is_some());
    }

    #[tokio::test]
    async fn successful_create_issue_writes_mapping_row() {
        let (ops, mappings) = harness().await;
        let port = Arc::new(FakePort::default());
        let coordinator = Arc::new(Coordinator::new(ops.clone(), mappings.clone(), Arc::clone(&port), QueueConfig::default()));

        let id = ops
            .enqueue(EnqueueRequest {
                kind: OperationKind::CreateIssue,
                payload: json!({}),
                test_run_id: Some("run-1".into()),
                test_name: Some("login".into()),
                fingerprint: Some("fp-1".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        coordinator.tick().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(*port.create_calls.lock().unwrap(), 1);
        let op = ops.get(&id).await.unwrap().unwrap();
        assert_eq!(op.status, crate::model::OperationStatus::Completed);
        let mapping = mappings.find("run-1", "login", "fp-1").await.unwrap().unwrap();
        assert_eq!(mapping.external_issue_key.as_deref(), Some("QA-1"));
    }

    #[tokio::test]
    async fn rate_limited_error_reschedules_without_consuming_attempt() {
        let (ops, mappings) = harness().await;
        let port = Arc::new(FakePort::default());
        *port.create_result.lock().unwrap() = Some(Err(PortError::new("boom")
            .with_status(429)
            .with_header("Retry-After", "30")));
        let coordinator = Arc::new(Coordinator::new(ops.clone(), mappings, Arc::clone(&port), QueueConfig::default()));

        let id = ops
            .enqueue(EnqueueRequest {
                kind: OperationKind::CreateIssue,
                payload: json!({}),
                ..Default::default()
            })
            .await
            .unwrap();

        coordinator.tick().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let op = ops.get(&id).await.unwrap().unwrap();
        assert_eq!(op.status, crate::model::OperationStatus::Pending);
        assert_eq!(op.attempt, 0);
        assert!(op.rate_limit_until.is_some());
    }

    #[derive(Default)]
    struct RecordingSink {
        completed: StdMutex<u32>,
        failed: StdMutex<u32>,
        rate_limited: StdMutex<u32>,
        claimed: StdMutex<Vec<usize>>,
    }

    impl OperationSink for RecordingSink {
        fn operation_completed<'a>(&'a self, _op: &'a Operation) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
            Box::pin(async move {
                *self.completed.lock().unwrap_or_else(|e| e.into_inner()) += 1;
            })
        }

        fn operation_failed<'a>(&'a self, _op: &'a Operation) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
            Box::pin(async move {
                *self.failed.lock().unwrap_or_else(|e| e.into_inner()) += 1;
            })
        }

        fn operation_rate_limited<'a>(&'a self, _op: &'a Operation) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
            Box::pin(async move {
                *self.rate_limited.lock().unwrap_or_else(|e| e.into_inner()) += 1;
            })
        }

        fn operations_claimed<'a>(&'a self, count: usize) -> std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send + 'a>> {
            Box::pin(async move {
                self.claimed.lock().unwrap_or_else(|e| e.into_inner()).push(count);
            })
        }
    }

    #[tokio::test]
    async fn rate_limited_error_notifies_sink() {
        let (ops, mappings) = harness().await;
        let port = Arc::new(FakePort::default());
        *port.create_result.lock().unwrap() = Some(Err(PortError::new("boom")
            .with_status(429)
            .with_header("Retry-After", "30")));
        let sink = Arc::new(RecordingSink::default());
        let coordinator = Arc::new(
            Coordinator::new(ops.clone(), mappings, Arc::clone(&port), QueueConfig::default())
                .with_sink(sink.clone()),
        );

        ops.enqueue(EnqueueRequest {
            kind: OperationKind::CreateIssue,
            payload: json!({}),
            ..Default::default()
        })
        .await
        .unwrap();

        coordinator.tick().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        assert_eq!(*sink.rate_limited.lock().unwrap(), 1);
        assert_eq!(*sink.claimed.lock().unwrap(), vec![1]);
    }
}
