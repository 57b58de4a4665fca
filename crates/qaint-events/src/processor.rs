//! The inbound event pipeline: authenticate, filter, deduplicate, dispatch,
//! mark processed. Never fails the producer for an internal error; a
//! dispatch failure is recorded on the row and picked up by the retry sweep.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use qaint_mapping::MappingRepository;
use tracing::warn;

use crate::error::EventError;
use crate::model::{
    Event, InboundPayload, NewEvent, ProcessResult, Reason, Transition, external_update_from_changelog,
    transition_for_kind,
};
use crate::signature;
use crate::sink::EventSink;
use crate::store::{EventRepository, event_id};

/// Processes inbound webhook callbacks against the event log and Mapping
/// table.
pub struct EventProcessor {
    repo: EventRepository,
    mapping_repo: MappingRepository,
    secret: Option<Vec<u8>>,
    signature_required: bool,
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventProcessor {
    #[must_use]
    pub fn new(
        repo: EventRepository,
        mapping_repo: MappingRepository,
        secret: Option<Vec<u8>>,
        signature_required: bool,
    ) -> Self {
        Self {
            repo,
            mapping_repo,
            secret,
            signature_required,
            sinks: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Run one inbound callback through the pipeline. `headers` must use
    /// lowercased keys.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] only for an infrastructure failure during
    /// deduplication, i.e. before the event is durably stored. Everything
    /// the pipeline itself classifies (bad signature, unknown kind,
    /// malformed payload, duplicate, or a post-persistence dispatch
    /// failure) is folded into the returned [`ProcessResult`].
    pub async fn process(&self, raw_body: &[u8], headers: &HashMap<String, String>) -> Result<ProcessResult, EventError> {
        if let Some(rejection) = self.authenticate(raw_body, headers) {
            return Ok(rejection);
        }

        let Ok(payload) = serde_json::from_slice::<InboundPayload>(raw_body) else {
            return Ok(ProcessResult::rejected(Reason::BadPayload));
        };

        let Some(transition) = transition_for_kind(&payload.event_kind) else {
            return Ok(ProcessResult::accepted(Reason::Ignored));
        };

        let id = event_id(&payload.event_kind, &payload.subject_key, payload.timestamp);
        let new_event = NewEvent {
            id: id.clone(),
            event_kind: payload.event_kind.clone(),
            subject_id: payload.subject_id.clone(),
            subject_key: payload.subject_key.clone(),
            source_timestamp: payload.timestamp,
            actor_id: payload.actor_id.clone(),
            raw_payload: raw_body.to_vec(),
            changelog: payload.changelog.clone(),
        };

        if !self.repo.insert_or_ignore(&new_event).await? {
            return Ok(ProcessResult::accepted(Reason::Duplicate));
        }

        self.dispatch(&id, &payload.subject_key, payload.changelog.as_ref(), transition)
            .await;

        Ok(ProcessResult::accepted(Reason::Ok))
    }

    fn authenticate(&self, raw_body: &[u8], headers: &HashMap<String, String>) -> Option<ProcessResult> {
        let secret = self.secret.as_ref()?;
        match signature::find_header(headers) {
            Some(header_value) => {
                if signature::verify(secret, raw_body, header_value) {
                    None
                } else {
                    Some(ProcessResult::rejected(Reason::InvalidSignature))
                }
            }
            None if self.signature_required => Some(ProcessResult::rejected(Reason::MissingSignature)),
            None => None,
        }
    }

    /// Apply a dispatched transition's side effect, then mark the row
    /// processed or errored. Sinks are notified only after the Mapping
    /// write (if any) commits.
    async fn dispatch(&self, id: &str, subject_key: &str, changelog: Option<&serde_json::Value>, transition: Transition) {
        let outcome: Result<(), EventError> = match transition {
            Transition::Created | Transition::Deleted => Ok(()),
            Transition::Updated => {
                let update = changelog.map(external_update_from_changelog).unwrap_or_default();
                self.mapping_repo
                    .update_from_event(subject_key, update)
                    .await
                    .map(|_changed| ())
                    .map_err(EventError::from)
            }
        };

        match outcome {
            Ok(()) => {
                if let Err(e) = self.repo.mark_processed(id).await {
                    warn!(event_id = %id, error = %e, "failed to mark event processed");
                }
                if let Ok(Some(event)) = self.repo.get(id).await {
                    self.notify(&event, transition).await;
                }
            }
            Err(e) => {
                if let Err(e2) = self.repo.mark_error(id, &e.to_string()).await {
                    warn!(event_id = %id, error = %e2, "failed to record dispatch error");
                }
            }
        }
    }

    async fn notify(&self, event: &Event, transition: Transition) {
        for sink in &self.sinks {
            match transition {
                Transition::Created => sink.issue_created(event).await,
                Transition::Updated => sink.issue_updated(event).await,
                Transition::Deleted => sink.issue_deleted(event).await,
            }
        }
    }

    /// Re-dispatch unprocessed rows older than `threshold`. Run periodically
    /// alongside the queue's tick to recover from post-persistence dispatch
    /// failures without ever retrying authentication or dedup.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] if the sweep query itself fails.
    pub async fn resweep(&self, threshold: DateTime<Utc>) -> Result<usize, EventError> {
        let rows = self.repo.find_unprocessed_older_than(threshold).await?;
        let mut redispatched = 0;
        for event in rows {
            let Some(transition) = transition_for_kind(&event.event_kind) else {
                continue;
            };
            self.dispatch(&event.id, &event.subject_key, event.changelog.as_ref(), transition)
                .await;
            redispatched += 1;
        }
        Ok(redispatched)
    }

    /// Prune processed rows older than `retention`, enforcing the
    /// configured retention horizon.
    ///
    /// # Errors
    ///
    /// Returns an [`EventError`] if the delete fails.
    pub async fn prune(&self, retention: chrono::Duration) -> Result<u64, EventError> {
        let cutoff = Utc::now() - retention;
        self.repo.prune_processed_older_than(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hmac::Mac;
    use qaint_store::{connect, run_migrations};
    use serde_json::json;
    use sha2::Sha256;

    type HmacSha256 = hmac::Hmac<Sha256>;

    async fn harness() -> (EventRepository, MappingRepository) {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        (EventRepository::new(pool.clone()), MappingRepository::new(pool))
    }

    fn sign(secret: &[u8], body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    #[tokio::test]
    async fn missing_signature_is_rejected_when_required() {
        let (events, mappings) = harness().await;
        let processor = EventProcessor::new(events, mappings, Some(b"secret".to_vec()), true);
        let body = json!({"event_kind": "issue_updated", "subject_id": "1", "subject_key": "QA-1", "timestamp": 1}).to_string();

        let result = processor.process(body.as_bytes(), &HashMap::new()).await.unwrap();
        assert_eq!(result, ProcessResult::rejected(Reason::MissingSignature));
    }

    #[tokio::test]
    async fn invalid_signature_is_rejected() {
        let (events, mappings) = harness().await;
        let processor = EventProcessor::new(events, mappings, Some(b"secret".to_vec()), true);
        let body = json!({"event_kind": "issue_updated", "subject_id": "1", "subject_key": "QA-1", "timestamp": 1}).to_string();

        let mut headers = HashMap::new();
        headers.insert("x-hub-signature".to_string(), "sha256=deadbeef".to_string());
        let result = processor.process(body.as_bytes(), &headers).await.unwrap();
        assert_eq!(result, ProcessResult::rejected(Reason::InvalidSignature));
    }

    #[tokio::test]
    async fn unknown_event_kind_is_ignored_without_persisting() {
        let (events, mappings) = harness().await;
        let repo_for_check = events.clone();
        let processor = EventProcessor::new(events, mappings, None, false);
        let body = json!({"event_kind": "comment_added", "subject_id": "1", "subject_key": "QA-1", "timestamp": 1}).to_string();

        let result = processor.process(body.as_bytes(), &HashMap::new()).await.unwrap();
        assert_eq!(result, ProcessResult::accepted(Reason::Ignored));

        let id = event_id("comment_added", "QA-1", 1);
        assert!(repo_for_check.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let (events, mappings) = harness().await;
        let processor = EventProcessor::new(events, mappings, None, false);
        let result = processor.process(b"not json", &HashMap::new()).await.unwrap();
        assert_eq!(result, ProcessResult::rejected(Reason::BadPayload));
    }

    #[tokio::test]
    async fn duplicate_delivery_is_idempotent() {
        let (events, mappings) = harness().await;
        mappings
            .create_from_worker(
                "run-1",
                "login",
                "fp-1",
                qaint_mapping::WorkerDescriptor {
                    external_issue_key: Some("QA-1".into()),
                    status: Some("Open".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let processor = EventProcessor::new(events, mappings.clone(), None, false);
        let body = json!({
            "event_kind": "issue_updated",
            "subject_id": "10001",
            "subject_key": "QA-1",
            "timestamp": 500,
            "changelog": {"status": {"from": "Open", "to": "Resolved"}}
        })
        .to_string();

        let first = processor.process(body.as_bytes(), &HashMap::new()).await.unwrap();
        assert_eq!(first, ProcessResult::accepted(Reason::Ok));
        let second = processor.process(body.as_bytes(), &HashMap::new()).await.unwrap();
        assert_eq!(second, ProcessResult::accepted(Reason::Duplicate));

        let mapping = mappings.find("run-1", "login", "fp-1").await.unwrap().unwrap();
        assert_eq!(mapping.resolution_status, qaint_mapping::ResolutionStatus::Resolved);
    }

    #[tokio::test]
    async fn valid_signature_with_correct_secret_is_accepted() {
        let (events, mappings) = harness().await;
        let secret = b"webhook-secret".to_vec();
        let processor = EventProcessor::new(events, mappings, Some(secret.clone()), true);
        let body = json!({"event_kind": "issue_created", "subject_id": "1", "subject_key": "QA-9", "timestamp": 1}).to_string();

        let mut headers = HashMap::new();
        headers.insert("x-hub-signature".to_string(), sign(&secret, body.as_bytes()));
        let result = processor.process(body.as_bytes(), &headers).await.unwrap();
        assert_eq!(result, ProcessResult::accepted(Reason::Ok));
    }
}
