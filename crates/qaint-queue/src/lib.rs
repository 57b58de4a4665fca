//! Durable, idempotent, retry-aware operation queue and worker coordinator.
//!
//! This crate is the heart of the external-system integration pipeline: it
//! accepts deferred units of work (`create_issue`, `update_issue`,
//! `add_comment`, `link`, `bulk_create`), leases them out to a bounded pool
//! of workers under a periodic tick, and interprets the outcome of each
//! external call into one of four terminal or re-schedulable states.
//!
//! The queue never parses `payload`; it only dispatches on `kind` to pick
//! which [`port::ExternalPort`] method to call. Correctness under
//! concurrent coordinators does not depend on any in-process lock — it
//! derives entirely from the single-row conditional `UPDATE ... WHERE
//! status = 'pending'` that [`store::OperationRepository::claim`] issues per
//! candidate.

pub mod classify;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod model;
pub mod port;
pub mod sink;
pub mod store;

pub use classify::{Classification, classify, retry_after_secs};
pub use config::QueueConfig;
pub use coordinator::Coordinator;
pub use error::QueueError;
pub use model::{EnqueueRequest, Operation, OperationKind, OperationStatus, QueueStats};
pub use port::{ExternalPort, IssueDescriptor, PortError};
pub use sink::OperationSink;
pub use store::OperationRepository;
