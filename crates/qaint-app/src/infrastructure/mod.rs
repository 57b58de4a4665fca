//! Infrastructure layer: adapters the presentation layer and the
//! coordinator depend on but never construct directly.
//!
//! # What belongs here
//!
//! - The placeholder [`LoggingIssueTrackerPort`] adapter standing in for
//!   the real outbound issue-tracker REST client, treated as an opaque
//!   effectful port this repo only consumes.
//! - The Prometheus recorder and the pipeline's own metric name constants.
//!
//! # What does NOT belong here
//!
//! - Route definitions and request/response shaping (`crate::presentation`).
//! - Repository SQL (`qaint_queue::store`, `qaint_events::store`,
//!   `qaint_mapping::store`) — those live in the domain crates, not here.

pub mod metrics;
pub mod port;
pub mod sink;

pub use port::LoggingIssueTrackerPort;
pub use sink::MetricsSink;
