//! Mapping table: deterministic fingerprinting of test failures and the
//! durable association between a fingerprint and an external issue.

pub mod error;
pub mod fingerprint;
pub mod model;
pub mod store;

pub use error::MappingError;
pub use fingerprint::{fingerprint, normalize_error_message};
pub use model::{
    ExternalUpdate, Mapping, ResolutionStatus, SyncStatus, WorkerDescriptor,
    resolution_from_external_status,
};
pub use store::MappingRepository;
