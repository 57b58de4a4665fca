//! Mapping-table error type.

use qaint_core::ErrorCode;
use qaint_store::StoreError;
use std::fmt;

/// Error surfaced by mapping lookups and writes.
#[derive(Debug)]
pub enum MappingError {
    /// Underlying durable store failure.
    Store(StoreError),
    /// A worker tried to create a mapping for a `(test_run_id, test_name,
    /// fingerprint)` triple that another worker just won the race on.
    AlreadyExists,
}

impl MappingError {
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Store(e) => e.error_code(),
            Self::AlreadyExists => ErrorCode::Conflict,
        }
    }
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "{e}"),
            Self::AlreadyExists => write!(f, "mapping already exists for this fingerprint"),
        }
    }
}

impl std::error::Error for MappingError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::AlreadyExists => None,
        }
    }
}

impl From<StoreError> for MappingError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
