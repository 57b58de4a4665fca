//! Event processor error type.

use qaint_core::ErrorCode;
use qaint_mapping::MappingError;
use qaint_store::StoreError;
use std::fmt;

/// Error surfaced by the event processor's store-facing operations.
///
/// Only infrastructure failures reach this type. Every producer-visible
/// outcome the pipeline itself classifies (bad signature, unknown kind,
/// malformed payload, duplicate) is a [`crate::model::ProcessResult`], not
/// an error.
#[derive(Debug)]
pub enum EventError {
    Store(StoreError),
    Mapping(MappingError),
}

impl EventError {
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Store(e) => e.error_code(),
            Self::Mapping(e) => e.error_code(),
        }
    }
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "{e}"),
            Self::Mapping(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for EventError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Mapping(e) => Some(e),
        }
    }
}

impl From<StoreError> for EventError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<MappingError> for EventError {
    fn from(e: MappingError) -> Self {
        Self::Mapping(e)
    }
}
