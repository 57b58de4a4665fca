//! Operation queue error type.

use qaint_core::ErrorCode;
use qaint_store::StoreError;
use std::fmt;

/// Error surfaced by the queue's producer- and worker-facing APIs.
#[derive(Debug)]
pub enum QueueError {
    /// Underlying durable store failure.
    Store(StoreError),
    /// `get`/`cancel` addressed an operation id that doesn't exist.
    NotFound(String),
}

impl QueueError {
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Store(e) => e.error_code(),
            Self::NotFound(_) => ErrorCode::NotFound,
        }
    }
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "{e}"),
            Self::NotFound(id) => write!(f, "operation {id} not found"),
        }
    }
}

impl std::error::Error for QueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::NotFound(_) => None,
        }
    }
}

impl From<StoreError> for QueueError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
