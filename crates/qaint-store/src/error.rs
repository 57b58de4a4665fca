//! Durable store error type with UUID tracking.
//!
//! Mirrors the infrastructure error pattern used throughout this workspace:
//! every error carries a unique id (for log correlation) and a captured
//! backtrace, and wraps the underlying `sqlx::Error` rather than discarding
//! it.

use qaint_core::ErrorCode;
use std::backtrace::Backtrace;
use std::fmt;
use uuid::Uuid;

/// Error returned by the durable store (SQLite) layer.
#[derive(Debug)]
pub struct StoreError {
    id: Uuid,
    kind: StoreErrorKind,
    backtrace: Backtrace,
}

/// Specific store failure kinds.
#[derive(Debug)]
pub enum StoreErrorKind {
    /// Underlying sqlx/SQLite failure.
    Database(sqlx::Error),
    /// `insert` hit a primary-key or uniqueness collision.
    Conflict { table: String, detail: String },
    /// `get` found no row for the given id.
    NotFound { table: String, id: String },
}

impl StoreError {
    /// Create a new store error with automatic UUID and backtrace.
    #[must_use]
    pub fn new(kind: StoreErrorKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            backtrace: Backtrace::capture(),
        }
    }

    /// Unique error id for log correlation.
    #[must_use]
    pub fn error_id(&self) -> Uuid {
        self.id
    }

    /// The specific failure kind.
    #[must_use]
    pub fn kind(&self) -> &StoreErrorKind {
        &self.kind
    }

    /// Captured backtrace at construction time.
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    /// Map to an HTTP-compatible error code.
    #[must_use]
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            StoreErrorKind::Database(_) => ErrorCode::DatabaseError,
            StoreErrorKind::Conflict { .. } => ErrorCode::Conflict,
            StoreErrorKind::NotFound { .. } => ErrorCode::NotFound,
        }
    }

    /// Build a conflict error.
    #[must_use]
    pub fn conflict(table: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Conflict {
            table: table.into(),
            detail: detail.into(),
        })
    }

    /// Build a not-found error.
    #[must_use]
    pub fn not_found(table: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound {
            table: table.into(),
            id: id.into(),
        })
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StoreErrorKind::Database(e) => write!(f, "store error: {e}"),
            StoreErrorKind::Conflict { table, detail } => {
                write!(f, "conflict inserting into {table}: {detail}")
            }
            StoreErrorKind::NotFound { table, id } => write!(f, "{table} row {id} not found"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            StoreErrorKind::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return Self::conflict("unknown", db_err.message().to_string());
            }
        }
        Self::new(StoreErrorKind::Database(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_has_unique_id() {
        let e1 = StoreError::not_found("operations", "abc");
        let e2 = StoreError::not_found("operations", "abc");
        assert_ne!(e1.error_id(), e2.error_id());
    }

    #[test]
    fn error_code_mapping() {
        assert_eq!(
            StoreError::conflict("mappings", "dup").error_code(),
            ErrorCode::Conflict
        );
        assert_eq!(
            StoreError::not_found("operations", "1").error_code(),
            ErrorCode::NotFound
        );
    }
}
