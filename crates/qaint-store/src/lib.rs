//! Durable store: SQLite connection pooling, schema bootstrap, and the
//! shared [`StoreError`] type used by the operation, event, and mapping
//! repositories.
//!
//! This crate intentionally does not expose a generic row/predicate API.
//! Each repository (in `qaint-queue`, `qaint-events`, `qaint-mapping`) owns
//! typed SQL against one table, the way a concrete adapter would; this
//! crate only owns what all three share: the pool, the schema, and the
//! error type.

pub mod error;
pub mod pool;

pub use error::{StoreError, StoreErrorKind};
pub use pool::{connect, run_migrations};
pub use sqlx::sqlite::SqlitePool;
