//! Named, in-process sinks the coordinator publishes operation lifecycle
//! notifications to. Callers register sinks at construction rather than
//! the queue reaching for a global pub/sub, so tests can assert on a
//! deterministic in-memory sink instead of racing a broadcast channel.

use std::future::Future;
use std::pin::Pin;

use crate::model::Operation;

/// A subscriber to operation lifecycle transitions.
///
/// Boxed-future methods (rather than `impl Future`) because sinks are
/// stored as `Vec<Arc<dyn OperationSink>>` — the queue may have zero, one,
/// or several interested subscribers, which requires dynamic dispatch.
pub trait OperationSink: Send + Sync {
    /// An operation reached `completed`.
    fn operation_completed<'a>(&'a self, op: &'a Operation) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    /// An operation reached `failed`.
    fn operation_failed<'a>(&'a self, op: &'a Operation) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    /// An operation was rescheduled after a rate-limit response, without
    /// consuming an attempt.
    fn operation_rate_limited<'a>(&'a self, op: &'a Operation) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    /// A coordinator tick claimed `count` operations (zero included).
    fn operations_claimed<'a>(&'a self, count: usize) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}
