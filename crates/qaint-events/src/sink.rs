//! Named, in-process sinks the processor publishes domain transitions to.
//! Mirrors [`qaint_queue::OperationSink`]: callers register sinks at
//! construction instead of the processor reaching for a global pub/sub.

use std::future::Future;
use std::pin::Pin;

use crate::model::Event;

/// A subscriber to event-derived domain transitions.
pub trait EventSink: Send + Sync {
    /// An external issue was created. Emitted after dedup, with no Mapping
    /// write of its own.
    fn issue_created<'a>(&'a self, event: &'a Event) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    /// An external issue changed. Emitted after the Mapping update (if any)
    /// commits, per the ordering the design requires.
    fn issue_updated<'a>(&'a self, event: &'a Event) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

    /// An external issue was deleted.
    fn issue_deleted<'a>(&'a self, event: &'a Event) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>>;
}
