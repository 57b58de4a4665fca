//! Inbound webhook event processor.
//!
//! Verifies signatures, deduplicates deliveries, classifies the callback
//! into a domain transition, and folds the effect into the Mapping table
//! before acknowledging the producer.

pub mod error;
pub mod model;
pub mod processor;
pub mod signature;
pub mod sink;
pub mod store;

pub use error::EventError;
pub use model::{
    DEFAULT_EVENT_KINDS, Event, InboundPayload, NewEvent, ProcessResult, Reason, Transition,
    transition_for_kind,
};
pub use processor::EventProcessor;
pub use sink::EventSink;
pub use store::{EventRepository, event_id};
