//! `streamfold` - replayable event-stream projections
//!
//! A projection is a named fold over a stream of domain events. It carries a
//! table of typed handlers, one per event type, applies events one at a time
//! and counts how many it applied so a driver can resume it later. Reading
//! events, checkpointing and status transitions belong to the driver, an
//! implementation of [`EventStore`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod errors;
pub mod event;
pub mod handler;
pub mod identity;
pub mod options;
pub mod projection;
pub mod status;
pub mod store;
pub mod types;

pub use errors::{ProjectionError, ProjectionResult};
pub use event::{Event, JsonEvent};
pub use handler::{Handler, HandlerError, Handlers};
pub use identity::{IdGenerator, RandomIds, SequentialIds};
pub use options::{ProjectionOptions, UnhandledPolicy};
pub use projection::{ApplyOutcome, Projection, ProjectionConfig, StreamTarget};
pub use status::ProjectionStatus;
pub use store::EventStore;
pub use types::{EventStreamHandle, EventType, Position, ProjectionId, StreamId, StreamType};

/// Re-exported so drivers can implement [`EventStore`] without naming the crate.
pub use async_trait::async_trait;
