//! In-memory driver for `streamfold` projections
//!
//! This crate provides [`InMemoryEventStore`], an append-only event log that
//! implements [`streamfold::EventStore`]. It reads events after a saved
//! cursor, offers them to a projection in order, keeps checkpoints, creates
//! fan-out partitions and moves projections between statuses. Nothing is
//! persisted, which makes it suited to tests, examples and development.
//!
//! # Example
//!
//! ```rust,ignore
//! let store = InMemoryEventStore::new();
//! store.append(account.clone(), stream_id, deposited);
//!
//! let mut balance = Projection::from_stream_type(account)
//!     .on(EventType::try_new("Deposited")?, |total: &i64, event: &RecordedEvent<JsonEvent>| {
//!         Ok(total + event.payload.payload["amount"].as_i64().unwrap_or(0))
//!     });
//!
//! let report = balance.run(&store).await?;
//! assert_eq!(report.applied, 1);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod checkpoint;
mod config;
mod recorded;
mod report;
mod store;

pub use checkpoint::{Checkpoint, InMemoryCheckpointStore};
pub use config::{MemoryStoreConfig, StopSignal};
pub use recorded::{RecordedEvent, Timestamp};
pub use report::{PartitionReport, RunReport};
pub use store::InMemoryEventStore;
