//! What a run did.

use serde::{Deserialize, Serialize};
use streamfold::{Position, ProjectionId, ProjectionStatus, StreamId};

/// Summary of one [`Projection::run`](streamfold::Projection::run) against the
/// in-memory store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// The projection that ran
    pub projection_id: ProjectionId,
    /// Events folded during this run, summed over partitions
    pub applied: u64,
    /// Events skipped for lack of a handler, summed over partitions
    pub skipped: u64,
    /// Next global sequence the projection will read
    pub cursor: u64,
    /// Status after the run
    pub status: ProjectionStatus,
    /// Whether the run stopped early on a [`StopSignal`](crate::StopSignal)
    pub cancelled: bool,
    /// One entry per partition of a fan-out projection, by stream id
    pub partitions: Vec<PartitionReport>,
}

/// The part of a fan-out run that concerned one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionReport {
    /// The stream the partition folds
    pub stream_id: StreamId,
    /// The partition's own identity
    pub projection_id: ProjectionId,
    /// Events folded during this run
    pub applied: u64,
    /// Events skipped during this run
    pub skipped: u64,
    /// Partition position after the run
    pub position: Position,
    /// Partition status after the run
    pub status: ProjectionStatus,
}
