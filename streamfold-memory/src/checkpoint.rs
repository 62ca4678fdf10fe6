//! In-memory checkpoints for resumable runs.

use crate::recorded::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use streamfold::{Position, ProjectionId};

/// Where a projection stopped reading, and how it was doing at the time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Resume token: the next global sequence to read.
    ///
    /// After reading the event at sequence N this is N + 1; 0 means nothing
    /// was read yet.
    pub cursor: u64,
    /// The projection's position when the checkpoint was saved
    pub position: Position,
    /// Consecutive events offered without a matching handler
    pub skip_streak: u64,
    /// When the checkpoint was saved
    pub saved_at: Timestamp,
}

impl Checkpoint {
    /// The checkpoint of a projection that never ran.
    pub fn initial() -> Self {
        Self {
            cursor: 0,
            position: Position::initial(),
            skip_streak: 0,
            saved_at: Timestamp::now(),
        }
    }
}

impl Default for Checkpoint {
    fn default() -> Self {
        Self::initial()
    }
}

/// Checkpoints keyed by projection identity.
///
/// Clones share the same underlying map. Nothing survives the process.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<Mutex<HashMap<ProjectionId, Checkpoint>>>,
}

impl InMemoryCheckpointStore {
    /// Creates an empty checkpoint store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the checkpoint saved for `id`, if any.
    pub fn load(&self, id: ProjectionId) -> Option<Checkpoint> {
        self.checkpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
    }

    /// Saves `checkpoint` for `id`, stamping it with the current time.
    pub fn save(&self, id: ProjectionId, checkpoint: Checkpoint) {
        let stamped = Checkpoint {
            saved_at: Timestamp::now(),
            ..checkpoint
        };
        let _ = self
            .checkpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, stamped);
    }

    /// Forgets the checkpoint for `id`, so the next run replays from the start.
    pub fn remove(&self, id: ProjectionId) -> Option<Checkpoint> {
        self.checkpoints
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
    }
}
