//! Identity generation for projections.
//!
//! Construction takes its identity source as a parameter so that tests and
//! replays can produce the same identities every time.

use crate::types::ProjectionId;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Source of fresh projection identities.
pub trait IdGenerator {
    /// Returns an identity never handed out before by this generator.
    fn generate(&self) -> ProjectionId;
}

/// Random (v4) UUIDs. The generator used by the plain named constructors.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIds;

impl IdGenerator for RandomIds {
    fn generate(&self) -> ProjectionId {
        ProjectionId::new(Uuid::new_v4())
    }
}

/// Deterministic identities `1, 2, 3, ...` encoded as UUIDs.
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicU64,
}

impl SequentialIds {
    /// Creates a generator whose first identity is `first`.
    pub const fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl IdGenerator for SequentialIds {
    fn generate(&self) -> ProjectionId {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        ProjectionId::new(Uuid::from_u128(u128::from(n)))
    }
}

impl<F> IdGenerator for F
where
    F: Fn() -> ProjectionId,
{
    fn generate(&self) -> ProjectionId {
        self()
    }
}
