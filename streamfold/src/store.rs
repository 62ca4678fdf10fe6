//! The event store seam.
//!
//! A projection never pulls events itself. It hands itself to an
//! [`EventStore`], which feeds it events in stream order, owns checkpoints and
//! status transitions, and returns whatever report it likes.

use crate::projection::Projection;
use async_trait::async_trait;

/// Driver that executes a projection against stored events.
///
/// # Contract
///
/// - Events for one projection are applied one at a time, in strictly
///   increasing stream order, never concurrently.
/// - Cancellation happens between `apply` calls, never during one.
/// - The driver decides every status transition; the projection only carries
///   the value.
///
/// # Example
///
/// ```rust,ignore
/// struct CountingStore;
///
/// #[async_trait]
/// impl<S: Send, E: Event + Send> EventStore<S, E> for CountingStore {
///     type Output = u64;
///
///     async fn exec(&self, projection: &mut Projection<S, E>) -> u64 {
///         projection.position().value()
///     }
/// }
///
/// let position = projection.run(&CountingStore).await;
/// ```
#[async_trait]
pub trait EventStore<S, E>: Send + Sync {
    /// What a run returns to the caller of [`Projection::run`].
    type Output: Send;

    /// Runs `projection` over the events it targets.
    async fn exec(&self, projection: &mut Projection<S, E>) -> Self::Output;
}
