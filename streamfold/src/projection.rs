//! Projections: named, replayable folds over event streams.
//!
//! A [`Projection`] binds a handler table to a stream target, folds events
//! into its state one at a time and counts how many it applied. Everything
//! around that (reading events, saving checkpoints, deciding when a projection
//! is broken) belongs to the [`EventStore`] driving it.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut projection = Projection::from_stream_type(StreamType::try_new("counter")?)
//!     .on(EventType::try_new("Incremented")?, |count: &u64, _event: &JsonEvent| Ok(count + 1))
//!     .init_state(0);
//!
//! projection.apply(&incremented)?;
//! assert_eq!(*projection.state(), 1);
//! ```

use crate::errors::{ProjectionError, ProjectionResult};
use crate::event::Event;
use crate::handler::{HandlerError, Handlers};
use crate::identity::{IdGenerator, RandomIds};
use crate::options::{ProjectionOptions, UnhandledPolicy};
use crate::status::ProjectionStatus;
use crate::store::EventStore;
use crate::types::{EventStreamHandle, EventType, Position, ProjectionId, StreamId, StreamType};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

/// Which events a driver offers to a projection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "stream")]
pub enum StreamTarget {
    /// Every event of every stream of one type, merged into one state.
    StreamType(StreamType),
    /// Every event of a single stream.
    StreamInstance(StreamId),
    /// One independent projection per stream of the type.
    EachKeyOf(StreamType),
    /// Not bound to any stream; a driver offers nothing.
    Unbound,
}

impl StreamTarget {
    /// The stream type for type-bound and fan-out targets.
    pub const fn stream_type(&self) -> Option<&StreamType> {
        match self {
            Self::StreamType(stream_type) | Self::EachKeyOf(stream_type) => Some(stream_type),
            Self::StreamInstance(_) | Self::Unbound => None,
        }
    }

    /// The stream identifier for instance-bound targets.
    pub const fn stream_id(&self) -> Option<StreamId> {
        match self {
            Self::StreamInstance(stream_id) => Some(*stream_id),
            Self::StreamType(_) | Self::EachKeyOf(_) | Self::Unbound => None,
        }
    }

    /// Whether the target asks for one projection per stream key.
    pub const fn is_fan_out(&self) -> bool {
        matches!(self, Self::EachKeyOf(_))
    }

    /// Whether an event recorded on (`stream_type`, `stream_id`) belongs to this target.
    pub fn matches(&self, stream_type: &StreamType, stream_id: StreamId) -> bool {
        match self {
            Self::StreamType(target) | Self::EachKeyOf(target) => target == stream_type,
            Self::StreamInstance(target) => *target == stream_id,
            Self::Unbound => false,
        }
    }
}

/// Result of offering one event to a projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A handler folded the event; `position` is the new position.
    Applied {
        /// Position after the event was applied
        position: Position,
    },
    /// No handler is registered for the event type; nothing changed.
    Skipped {
        /// The event type nobody handles
        event_type: String,
    },
}

impl ApplyOutcome {
    /// Whether the event changed the projection.
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Every option a projection can be created with, with its default.
///
/// | field          | default                         |
/// |----------------|---------------------------------|
/// | `target`       | [`StreamTarget::Unbound`]       |
/// | `event_stream` | none                            |
/// | `handlers`     | empty                           |
/// | `id`           | generated                       |
/// | `state`        | `S::default()`                  |
/// | `position`     | 0                               |
/// | `options`      | 0 (not verbose)                 |
/// | `unhandled`    | [`UnhandledPolicy::Skip`]       |
pub struct ProjectionConfig<S, E> {
    /// Which events the projection is offered
    pub target: StreamTarget,
    /// Opaque handle returned verbatim by [`Projection::event_stream`]
    pub event_stream: Option<EventStreamHandle>,
    /// Initial handler table
    pub handlers: Handlers<S, E>,
    /// Explicit identity; generated when absent
    pub id: Option<ProjectionId>,
    /// Explicit initial state; `S::default()` when absent
    pub state: Option<S>,
    /// Starting position, for resuming
    pub position: Position,
    /// Raw [`ProjectionOptions`] bits, validated at construction
    pub options: u32,
    /// What to do with events nobody handles
    pub unhandled: UnhandledPolicy,
}

impl<S, E> ProjectionConfig<S, E> {
    /// A default configuration bound to `target`.
    pub fn new(target: StreamTarget) -> Self {
        Self {
            target,
            ..Self::default()
        }
    }

    /// Sets the opaque event-stream handle.
    #[must_use]
    pub fn with_event_stream(mut self, event_stream: EventStreamHandle) -> Self {
        self.event_stream = Some(event_stream);
        self
    }

    /// Sets the initial handler table.
    #[must_use]
    pub fn with_handlers(mut self, handlers: Handlers<S, E>) -> Self {
        self.handlers = handlers;
        self
    }

    /// Uses an explicit identity instead of generating one.
    #[must_use]
    pub const fn with_id(mut self, id: ProjectionId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the initial state.
    #[must_use]
    pub fn with_state(mut self, state: S) -> Self {
        self.state = Some(state);
        self
    }

    /// Sets the starting position.
    #[must_use]
    pub const fn with_position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }

    /// Sets the raw options bits.
    #[must_use]
    pub const fn with_options(mut self, options: u32) -> Self {
        self.options = options;
        self
    }

    /// Sets the policy for unhandled event types.
    #[must_use]
    pub const fn with_unhandled_policy(mut self, unhandled: UnhandledPolicy) -> Self {
        self.unhandled = unhandled;
        self
    }
}

impl<S, E> Default for ProjectionConfig<S, E> {
    fn default() -> Self {
        Self {
            target: StreamTarget::Unbound,
            event_stream: None,
            handlers: Handlers::new(),
            id: None,
            state: None,
            position: Position::initial(),
            options: 0,
            unhandled: UnhandledPolicy::default(),
        }
    }
}

/// A stateful event folder bound to a stream target.
///
/// # Type Parameters
///
/// - `S`: the accumulated state
/// - `E`: the event type handlers receive
///
/// `apply` takes `&mut self`, so two callers can never fold into the same
/// projection at once; share one across tasks behind a mutex.
pub struct Projection<S, E> {
    id: ProjectionId,
    target: StreamTarget,
    event_stream: Option<EventStreamHandle>,
    handlers: Handlers<S, E>,
    state: S,
    position: Position,
    status: ProjectionStatus,
    options: ProjectionOptions,
    unhandled: UnhandledPolicy,
}

impl<S: Default, E> Projection<S, E> {
    /// Binds a projection to every stream of `stream_type`.
    pub fn from_stream_type(stream_type: StreamType) -> Self {
        Self::from_stream_type_with_ids(stream_type, &RandomIds)
    }

    /// [`Projection::from_stream_type`] with an explicit identity source.
    pub fn from_stream_type_with_ids(
        stream_type: StreamType,
        ids: &(impl IdGenerator + ?Sized),
    ) -> Self {
        Self::bound(StreamTarget::StreamType(stream_type), ids)
    }

    /// Binds a projection to a single stream.
    pub fn from_stream_instance(stream_id: StreamId) -> Self {
        Self::from_stream_instance_with_ids(stream_id, &RandomIds)
    }

    /// [`Projection::from_stream_instance`] with an explicit identity source.
    pub fn from_stream_instance_with_ids(
        stream_id: StreamId,
        ids: &(impl IdGenerator + ?Sized),
    ) -> Self {
        Self::bound(StreamTarget::StreamInstance(stream_id), ids)
    }

    /// Declares one projection per stream of `stream_type`.
    ///
    /// The returned projection is a template: a driver creates a partition
    /// for every distinct stream key with [`Projection::partition_for`].
    pub fn from_each_key_of(stream_type: StreamType) -> Self {
        Self::from_each_key_of_with_ids(stream_type, &RandomIds)
    }

    /// [`Projection::from_each_key_of`] with an explicit identity source.
    pub fn from_each_key_of_with_ids(
        stream_type: StreamType,
        ids: &(impl IdGenerator + ?Sized),
    ) -> Self {
        Self::bound(StreamTarget::EachKeyOf(stream_type), ids)
    }

    /// Creates a projection from an explicit configuration.
    ///
    /// Fails with [`ProjectionError::InvalidOptions`] if `config.options`
    /// carries unknown bits.
    pub fn with_config(
        config: ProjectionConfig<S, E>,
        ids: &(impl IdGenerator + ?Sized),
    ) -> ProjectionResult<Self> {
        let options = ProjectionOptions::from_bits(config.options)?;
        Ok(Self {
            id: config.id.unwrap_or_else(|| ids.generate()),
            target: config.target,
            event_stream: config.event_stream,
            handlers: config.handlers,
            state: config.state.unwrap_or_default(),
            position: config.position,
            status: ProjectionStatus::Ready,
            options,
            unhandled: config.unhandled,
        })
    }

    fn bound(target: StreamTarget, ids: &(impl IdGenerator + ?Sized)) -> Self {
        Self {
            id: ids.generate(),
            target,
            event_stream: None,
            handlers: Handlers::new(),
            state: S::default(),
            position: Position::initial(),
            status: ProjectionStatus::Ready,
            options: ProjectionOptions::empty(),
            unhandled: UnhandledPolicy::default(),
        }
    }

    /// Resets the state to `S::default()`.
    pub fn reset_state(&mut self) {
        self.state = S::default();
    }
}

impl<S, E> Projection<S, E> {
    /// Registers (or replaces) the handler for `event_type`.
    #[must_use]
    pub fn on<F>(mut self, event_type: EventType, handler: F) -> Self
    where
        F: Fn(&S, &E) -> Result<S, HandlerError> + Send + Sync + 'static,
    {
        let _ = self.handlers.insert(event_type, handler);
        self
    }

    /// Replaces the state, discarding whatever was accumulated.
    ///
    /// Meant to run once before the first event; calling it after events were
    /// applied throws their effect away but keeps the position.
    #[must_use]
    pub fn init_state(mut self, state: S) -> Self {
        self.state = state;
        self
    }

    /// Replaces the diagnostic options.
    #[must_use]
    pub const fn with_options(mut self, options: ProjectionOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the policy for unhandled event types.
    #[must_use]
    pub const fn with_unhandled_policy(mut self, unhandled: UnhandledPolicy) -> Self {
        self.unhandled = unhandled;
        self
    }

    /// In-place form of [`Projection::init_state`].
    pub fn set_state(&mut self, state: S) {
        self.state = state;
    }

    /// Records a status decided by the driver.
    pub fn set_status(&mut self, status: ProjectionStatus) {
        self.status = status;
    }

    /// Hands the projection to `store` and returns the store's result untouched.
    pub async fn run<St>(&mut self, store: &St) -> St::Output
    where
        St: EventStore<S, E> + ?Sized,
    {
        store.exec(self).await
    }

    /// The projection's identity.
    pub const fn id(&self) -> ProjectionId {
        self.id
    }

    /// The stream target.
    pub const fn target(&self) -> &StreamTarget {
        &self.target
    }

    /// The stream type, for type-bound and fan-out projections.
    pub const fn stream_type(&self) -> Option<&StreamType> {
        self.target.stream_type()
    }

    /// The stream identifier, for instance-bound projections.
    pub const fn stream_id(&self) -> Option<StreamId> {
        self.target.stream_id()
    }

    /// Whether the driver should create one projection per stream key.
    pub const fn is_fan_out(&self) -> bool {
        self.target.is_fan_out()
    }

    /// The opaque event-stream handle given at construction.
    pub const fn event_stream(&self) -> Option<&EventStreamHandle> {
        self.event_stream.as_ref()
    }

    /// The handler table.
    pub const fn handlers(&self) -> &Handlers<S, E> {
        &self.handlers
    }

    /// The accumulated state.
    pub const fn state(&self) -> &S {
        &self.state
    }

    /// Consumes the projection, returning its state.
    pub fn into_state(self) -> S {
        self.state
    }

    /// Number of events applied, plus the starting offset.
    pub const fn position(&self) -> Position {
        self.position
    }

    /// The status last set by a driver.
    pub const fn status(&self) -> ProjectionStatus {
        self.status
    }

    /// The diagnostic options.
    pub const fn options(&self) -> ProjectionOptions {
        self.options
    }

    /// Whether verbose tracing is enabled.
    pub const fn is_verbose(&self) -> bool {
        self.options.is_verbose()
    }

    /// The policy for unhandled event types.
    pub const fn unhandled_policy(&self) -> UnhandledPolicy {
        self.unhandled
    }
}

impl<S, E: Event> Projection<S, E> {
    /// Folds one event into the state.
    ///
    /// State and position change together or not at all: a missing handler,
    /// a failing handler or a position already at `u64::MAX` leaves both
    /// exactly as they were.
    pub fn apply(&mut self, event: &E) -> ProjectionResult<ApplyOutcome> {
        let event_type = event.event_type();

        let Some(handler) = self.handlers.get(event_type) else {
            return self.unhandled(event_type);
        };
        let position = self
            .position
            .next()
            .ok_or(ProjectionError::PositionOverflow {
                projection_id: self.id,
            })?;

        if self.options.is_verbose() {
            info!(projection_id = %self.id, "Projecting {event_type}");
        }

        let next = handler(&self.state, event).map_err(|source| ProjectionError::HandlerFailed {
            projection_id: self.id,
            event_type: event_type.to_string(),
            position: self.position,
            source,
        })?;

        self.state = next;
        self.position = position;
        Ok(ApplyOutcome::Applied { position })
    }

    fn unhandled(&self, event_type: &str) -> ProjectionResult<ApplyOutcome> {
        match self.unhandled {
            UnhandledPolicy::Skip => {
                if self.options.is_verbose() {
                    info!(projection_id = %self.id, "Skipping unhandled {event_type}");
                }
                Ok(ApplyOutcome::Skipped {
                    event_type: event_type.to_string(),
                })
            }
            UnhandledPolicy::Strict => Err(ProjectionError::UnhandledEventType {
                projection_id: self.id,
                event_type: event_type.to_string(),
            }),
        }
    }
}

impl<S: Clone, E> Projection<S, E> {
    /// Creates the partition of a fan-out template for one stream.
    ///
    /// The partition gets a fresh identity, is bound to `stream_id`, shares the
    /// template's handlers, options and policy, starts from the template's
    /// current state and at position 0.
    pub fn partition_for(
        &self,
        stream_id: StreamId,
        ids: &(impl IdGenerator + ?Sized),
    ) -> ProjectionResult<Self> {
        if !self.is_fan_out() {
            return Err(ProjectionError::NotFanOut(self.id));
        }

        Ok(Self {
            id: ids.generate(),
            target: StreamTarget::StreamInstance(stream_id),
            event_stream: self.event_stream.clone(),
            handlers: self.handlers.clone(),
            state: self.state.clone(),
            position: Position::initial(),
            status: ProjectionStatus::Ready,
            options: self.options,
            unhandled: self.unhandled,
        })
    }
}

impl<S: fmt::Debug, E> fmt::Debug for Projection<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Projection")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("event_stream", &self.event_stream)
            .field("handlers", &self.handlers)
            .field("state", &self.state)
            .field("position", &self.position)
            .field("status", &self.status)
            .field("options", &self.options)
            .field("unhandled", &self.unhandled)
            .finish()
    }
}
