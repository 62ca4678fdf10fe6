//! Handler functions and the event-type keyed handler table.

use crate::types::EventType;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a handler that cannot fold an event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
}

impl HandlerError {
    /// Creates a handler error with a human readable message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message the handler reported.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// A fold function for one event type: `(prior state, event) -> next state`.
///
/// Handlers borrow the prior state and return a fresh value, so a failing
/// handler can never leave a half-updated state behind.
pub type Handler<S, E> = Arc<dyn Fn(&S, &E) -> Result<S, HandlerError> + Send + Sync>;

/// Handlers keyed by the event type they fold.
pub struct Handlers<S, E> {
    handlers: HashMap<String, Handler<S, E>>,
}

impl<S, E> Handlers<S, E> {
    /// Creates an empty handler table.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers `handler` for `event_type`, returning the handler it replaced.
    pub fn insert<F>(&mut self, event_type: EventType, handler: F) -> Option<Handler<S, E>>
    where
        F: Fn(&S, &E) -> Result<S, HandlerError> + Send + Sync + 'static,
    {
        self.handlers.insert(event_type.into_inner(), Arc::new(handler))
    }

    /// Builder form of [`Handlers::insert`].
    #[must_use]
    pub fn with<F>(mut self, event_type: EventType, handler: F) -> Self
    where
        F: Fn(&S, &E) -> Result<S, HandlerError> + Send + Sync + 'static,
    {
        let _ = self.insert(event_type, handler);
        self
    }

    /// Looks up the handler for an event type.
    pub fn get(&self, event_type: &str) -> Option<&Handler<S, E>> {
        self.handlers.get(event_type)
    }

    /// Whether a handler is registered for `event_type`.
    pub fn contains(&self, event_type: &str) -> bool {
        self.handlers.contains_key(event_type)
    }

    /// The subscribed event types, in no particular order.
    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<S, E> Default for Handlers<S, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, E> Clone for Handlers<S, E> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<S, E> fmt::Debug for Handlers<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut event_types: Vec<&str> = self.event_types().collect();
        event_types.sort_unstable();
        f.debug_struct("Handlers")
            .field("event_types", &event_types)
            .finish()
    }
}
