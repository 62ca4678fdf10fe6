//! The event contract consumed by projections.
//!
//! A projection only needs to know which handler an event belongs to. Payload
//! shape, serialization and storage stay with the application and the event
//! store.

use crate::types::EventType;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A domain event a projection can fold.
pub trait Event {
    /// The discriminator used to select a handler.
    fn event_type(&self) -> &str;
}

impl<T: Event + ?Sized> Event for Box<T> {
    fn event_type(&self) -> &str {
        (**self).event_type()
    }
}

/// An event carrying an untyped JSON payload.
///
/// Handy when events are decoded generically, or when state is itself a
/// keyed JSON record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonEvent {
    /// The discriminator used to select a handler
    #[serde(rename = "type")]
    pub event_type: EventType,
    /// The event body
    #[serde(default)]
    pub payload: Value,
}

impl JsonEvent {
    /// Creates a JSON event.
    pub const fn new(event_type: EventType, payload: Value) -> Self {
        Self {
            event_type,
            payload,
        }
    }
}

impl Event for JsonEvent {
    fn event_type(&self) -> &str {
        self.event_type.as_ref()
    }
}
