//! Events as the in-memory log records them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use streamfold::{Event, StreamId, StreamType};

/// A timestamp for when an event was recorded or a checkpoint saved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp representing the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Returns the underlying `DateTime`.
    pub const fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(datetime: DateTime<Utc>) -> Self {
        Self(datetime)
    }
}

/// A payload together with where and when it was recorded.
///
/// `sequence` is the event's place in the global log: the first event ever
/// appended has sequence 0, and sequences never repeat or go backwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedEvent<P> {
    /// Global position in the log
    pub sequence: u64,
    /// The category of the stream the event was appended to
    pub stream_type: StreamType,
    /// The stream the event was appended to
    pub stream_id: StreamId,
    /// When the event was appended
    pub recorded_at: Timestamp,
    /// The domain event
    pub payload: P,
}

impl<P: Event> Event for RecordedEvent<P> {
    fn event_type(&self) -> &str {
        self.payload.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use streamfold::{EventType, JsonEvent};

    #[test]
    fn recorded_events_dispatch_on_the_payload_type() {
        let recorded = RecordedEvent {
            sequence: 0,
            stream_type: StreamType::try_new("account").unwrap(),
            stream_id: StreamId::random(),
            recorded_at: Timestamp::now(),
            payload: JsonEvent::new(EventType::try_new("Opened").unwrap(), serde_json::Value::Null),
        };
        assert_eq!(recorded.event_type(), "Opened");
    }

    #[test]
    fn timestamps_order_chronologically() {
        let earlier = Timestamp::from(DateTime::<Utc>::UNIX_EPOCH);
        assert!(earlier < Timestamp::now());
        assert_eq!(earlier.as_datetime().timestamp(), 0);
    }
}
