//! Property tests for the fold contract.
//!
//! These tests verify the invariants every projection keeps no matter which
//! events it is offered:
//! - position counts exactly the applied events on top of the starting offset
//! - unhandled events change nothing
//! - a failing handler changes nothing
//! - construction always yields a fresh, ready, empty projection

use proptest::prelude::*;
use serde_json::{json, Value};
use streamfold::{
    ApplyOutcome, EventType, HandlerError, JsonEvent, Position, Projection, ProjectionConfig,
    ProjectionError, ProjectionStatus, RandomIds, StreamTarget, StreamType,
};

const HANDLED: [&str; 2] = ["Deposited", "Withdrawn"];
const UNHANDLED: [&str; 2] = ["Renamed", "Audited"];

fn event_type(name: &str) -> EventType {
    EventType::try_new(name).unwrap()
}

fn arb_stream_type() -> impl Strategy<Value = StreamType> {
    "[a-z][a-z0-9_-]{0,30}".prop_filter_map("Invalid StreamType", |s| StreamType::try_new(s).ok())
}

fn arb_event() -> impl Strategy<Value = JsonEvent> {
    (
        prop::sample::select(vec![HANDLED[0], HANDLED[1], UNHANDLED[0], UNHANDLED[1]]),
        0i64..1_000,
    )
        .prop_map(|(name, amount)| JsonEvent::new(event_type(name), json!({ "amount": amount })))
}

/// A balance projection where withdrawals below zero fail.
fn balance(start: u64) -> Projection<i64, JsonEvent> {
    let config: ProjectionConfig<i64, JsonEvent> = ProjectionConfig::new(StreamTarget::StreamType(
        StreamType::try_new("account").unwrap(),
    ))
    .with_position(Position::new(start));

    Projection::with_config(config, &RandomIds)
        .unwrap()
        .on(event_type("Deposited"), |balance: &i64, event: &JsonEvent| {
            Ok(balance + event.payload["amount"].as_i64().unwrap_or(0))
        })
        .on(event_type("Withdrawn"), |balance: &i64, event: &JsonEvent| {
            let amount = event.payload["amount"].as_i64().unwrap_or(0);
            if amount > *balance {
                return Err(HandlerError::new("overdraft"));
            }
            Ok(balance - amount)
        })
}

proptest! {
    #[test]
    fn position_counts_applied_events(
        start in 0u64..1_000_000,
        events in prop::collection::vec(arb_event(), 0..64)
    ) {
        let mut projection = balance(start);
        let mut applied = 0u64;

        for event in &events {
            let before = (*projection.state(), projection.position());
            match projection.apply(event) {
                Ok(ApplyOutcome::Applied { position }) => {
                    applied += 1;
                    prop_assert_eq!(Some(position), before.1.next());
                }
                Ok(ApplyOutcome::Skipped { event_type }) => {
                    prop_assert!(UNHANDLED.contains(&event_type.as_str()));
                    prop_assert_eq!((*projection.state(), projection.position()), before);
                }
                Err(ProjectionError::HandlerFailed { position, .. }) => {
                    prop_assert_eq!(position, before.1);
                    prop_assert_eq!((*projection.state(), projection.position()), before);
                }
                Err(other) => return Err(TestCaseError::fail(format!("unexpected error {other}"))),
            }
        }

        prop_assert_eq!(projection.position().value(), start + applied);
        prop_assert!(*projection.state() >= 0);
    }

    #[test]
    fn unhandled_events_never_change_anything(
        names in prop::collection::vec(prop::sample::select(UNHANDLED.to_vec()), 1..32)
    ) {
        let mut projection = balance(0).init_state(42);

        for name in names {
            let event = JsonEvent::new(event_type(name), Value::Null);
            let outcome = projection.apply(&event).unwrap();
            prop_assert!(!outcome.is_applied());
        }

        prop_assert_eq!(*projection.state(), 42);
        prop_assert_eq!(projection.position(), Position::initial());
    }

    #[test]
    fn construction_is_fresh_every_time(stream_type in arb_stream_type()) {
        let first: Projection<Value, JsonEvent> = Projection::from_stream_type(stream_type.clone());
        let second: Projection<Value, JsonEvent> =
            Projection::from_stream_type(stream_type.clone());

        prop_assert_ne!(first.id(), second.id());
        for projection in [&first, &second] {
            prop_assert_eq!(projection.stream_type(), Some(&stream_type));
            prop_assert!(projection.handlers().is_empty());
            prop_assert_eq!(projection.position(), Position::initial());
            prop_assert_eq!(projection.status(), ProjectionStatus::Ready);
            prop_assert!(!projection.is_fan_out());
        }

        let each: Projection<Value, JsonEvent> = Projection::from_each_key_of(stream_type);
        prop_assert!(each.is_fan_out());
    }

    #[test]
    fn latest_registration_is_the_only_one_invoked(first in 1i64..100, second in 100i64..200) {
        let mut projection = Projection::<i64, JsonEvent>::from_stream_type(
            StreamType::try_new("counter").unwrap(),
        )
        .on(event_type("Bumped"), move |n, _| Ok(n + first))
        .on(event_type("Bumped"), move |n, _| Ok(n + second));

        projection.apply(&JsonEvent::new(event_type("Bumped"), Value::Null)).unwrap();

        prop_assert_eq!(*projection.state(), second);
    }
}

#[test]
fn subscribed_event_types_are_introspectable() {
    let projection = balance(0);
    let mut event_types: Vec<&str> = projection.handlers().event_types().collect();
    event_types.sort_unstable();
    assert_eq!(event_types, vec!["Deposited", "Withdrawn"]);
    assert!(projection.handlers().contains("Deposited"));
    assert!(!projection.handlers().contains("Renamed"));
}
