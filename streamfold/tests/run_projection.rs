//! Integration tests for handing a projection to an event store.
//!
//! Scenario: a driver receives the projection through `run`
//! - Given a projection with handlers registered
//! - When the application calls `projection.run(&store)`
//! - Then the store receives that same projection, by identity and by reference
//! - And whatever the store returns comes back untouched

use std::sync::Mutex;

use serde_json::{json, Value};
use streamfold::{
    async_trait, ApplyOutcome, EventStore, EventType, JsonEvent, Projection, ProjectionError,
    ProjectionId, ProjectionResult, ProjectionStatus, StreamType,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn event(name: &str) -> JsonEvent {
    JsonEvent::new(EventType::try_new(name).unwrap(), Value::Null)
}

fn counter() -> Projection<Value, JsonEvent> {
    Projection::<Value, JsonEvent>::from_stream_type(StreamType::try_new("counter").unwrap())
        .on(EventType::try_new("Incremented").unwrap(), |state, _| {
            Ok(json!({"count": state["count"].as_u64().unwrap_or(0) + 1}))
        })
        .init_state(json!({"count": 0}))
}

/// Records who it was asked to run and replays a fixed script of events.
struct ScriptedStore {
    events: Vec<JsonEvent>,
    seen: Mutex<Vec<ProjectionId>>,
}

impl ScriptedStore {
    fn new(names: &[&str]) -> Self {
        Self {
            events: names.iter().map(|name| event(name)).collect(),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EventStore<Value, JsonEvent> for ScriptedStore {
    type Output = ProjectionResult<Vec<ApplyOutcome>>;

    async fn exec(&self, projection: &mut Projection<Value, JsonEvent>) -> Self::Output {
        self.seen.lock().unwrap().push(projection.id());

        let mut outcomes = Vec::with_capacity(self.events.len());
        for event in &self.events {
            match projection.apply(event) {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    projection.set_status(ProjectionStatus::Broken);
                    return Err(err);
                }
            }
        }
        projection.set_status(ProjectionStatus::Ok);
        Ok(outcomes)
    }
}

/// Returns a constant, ignoring the projection entirely.
struct ConstantStore(&'static str);

#[async_trait]
impl<S: Send, E: Send> EventStore<S, E> for ConstantStore {
    type Output = &'static str;

    async fn exec(&self, _projection: &mut Projection<S, E>) -> Self::Output {
        self.0
    }
}

#[tokio::test]
async fn run_returns_exactly_what_exec_returns() {
    init_tracing();
    let mut projection = counter();

    let output = projection.run(&ConstantStore("done")).await;

    assert_eq!(output, "done");
    assert_eq!(projection.position().value(), 0);
}

#[tokio::test]
async fn run_passes_the_same_projection_to_the_store() {
    init_tracing();
    let store = ScriptedStore::new(&["Incremented", "Renamed", "Incremented"]);
    let mut projection = counter();

    let outcomes = projection.run(&store).await.unwrap();

    assert_eq!(store.seen.lock().unwrap().as_slice(), &[projection.id()]);
    assert_eq!(outcomes.len(), 3);
    assert!(!outcomes[1].is_applied());
    assert_eq!(*projection.state(), json!({"count": 2}));
    assert_eq!(projection.position().value(), 2);
    assert_eq!(projection.status(), ProjectionStatus::Ok);
}

#[tokio::test]
async fn driver_errors_surface_through_run() {
    init_tracing();
    let store = ScriptedStore::new(&["Incremented", "Renamed"]);
    let mut projection = counter().with_unhandled_policy(streamfold::UnhandledPolicy::Strict);

    let err = projection.run(&store).await.unwrap_err();

    assert!(matches!(err, ProjectionError::UnhandledEventType { .. }));
    assert_eq!(projection.status(), ProjectionStatus::Broken);
    assert_eq!(*projection.state(), json!({"count": 1}));
    assert_eq!(projection.position().value(), 1);
}

#[tokio::test]
async fn a_projection_can_be_shared_behind_a_mutex() {
    init_tracing();
    let shared = std::sync::Arc::new(tokio::sync::Mutex::new(counter()));
    let store = std::sync::Arc::new(ScriptedStore::new(&["Incremented"]));

    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            let store = store.clone();
            tokio::spawn(async move {
                let mut projection = shared.lock().await;
                projection.run(store.as_ref()).await.map(|outcomes| outcomes.len())
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 1);
    }

    let projection = shared.lock().await;
    assert_eq!(projection.position().value(), 4);
    assert_eq!(*projection.state(), json!({"count": 4}));
}
