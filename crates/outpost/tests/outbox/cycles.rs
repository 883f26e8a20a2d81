//! Single-cycle behavior: outcome handling, retry bookkeeping, quarantine,
//! and storage failures.

use std::sync::atomic::Ordering;
use std::time::Duration;

use outpost::{
    DeadLetterQuery, MemoryStore, MessageDraft, OutboxStore, OutboxWriter, Processor,
    ProcessorConfig,
};
use serde_json::json;

use crate::support::{
    seed_workout, seed_workouts, AlwaysFailHandler, CountingHandler, FailWith, FailingStore,
    FlakyHandler, GoalReached, WorkoutCompleted,
};

#[tokio::test]
async fn captured_event_is_delivered_once() {
    let store = MemoryStore::new();
    let message = seed_workout(&store, 1).await;

    let handler = CountingHandler::<WorkoutCompleted>::default();
    let processor = Processor::builder(store.clone())
        .register(handler.clone())
        .build()
        .unwrap();

    let stats = processor.run_cycle().await.unwrap();
    assert_eq!(stats.claimed, 1);
    assert_eq!(stats.delivered, 1);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    assert!(store.message(message.id).await.unwrap().is_processed());

    // Nothing left to do.
    let stats = processor.run_cycle().await.unwrap();
    assert_eq!(stats.claimed, 0);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transient_failures_retry_until_success() {
    let store = MemoryStore::new();
    let message = seed_workout(&store, 1).await;

    let handler = FlakyHandler::failing(2);
    let processor = Processor::builder(store.clone())
        .register(handler.clone())
        .build()
        .unwrap();

    let first = processor.run_cycle().await.unwrap();
    assert_eq!(first.retried, 1);
    let stored = store.message(message.id).await.unwrap();
    assert_eq!(stored.retry_count, 1);
    assert_eq!(stored.last_error.as_deref(), Some("push gateway unavailable"));

    let second = processor.run_cycle().await.unwrap();
    assert_eq!(second.retried, 1);

    let third = processor.run_cycle().await.unwrap();
    assert_eq!(third.delivered, 1);

    let stored = store.message(message.id).await.unwrap();
    assert!(stored.is_processed());
    assert_eq!(stored.retry_count, 2);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn retry_budget_exhaustion_parks_the_message() {
    let store = MemoryStore::new();
    let message = seed_workout(&store, 1).await;

    let handler = AlwaysFailHandler::default();
    let processor = Processor::builder(store.clone())
        .register(handler.clone())
        .build()
        .unwrap();

    let first = processor.run_cycle().await.unwrap();
    assert_eq!(first.retried, 1);
    let second = processor.run_cycle().await.unwrap();
    assert_eq!(second.retried, 1);
    let third = processor.run_cycle().await.unwrap();
    assert_eq!(third.quarantined, 1);

    // The fourth cycle no longer sees the message.
    let fourth = processor.run_cycle().await.unwrap();
    assert_eq!(fourth.claimed, 0);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 3);

    let stored = store.message(message.id).await.unwrap();
    assert!(!stored.is_processed());
    assert_eq!(stored.retry_count, 3);
    assert_eq!(
        processor
            .count_dead_letters(&DeadLetterQuery::default())
            .await
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn unroutable_message_is_parked_on_first_sight() {
    let store = MemoryStore::new();
    let mut writer = store.begin().await.unwrap();
    let message = writer
        .append(MessageDraft::new("mystery.event", json!({ "anything": true })))
        .await
        .unwrap();
    writer.commit().await.unwrap();

    let handler = CountingHandler::<WorkoutCompleted>::default();
    let processor = Processor::builder(store.clone())
        .register(handler.clone())
        .build()
        .unwrap();

    let stats = processor.run_cycle().await.unwrap();
    assert_eq!(stats.claimed, 1);
    assert_eq!(stats.quarantined, 1);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);

    let parked = processor
        .dead_letters(&DeadLetterQuery::default())
        .await
        .unwrap();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].id, message.id);
    assert!(parked[0]
        .last_error
        .as_deref()
        .unwrap()
        .contains("no handler registered"));
}

#[tokio::test]
async fn undecodable_payload_is_parked_on_first_sight() {
    let store = MemoryStore::new();
    let mut writer = store.begin().await.unwrap();
    writer
        .append(MessageDraft::new(
            "workout.completed",
            json!({ "workout_id": "seven" }),
        ))
        .await
        .unwrap();
    writer.commit().await.unwrap();

    let handler = CountingHandler::<WorkoutCompleted>::default();
    let processor = Processor::builder(store.clone())
        .register(handler.clone())
        .build()
        .unwrap();

    let stats = processor.run_cycle().await.unwrap();
    assert_eq!(stats.quarantined, 1);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);

    let parked = processor
        .dead_letters(&DeadLetterQuery::default())
        .await
        .unwrap();
    assert!(parked[0]
        .last_error
        .as_deref()
        .unwrap()
        .contains("does not decode"));
}

#[tokio::test]
async fn messages_route_to_their_own_handlers() {
    let store = MemoryStore::new();
    let mut writer = store.begin().await.unwrap();
    for (event_type, payload) in [
        ("workout.completed", json!({ "workout_id": 1, "duration_seconds": 900 })),
        ("goal.reached", json!({ "goal_id": 1 })),
        ("workout.completed", json!({ "workout_id": 2, "duration_seconds": 600 })),
    ] {
        writer
            .append(MessageDraft::new(event_type, payload))
            .await
            .unwrap();
    }
    writer.commit().await.unwrap();

    let workouts = CountingHandler::<WorkoutCompleted>::default();
    let goals = CountingHandler::<GoalReached>::default();
    let processor = Processor::builder(store)
        .register(workouts.clone())
        .register(goals.clone())
        .build()
        .unwrap();

    let stats = processor.run_cycle().await.unwrap();
    assert_eq!(stats.delivered, 3);
    assert_eq!(workouts.calls.load(Ordering::SeqCst), 2);
    assert_eq!(goals.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failure_reasons_are_stored_truncated() {
    let store = MemoryStore::new();
    let message = seed_workout(&store, 1).await;

    let processor = Processor::builder(store.clone())
        .register(FailWith("x".repeat(5000)))
        .build()
        .unwrap();
    processor.run_cycle().await.unwrap();

    let stored = store.message(message.id).await.unwrap();
    assert_eq!(stored.last_error.as_ref().unwrap().len(), 1024);
}

#[tokio::test]
async fn claim_failure_aborts_the_cycle_and_heals() {
    let store = FailingStore::new();
    seed_workout(&store.inner, 1).await;

    let handler = CountingHandler::<WorkoutCompleted>::default();
    let processor = Processor::builder(store.clone())
        .register(handler.clone())
        .build()
        .unwrap();

    store.fail_claims(true);
    let error = processor.run_cycle().await.unwrap_err();
    assert!(error.to_string().contains("injected storage failure"));
    assert_eq!(handler.calls.load(Ordering::SeqCst), 0);

    // The same processor recovers on the next cycle.
    store.fail_claims(false);
    let stats = processor.run_cycle().await.unwrap();
    assert_eq!(stats.delivered, 1);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn outcome_write_failure_leaves_the_lease_to_expire() {
    let store = FailingStore::new();
    let message = seed_workout(&store.inner, 1).await;

    let handler = CountingHandler::<WorkoutCompleted>::default();
    let processor = Processor::builder(store.clone())
        .register(handler.clone())
        .config(ProcessorConfig {
            claim_lease: Duration::from_millis(200),
            ..Default::default()
        })
        .build()
        .unwrap();

    // Delivery happens, but recording the outcome fails mid-cycle.
    store.fail_updates(true);
    processor.run_cycle().await.unwrap_err();
    assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    assert!(!store.inner.message(message.id).await.unwrap().is_processed());

    // The lease is still held, so the message stays invisible for now.
    store.fail_updates(false);
    let stats = processor.run_cycle().await.unwrap();
    assert_eq!(stats.claimed, 0);

    // Once it expires the message is redelivered: at-least-once, not at-most-once.
    tokio::time::sleep(Duration::from_millis(250)).await;
    let stats = processor.run_cycle().await.unwrap();
    assert_eq!(stats.delivered, 1);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 2);
    assert!(store.inner.message(message.id).await.unwrap().is_processed());
}

#[tokio::test]
async fn concurrent_dispatch_delivers_the_whole_batch() {
    let store = MemoryStore::new();
    seed_workouts(&store, 20).await;

    let handler = CountingHandler::<WorkoutCompleted>::default();
    let processor = Processor::builder(store.clone())
        .register(handler.clone())
        .config(ProcessorConfig {
            dispatch_concurrency: 4,
            ..Default::default()
        })
        .build()
        .unwrap();

    let stats = processor.run_cycle().await.unwrap();
    assert_eq!(stats.claimed, 20);
    assert_eq!(stats.delivered, 20);
    assert_eq!(handler.calls.load(Ordering::SeqCst), 20);
    assert!(store.messages().await.iter().all(|m| m.is_processed()));
}
