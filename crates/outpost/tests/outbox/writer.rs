//! Producer-side guarantees: appends are atomic with the transaction that
//! made them and ids follow creation order.

use outpost::{MemoryStore, MessageDraft, OutboxStore, OutboxWriter};
use serde_json::json;

use crate::support::{seed_workout, WorkoutCompleted};

#[tokio::test]
async fn appends_become_visible_only_on_commit() {
    let store = MemoryStore::new();

    let mut writer = store.begin().await.unwrap();
    writer
        .append(MessageDraft::encode(&WorkoutCompleted { workout_id: 1, duration_seconds: 900 }).unwrap())
        .await
        .unwrap();
    writer
        .append(MessageDraft::encode(&WorkoutCompleted { workout_id: 2, duration_seconds: 600 }).unwrap())
        .await
        .unwrap();

    assert!(store.messages().await.is_empty());

    writer.commit().await.unwrap();
    assert_eq!(store.messages().await.len(), 2);
}

#[tokio::test]
async fn dropped_writer_discards_every_append() {
    let store = MemoryStore::new();

    {
        let mut writer = store.begin().await.unwrap();
        writer
            .append(MessageDraft::new("workout.completed", json!({ "workout_id": 1 })))
            .await
            .unwrap();
        writer
            .append(MessageDraft::new("goal.reached", json!({ "goal_id": 1 })))
            .await
            .unwrap();
        // Writer dropped without commit, as after an error in the producer's
        // own statements.
    }

    assert!(store.messages().await.is_empty());

    // The store stays usable for later transactions.
    seed_workout(&store, 3).await;
    assert_eq!(store.messages().await.len(), 1);
}

#[tokio::test]
async fn ids_ascend_in_creation_order() {
    let store = MemoryStore::new();

    let first = seed_workout(&store, 1).await;
    let second = seed_workout(&store, 2).await;
    let third = seed_workout(&store, 3).await;

    assert!(first.id < second.id);
    assert!(second.id < third.id);
}

#[tokio::test]
async fn stored_message_carries_draft_metadata() {
    let store = MemoryStore::new();

    let draft = MessageDraft::encode(&WorkoutCompleted { workout_id: 7, duration_seconds: 2400 })
        .unwrap()
        .with_correlation_id("session-41")
        .with_trace_id("trace-9");
    let event_id = draft.event_id();

    let mut writer = store.begin().await.unwrap();
    let message = writer.append(draft).await.unwrap();
    writer.commit().await.unwrap();

    assert_eq!(message.event_id, event_id);
    assert_eq!(message.event_type, "workout.completed");
    assert_eq!(message.payload["workout_id"], 7);
    assert_eq!(message.correlation_id.as_deref(), Some("session-41"));
    assert_eq!(message.trace_id.as_deref(), Some("trace-9"));
    assert_eq!(message.retry_count, 0);
    assert!(message.last_error.is_none());
    assert!(!message.is_processed());
}
