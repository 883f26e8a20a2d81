//! Fixtures for the PostgreSQL suite.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use outpost::{
    DeliveryContext, EventHandler, MessageDraft, MessageId, OutboxEvent, OutboxMessage,
    OutboxStore, OutboxWriter, PgStore,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutCompleted {
    pub workout_id: u64,
    pub duration_seconds: u32,
}

impl OutboxEvent for WorkoutCompleted {
    const EVENT_TYPE: &'static str = "workout.completed";
}

/// Succeeds always, counting deliveries.
#[derive(Clone, Default)]
pub struct CountingHandler {
    pub calls: Arc<AtomicU32>,
}

#[async_trait]
impl EventHandler for CountingHandler {
    type Event = WorkoutCompleted;
    type Error = String;

    async fn handle(&self, _event: &WorkoutCompleted, _ctx: &DeliveryContext) -> Result<(), String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Append one workout event in its own transaction.
pub async fn seed(store: &PgStore, workout_id: u64) -> anyhow::Result<OutboxMessage> {
    let event = WorkoutCompleted {
        workout_id,
        duration_seconds: 1800,
    };
    let mut writer = store.begin().await?;
    let message = writer.append(MessageDraft::encode(&event)?).await?;
    writer.commit().await?;
    Ok(message)
}

/// Unprocessed row count, straight from SQL.
pub async fn pending_count(pool: &PgPool) -> anyhow::Result<i64> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT count(*) FROM outpost.outbox_messages WHERE processed_at IS NULL",
    )
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Current lease holder of one row, straight from SQL.
pub async fn lease_holder(pool: &PgPool, id: MessageId) -> anyhow::Result<Option<String>> {
    let holder = sqlx::query_scalar::<_, Option<String>>(
        "SELECT leased_by FROM outpost.outbox_messages WHERE id = $1",
    )
    .bind(id.into_inner())
    .fetch_one(pool)
    .await?;
    Ok(holder)
}
