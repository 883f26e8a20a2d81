use std::time::Duration;

use serde_json::Value;
use sqlx::postgres::{PgConnection, PgPool, Postgres};
use sqlx::Transaction;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::message::{truncate_error, MessageDraft, MessageId, OutboxMessage};
use crate::store::claim::{ClaimStore, DeadLetterQuery, DEFAULT_DEAD_LETTER_LIMIT};
use crate::store::{OutboxStore, OutboxWriter};

/// PostgreSQL-backed outbox store.
///
/// Messages live in the `outpost.outbox_messages` table. Claims take row
/// locks with `FOR UPDATE SKIP LOCKED`, so any number of processors can poll
/// one database without coordinating; leases recorded on the row keep a
/// claim exclusive across processes even after the locking transaction ends.
///
/// # Example
///
/// ```ignore
/// use outpost::{MessageDraft, OutboxStore, OutboxWriter, PgStore};
/// use serde_json::json;
///
/// let store = PgStore::new(pool);
/// store.migrate().await?;
///
/// let mut writer = store.begin().await?;
/// // Business writes share the transaction via writer.connection().
/// writer.append(MessageDraft::new("workout.completed", json!({ "workout_id": 7 }))).await?;
/// writer.commit().await?;
/// ```
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// Row shape shared by every query returning messages.
#[derive(sqlx::FromRow)]
struct MessageRow {
    id: i64,
    event_id: Uuid,
    event_type: String,
    payload: Value,
    created_at: OffsetDateTime,
    processed_at: Option<OffsetDateTime>,
    correlation_id: Option<String>,
    trace_id: Option<String>,
    retry_count: i32,
    last_error: Option<String>,
}

impl From<MessageRow> for OutboxMessage {
    fn from(row: MessageRow) -> Self {
        Self {
            id: MessageId::new(row.id),
            event_id: row.event_id,
            event_type: row.event_type,
            payload: row.payload,
            created_at: row.created_at,
            processed_at: row.processed_at,
            correlation_id: row.correlation_id,
            trace_id: row.trace_id,
            retry_count: row.retry_count as u32,
            last_error: row.last_error,
        }
    }
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> crate::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }
}

impl OutboxStore for PgStore {
    type Writer<'a>
        = PgOutboxWriter<'a>
    where
        Self: 'a;

    async fn begin(&self) -> crate::Result<Self::Writer<'_>> {
        let tx = self.pool.begin().await?;
        Ok(PgOutboxWriter { tx })
    }
}

/// Writer for [`PgStore`], wrapping one database transaction.
///
/// [`connection`](Self::connection) exposes the transaction so the producer
/// can run its business statements on it. The business change and the
/// appended messages then commit or roll back as one unit.
pub struct PgOutboxWriter<'a> {
    tx: Transaction<'a, Postgres>,
}

impl PgOutboxWriter<'_> {
    /// The underlying transaction, for business writes that must commit
    /// together with the appended messages.
    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.tx
    }
}

impl OutboxWriter for PgOutboxWriter<'_> {
    async fn append(&mut self, draft: MessageDraft) -> crate::Result<OutboxMessage> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO outpost.outbox_messages
                (event_id, event_type, payload, correlation_id, trace_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, event_id, event_type, payload, created_at, processed_at,
                      correlation_id, trace_id, retry_count, last_error
            "#,
        )
        .bind(draft.event_id)
        .bind(&draft.event_type)
        .bind(&draft.payload)
        .bind(draft.correlation_id.as_deref())
        .bind(draft.trace_id.as_deref())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into())
    }

    async fn commit(self) -> crate::Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

impl ClaimStore for PgStore {
    async fn claim_batch(
        &self,
        claimant: &str,
        lease_duration: Duration,
        max_retry_attempts: u32,
        batch_size: u32,
    ) -> crate::Result<Vec<OutboxMessage>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            WITH claimable AS (
                SELECT id
                FROM outpost.outbox_messages
                WHERE processed_at IS NULL
                  AND retry_count < $3
                  AND (lease_until IS NULL OR lease_until < now())
                ORDER BY id
                LIMIT $4
                FOR UPDATE SKIP LOCKED
            ),
            claimed AS (
                UPDATE outpost.outbox_messages AS m
                SET leased_by = $2,
                    lease_until = now() + ($1 * interval '1 second')
                FROM claimable AS c
                WHERE m.id = c.id
                RETURNING m.id, m.event_id, m.event_type, m.payload, m.created_at,
                          m.processed_at, m.correlation_id, m.trace_id, m.retry_count,
                          m.last_error
            )
            SELECT id, event_id, event_type, payload, created_at, processed_at,
                   correlation_id, trace_id, retry_count, last_error
            FROM claimed
            ORDER BY id
            "#,
        )
        .bind(lease_duration.as_secs_f64())
        .bind(claimant)
        .bind(max_retry_attempts as i32)
        .bind(batch_size as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_processed(&self, id: MessageId) -> crate::Result<()> {
        sqlx::query(
            r#"
            UPDATE outpost.outbox_messages
            SET processed_at = now(),
                leased_by = NULL,
                lease_until = NULL
            WHERE id = $1
            "#,
        )
        .bind(id.into_inner())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_failure(&self, id: MessageId, error: &str) -> crate::Result<()> {
        sqlx::query(
            r#"
            UPDATE outpost.outbox_messages
            SET retry_count = retry_count + 1,
                last_error = $2,
                leased_by = NULL,
                lease_until = NULL
            WHERE id = $1
            "#,
        )
        .bind(id.into_inner())
        .bind(truncate_error(error))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn quarantine(
        &self,
        id: MessageId,
        error: &str,
        max_retry_attempts: u32,
    ) -> crate::Result<()> {
        sqlx::query(
            r#"
            UPDATE outpost.outbox_messages
            SET retry_count = $3,
                last_error = $2,
                leased_by = NULL,
                lease_until = NULL
            WHERE id = $1
            "#,
        )
        .bind(id.into_inner())
        .bind(truncate_error(error))
        .bind(max_retry_attempts as i32)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn fetch_dead_letters(
        &self,
        query: &DeadLetterQuery,
        max_retry_attempts: u32,
    ) -> crate::Result<Vec<OutboxMessage>> {
        let limit = query.limit.unwrap_or(DEFAULT_DEAD_LETTER_LIMIT);
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, event_id, event_type, payload, created_at, processed_at,
                   correlation_id, trace_id, retry_count, last_error
            FROM outpost.outbox_messages
            WHERE processed_at IS NULL
              AND retry_count >= $1
              AND ($2::text IS NULL OR event_type = $2)
              AND ($3::text IS NULL OR correlation_id = $3)
            ORDER BY id
            LIMIT $4
            "#,
        )
        .bind(max_retry_attempts as i32)
        .bind(query.event_type.as_deref())
        .bind(query.correlation_id.as_deref())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_dead_letters(
        &self,
        query: &DeadLetterQuery,
        max_retry_attempts: u32,
    ) -> crate::Result<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT count(*)
            FROM outpost.outbox_messages
            WHERE processed_at IS NULL
              AND retry_count >= $1
              AND ($2::text IS NULL OR event_type = $2)
              AND ($3::text IS NULL OR correlation_id = $3)
            "#,
        )
        .bind(max_retry_attempts as i32)
        .bind(query.event_type.as_deref())
        .bind(query.correlation_id.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(count as u64)
    }

    async fn retry_dead_letter(&self, id: MessageId) -> crate::Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE outpost.outbox_messages
            SET retry_count = 0,
                last_error = NULL,
                leased_by = NULL,
                lease_until = NULL
            WHERE id = $1
              AND processed_at IS NULL
            "#,
        )
        .bind(id.into_inner())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
