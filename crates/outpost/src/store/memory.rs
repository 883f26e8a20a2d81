use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::message::{truncate_error, MessageDraft, MessageId, OutboxMessage};
use crate::store::claim::{ClaimStore, DeadLetterQuery, DEFAULT_DEAD_LETTER_LIMIT};
use crate::store::{OutboxStore, OutboxWriter};

/// In-memory outbox backend.
///
/// Backs tests and single-process local runs with the same semantics as the
/// PostgreSQL store: ids ascend in append order, commits are atomic, and
/// claims stamp leases. Clones share state.
///
/// # Example
///
/// ```
/// use outpost::{MemoryStore, MessageDraft, OutboxStore, OutboxWriter};
/// use serde_json::json;
///
/// # async fn demo() -> outpost::Result<()> {
/// let store = MemoryStore::new();
///
/// let mut writer = store.begin().await?;
/// writer.append(MessageDraft::new("workout.completed", json!({ "workout_id": 7 }))).await?;
/// writer.commit().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    rows: BTreeMap<i64, StoredMessage>,
}

#[derive(Debug)]
struct StoredMessage {
    message: OutboxMessage,
    leased_by: Option<String>,
    lease_until: Option<OffsetDateTime>,
}

impl StoredMessage {
    fn claimable(&self, now: OffsetDateTime, max_retry_attempts: u32) -> bool {
        self.message.processed_at.is_none()
            && self.message.retry_count < max_retry_attempts
            && self.lease_until.is_none_or(|until| until < now)
    }

    fn clear_lease(&mut self) {
        self.leased_by = None;
        self.lease_until = None;
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up one message by id. Test and inspection helper.
    pub async fn message(&self, id: MessageId) -> Option<OutboxMessage> {
        let state = self.state.lock().await;
        state.rows.get(&id.into_inner()).map(|row| row.message.clone())
    }

    /// Who currently holds the lease on a message, if anyone.
    pub async fn lease_holder(&self, id: MessageId) -> Option<String> {
        let state = self.state.lock().await;
        state
            .rows
            .get(&id.into_inner())
            .and_then(|row| row.leased_by.clone())
    }

    /// Snapshot every stored message in id order. Test and inspection helper.
    pub async fn messages(&self) -> Vec<OutboxMessage> {
        let state = self.state.lock().await;
        state.rows.values().map(|row| row.message.clone()).collect()
    }
}

impl OutboxStore for MemoryStore {
    type Writer<'a>
        = MemoryWriter
    where
        Self: 'a;

    async fn begin(&self) -> crate::Result<Self::Writer<'_>> {
        Ok(MemoryWriter {
            state: Arc::clone(&self.state),
            staged: Vec::new(),
        })
    }
}

/// Writer for [`MemoryStore`].
///
/// Appends assign ids immediately (so interleaved writers get interleaved
/// ids, and a dropped writer leaves an id gap, matching `BIGSERIAL`), but
/// staged messages only become visible on commit.
#[derive(Debug)]
pub struct MemoryWriter {
    state: Arc<Mutex<State>>,
    staged: Vec<OutboxMessage>,
}

impl OutboxWriter for MemoryWriter {
    async fn append(&mut self, draft: MessageDraft) -> crate::Result<OutboxMessage> {
        let mut state = self.state.lock().await;
        state.next_id += 1;

        let message = OutboxMessage {
            id: MessageId::new(state.next_id),
            event_id: draft.event_id,
            event_type: draft.event_type,
            payload: draft.payload,
            created_at: OffsetDateTime::now_utc(),
            processed_at: None,
            correlation_id: draft.correlation_id,
            trace_id: draft.trace_id,
            retry_count: 0,
            last_error: None,
        };
        self.staged.push(message.clone());

        Ok(message)
    }

    async fn commit(self) -> crate::Result<()> {
        let mut state = self.state.lock().await;
        for message in self.staged {
            let id = message.id.into_inner();
            state.rows.insert(
                id,
                StoredMessage {
                    message,
                    leased_by: None,
                    lease_until: None,
                },
            );
        }
        Ok(())
    }
}

impl ClaimStore for MemoryStore {
    async fn claim_batch(
        &self,
        claimant: &str,
        lease_duration: Duration,
        max_retry_attempts: u32,
        batch_size: u32,
    ) -> crate::Result<Vec<OutboxMessage>> {
        let now = OffsetDateTime::now_utc();
        let mut state = self.state.lock().await;

        let mut claimed = Vec::new();
        // BTreeMap iterates in id order, preserving creation order.
        for row in state.rows.values_mut() {
            if claimed.len() >= batch_size as usize {
                break;
            }
            if !row.claimable(now, max_retry_attempts) {
                continue;
            }
            row.leased_by = Some(claimant.to_owned());
            row.lease_until = Some(now + lease_duration);
            claimed.push(row.message.clone());
        }

        Ok(claimed)
    }

    async fn mark_processed(&self, id: MessageId) -> crate::Result<()> {
        let mut state = self.state.lock().await;
        if let Some(row) = state.rows.get_mut(&id.into_inner()) {
            row.message.processed_at = Some(OffsetDateTime::now_utc());
            row.clear_lease();
        }
        Ok(())
    }

    async fn record_failure(&self, id: MessageId, error: &str) -> crate::Result<()> {
        let mut state = self.state.lock().await;
        if let Some(row) = state.rows.get_mut(&id.into_inner()) {
            row.message.retry_count += 1;
            row.message.last_error = Some(truncate_error(error));
            row.clear_lease();
        }
        Ok(())
    }

    async fn quarantine(
        &self,
        id: MessageId,
        error: &str,
        max_retry_attempts: u32,
    ) -> crate::Result<()> {
        let mut state = self.state.lock().await;
        if let Some(row) = state.rows.get_mut(&id.into_inner()) {
            row.message.retry_count = max_retry_attempts;
            row.message.last_error = Some(truncate_error(error));
            row.clear_lease();
        }
        Ok(())
    }

    async fn fetch_dead_letters(
        &self,
        query: &DeadLetterQuery,
        max_retry_attempts: u32,
    ) -> crate::Result<Vec<OutboxMessage>> {
        let limit = query.limit.unwrap_or(DEFAULT_DEAD_LETTER_LIMIT) as usize;
        let state = self.state.lock().await;

        Ok(state
            .rows
            .values()
            .filter(|row| dead_letter_matches(&row.message, query, max_retry_attempts))
            .take(limit)
            .map(|row| row.message.clone())
            .collect())
    }

    async fn count_dead_letters(
        &self,
        query: &DeadLetterQuery,
        max_retry_attempts: u32,
    ) -> crate::Result<u64> {
        let state = self.state.lock().await;

        Ok(state
            .rows
            .values()
            .filter(|row| dead_letter_matches(&row.message, query, max_retry_attempts))
            .count() as u64)
    }

    async fn retry_dead_letter(&self, id: MessageId) -> crate::Result<bool> {
        let mut state = self.state.lock().await;
        match state.rows.get_mut(&id.into_inner()) {
            Some(row) if row.message.processed_at.is_none() => {
                row.message.retry_count = 0;
                row.message.last_error = None;
                row.clear_lease();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

fn dead_letter_matches(
    message: &OutboxMessage,
    query: &DeadLetterQuery,
    max_retry_attempts: u32,
) -> bool {
    message.processed_at.is_none()
        && message.retry_count >= max_retry_attempts
        && query
            .event_type
            .as_deref()
            .is_none_or(|t| message.event_type == t)
        && query
            .correlation_id
            .as_deref()
            .is_none_or(|c| message.correlation_id.as_deref() == Some(c))
}
