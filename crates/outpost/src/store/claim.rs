use std::future::Future;
use std::time::Duration;

use crate::message::{MessageId, OutboxMessage};

/// The processor-side storage contract: claim pending messages and record
/// what happened to them.
///
/// # Claiming protocol
///
/// [`claim_batch`](Self::claim_batch) stamps a lease (`leased_by`,
/// `lease_until`) on each row it returns. While the lease holds, no other
/// claimant sees those rows, so two processors sharing a store never deliver
/// the same message concurrently. Leases are cleared when an outcome is
/// recorded; if a processor dies mid-delivery the lease simply expires and
/// the message becomes claimable again. That hand-off is what makes delivery
/// at-least-once rather than exactly-once.
///
/// A message leaves the claimable set in exactly two ways: delivery succeeds
/// ([`mark_processed`](Self::mark_processed) sets `processed_at`), or its
/// `retry_count` reaches the configured ceiling and claims skip it. Parked
/// messages are never deleted; operators inspect them with
/// [`fetch_dead_letters`](Self::fetch_dead_letters) and revive them with
/// [`retry_dead_letter`](Self::retry_dead_letter).
pub trait ClaimStore: Send + Sync + Clone + 'static {
    /// Claim up to `batch_size` pending messages for exclusive delivery.
    ///
    /// Eligible rows are unprocessed, below `max_retry_attempts`, and not
    /// under a live lease. Returned in ascending id order, which is creation
    /// order.
    fn claim_batch(
        &self,
        claimant: &str,
        lease_duration: Duration,
        max_retry_attempts: u32,
        batch_size: u32,
    ) -> impl Future<Output = crate::Result<Vec<OutboxMessage>>> + Send;

    /// Record successful delivery: set `processed_at` and clear the lease.
    fn mark_processed(&self, id: MessageId) -> impl Future<Output = crate::Result<()>> + Send;

    /// Record a failed attempt: increment `retry_count`, store the failure
    /// reason, and clear the lease so the next cycle can reclaim the row.
    fn record_failure(
        &self,
        id: MessageId,
        error: &str,
    ) -> impl Future<Output = crate::Result<()>> + Send;

    /// Park a message immediately by raising `retry_count` to the ceiling.
    ///
    /// Used for failures no retry can fix, such as a payload that does not
    /// decode or a type string with no registered handler.
    fn quarantine(
        &self,
        id: MessageId,
        error: &str,
        max_retry_attempts: u32,
    ) -> impl Future<Output = crate::Result<()>> + Send;

    /// Fetch parked messages for operator inspection, ascending by id.
    fn fetch_dead_letters(
        &self,
        query: &DeadLetterQuery,
        max_retry_attempts: u32,
    ) -> impl Future<Output = crate::Result<Vec<OutboxMessage>>> + Send;

    /// Count parked messages matching `query`.
    fn count_dead_letters(
        &self,
        query: &DeadLetterQuery,
        max_retry_attempts: u32,
    ) -> impl Future<Output = crate::Result<u64>> + Send;

    /// Put a parked message back in line by resetting its `retry_count` to
    /// zero. Returns `false` if the message does not exist or was already
    /// processed.
    fn retry_dead_letter(
        &self,
        id: MessageId,
    ) -> impl Future<Output = crate::Result<bool>> + Send;
}

/// Fallback for [`DeadLetterQuery::limit`].
pub(crate) const DEFAULT_DEAD_LETTER_LIMIT: u32 = 100;

/// Filters for dead-letter inspection.
///
/// An empty query matches every parked message. `limit` defaults to 100
/// when unset.
///
/// # Example
///
/// ```
/// use outpost::DeadLetterQuery;
///
/// let query = DeadLetterQuery::default()
///     .event_type("workout.completed")
///     .limit(20);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeadLetterQuery {
    /// Only messages with this type string.
    pub event_type: Option<String>,
    /// Only messages carrying this correlation id.
    pub correlation_id: Option<String>,
    /// Maximum number of messages to return.
    pub limit: Option<u32>,
}

impl DeadLetterQuery {
    /// Restrict to one event type.
    pub fn event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    /// Restrict to one correlation id.
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Cap the number of returned messages.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}
