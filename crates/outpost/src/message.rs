//! The outbox message data model.

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::event::OutboxEvent;

/// Maximum stored length of `last_error`, in bytes.
///
/// Failure reasons come from arbitrary handler errors and are truncated
/// before storage to bound row growth.
pub(crate) const LAST_ERROR_MAX_LEN: usize = 1024;

/// Truncate a failure reason to [`LAST_ERROR_MAX_LEN`] bytes.
///
/// Truncation backs up to the nearest char boundary so the result is
/// always valid UTF-8.
pub(crate) fn truncate_error(error: &str) -> String {
    if error.len() <= LAST_ERROR_MAX_LEN {
        return error.to_owned();
    }
    let mut end = LAST_ERROR_MAX_LEN;
    while !error.is_char_boundary(end) {
        end -= 1;
    }
    error[..end].to_owned()
}

/// Identifier of a stored outbox message.
///
/// Ids are assigned by the store in strict creation order (`BIGSERIAL` in
/// PostgreSQL, a counter in the in-memory store), so comparing two ids
/// compares creation order.
///
/// # Example
///
/// ```
/// use outpost::MessageId;
///
/// let id = MessageId::new(42);
/// assert_eq!(id.into_inner(), 42);
/// assert_eq!(format!("{}", id), "42");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MessageId(i64);

impl MessageId {
    /// Create a message id from its raw storage value.
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Consume the wrapper and return the raw storage value.
    pub fn into_inner(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// A stored outbox message awaiting (or having completed) delivery.
///
/// Written once by a producer inside its own transaction; afterwards only
/// the delivery bookkeeping fields (`processed_at`, `retry_count`,
/// `last_error`) change, and only through the
/// [`ClaimStore`](crate::ClaimStore) operations.
///
/// A message is *pending* while `processed_at` is unset and *delivered* once
/// it is set. There is no third state: a message whose `retry_count` reached
/// the configured ceiling simply stops being claimed and stays visible for
/// operator inspection.
#[derive(Debug, Clone)]
pub struct OutboxMessage {
    /// Storage-assigned id; strict creation order.
    pub id: MessageId,
    /// Idempotency key seen by consumers. Minted when the draft is built,
    /// stable across redeliveries.
    pub event_id: Uuid,
    /// Discriminator used to route the message to a registered handler.
    pub event_type: String,
    /// Event data as JSON. Schema is owned by the producer and opaque here.
    pub payload: Value,
    /// When the message was written.
    pub created_at: OffsetDateTime,
    /// Set exactly once, when delivery succeeds.
    pub processed_at: Option<OffsetDateTime>,
    /// Cross-service correlation key, passed through unmodified.
    pub correlation_id: Option<String>,
    /// Distributed-tracing key, passed through unmodified.
    pub trace_id: Option<String>,
    /// Number of failed delivery attempts so far.
    pub retry_count: u32,
    /// Most recent failure reason, truncated to 1024 bytes.
    pub last_error: Option<String>,
}

impl OutboxMessage {
    /// Returns `true` once delivery has succeeded.
    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }
}

/// A message waiting to be appended through an
/// [`OutboxWriter`](crate::OutboxWriter).
///
/// The draft mints the message's `event_id` at construction, so the
/// idempotency key already exists before the row is written.
///
/// # Example
///
/// ```
/// use outpost::MessageDraft;
/// use serde_json::json;
///
/// let draft = MessageDraft::new("workout.completed", json!({ "workout_id": 7 }))
///     .with_correlation_id("session-41");
///
/// assert_eq!(draft.event_type(), "workout.completed");
/// assert_eq!(draft.correlation_id(), Some("session-41"));
/// ```
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub(crate) event_id: Uuid,
    pub(crate) event_type: String,
    pub(crate) payload: Value,
    pub(crate) correlation_id: Option<String>,
    pub(crate) trace_id: Option<String>,
}

impl MessageDraft {
    /// Create a draft from a raw event type and payload.
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            event_type: event_type.into(),
            payload,
            correlation_id: None,
            trace_id: None,
        }
    }

    /// Create a draft from a typed event.
    ///
    /// The event type comes from [`OutboxEvent::EVENT_TYPE`] and the payload
    /// from serializing the event.
    pub fn encode<E: OutboxEvent>(event: &E) -> crate::Result<Self> {
        let payload = serde_json::to_value(event)?;
        Ok(Self::new(E::EVENT_TYPE, payload))
    }

    /// Attach a correlation id, passed through to consumers unmodified.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Attach a trace id, passed through to consumers unmodified.
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    /// The idempotency key this draft will carry.
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    /// The handler-routing discriminator.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// The event data.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// The correlation id, if attached.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// The trace id, if attached.
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }
}
