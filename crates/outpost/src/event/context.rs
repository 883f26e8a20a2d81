use time::OffsetDateTime;
use uuid::Uuid;

/// Message metadata handed to a handler alongside the decoded event.
///
/// Delivery is at-least-once, so the same event can reach a handler more
/// than once. The context carries everything a consumer needs to deduplicate
/// ([`event_id`](Self::event_id) or [`idempotency_key`](Self::idempotency_key))
/// and to stitch the delivery into upstream telemetry
/// ([`correlation_id`](Self::correlation_id), [`trace_id`](Self::trace_id)).
#[derive(Debug, Clone)]
pub struct DeliveryContext {
    /// Idempotency key, stable across redeliveries of the same message.
    pub event_id: Uuid,
    /// The routing type string the message was stored with.
    pub event_type: String,
    /// Which delivery attempt this is, starting at 1.
    pub attempt: u32,
    /// When the message was captured.
    pub created_at: OffsetDateTime,
    /// Correlation id attached by the producer, if any.
    pub correlation_id: Option<String>,
    /// Trace id attached by the producer, if any.
    pub trace_id: Option<String>,
}

impl DeliveryContext {
    pub(crate) fn new(
        event_id: Uuid,
        event_type: impl Into<String>,
        attempt: u32,
        created_at: OffsetDateTime,
        correlation_id: Option<String>,
        trace_id: Option<String>,
    ) -> Self {
        Self {
            event_id,
            event_type: event_type.into(),
            attempt,
            created_at,
            correlation_id,
            trace_id,
        }
    }

    /// A string key combining event type and event id.
    ///
    /// Convenient for handlers that record processed deliveries in a single
    /// unique column.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.event_type, self.event_id)
    }

    /// Returns `true` when an earlier delivery attempt failed.
    pub fn is_retry(&self) -> bool {
        self.attempt > 1
    }
}
