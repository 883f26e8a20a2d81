use std::sync::Arc;

use crate::event::DeliveryContext;
use crate::message::OutboxMessage;
use crate::processor::registry::HandlerRegistry;

/// What happened when a message was handed to its handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The handler accepted the event. The message is done.
    Delivered,
    /// The handler failed in a way that may heal, such as a network error.
    /// The message stays pending and is retried next cycle.
    TransientFailure(String),
    /// The message can never be delivered: no handler is registered for its
    /// type, or the payload does not decode. It is parked immediately.
    PermanentFailure(String),
}

/// Routes claimed messages to their registered handlers.
///
/// Obtained from [`Processor::dispatcher`](crate::Processor::dispatcher);
/// useful for driving a delivery by hand in tests or one-off tools. Cloning
/// is cheap and shares the handler table.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    pub(crate) fn new(registry: HandlerRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Deliver one message to the handler registered for its event type.
    ///
    /// This only invokes the handler and classifies the result; recording
    /// the outcome against the store is the caller's job.
    pub async fn deliver(&self, message: &OutboxMessage) -> DeliveryOutcome {
        let ctx = DeliveryContext::new(
            message.event_id,
            message.event_type.clone(),
            message.retry_count + 1,
            message.created_at,
            message.correlation_id.clone(),
            message.trace_id.clone(),
        );

        match self.registry.get(&message.event_type) {
            Some(entry) => entry.deliver(message.payload.clone(), &ctx).await,
            None => DeliveryOutcome::PermanentFailure(format!(
                "no handler registered for event type `{}`",
                message.event_type
            )),
        }
    }
}
