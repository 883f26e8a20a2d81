use async_trait::async_trait;

use super::{DeliveryContext, OutboxEvent};

/// Delivers one kind of event to its consumer.
///
/// Register a handler with
/// [`ProcessorBuilder::register`](crate::ProcessorBuilder::register); the
/// processor routes each claimed message to the handler whose
/// [`OutboxEvent::EVENT_TYPE`] matches the message's type string.
///
/// Returning `Ok(())` marks the message processed. Returning an error leaves
/// it pending for another attempt; once the retry ceiling is reached the
/// message is parked for operator review instead. Handlers must therefore
/// tolerate redelivery, typically by deduplicating on
/// [`DeliveryContext::event_id`].
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use outpost::{DeliveryContext, EventHandler};
///
/// struct PushNotifier {
///     client: NotificationClient,
/// }
///
/// #[async_trait]
/// impl EventHandler for PushNotifier {
///     type Event = WorkoutCompleted;
///     type Error = NotifyError;
///
///     async fn handle(
///         &self,
///         event: &Self::Event,
///         ctx: &DeliveryContext,
///     ) -> Result<(), Self::Error> {
///         self.client
///             .push(ctx.event_id, event.workout_id, event.duration_seconds)
///             .await
///     }
/// }
/// ```
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// The event this handler consumes.
    type Event: OutboxEvent;

    /// Error produced when delivery fails. The display form is recorded on
    /// the message as its failure reason.
    type Error: std::fmt::Display + Send + 'static;

    /// Deliver one event. Called once per claim of a matching message.
    async fn handle(&self, event: &Self::Event, ctx: &DeliveryContext)
        -> Result<(), Self::Error>;
}
