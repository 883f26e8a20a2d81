//! Events and the handlers that deliver them.
//!
//! Producers describe what happened as a type implementing [`OutboxEvent`];
//! consumers receive it through an [`EventHandler`] registered for the
//! event's type string. The [`DeliveryContext`] carries the message metadata
//! a handler needs for idempotent processing.

mod context;
mod handler;

pub use context::DeliveryContext;
pub use handler::EventHandler;

use serde::de::DeserializeOwned;
use serde::Serialize;

/// A domain event that can be captured in the outbox.
///
/// The associated `EVENT_TYPE` is the routing key: drafts built with
/// [`MessageDraft::encode`](crate::MessageDraft::encode) store it, and the
/// processor uses it to pick the registered handler.
///
/// # Example
///
/// ```
/// use outpost::OutboxEvent;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct WorkoutCompleted {
///     workout_id: u64,
///     duration_seconds: u32,
/// }
///
/// impl OutboxEvent for WorkoutCompleted {
///     const EVENT_TYPE: &'static str = "workout.completed";
/// }
/// ```
pub trait OutboxEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable type string stored with every message of this event.
    ///
    /// Renaming it strands already-stored messages, which will dead-letter
    /// as unroutable. Treat it like a wire format.
    const EVENT_TYPE: &'static str;
}
