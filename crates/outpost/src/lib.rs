//! Transactional outbox for reliable event delivery.
//!
//! A service that commits a change to its own database and then notifies
//! other systems has a dual-write problem: the change can commit while the
//! notification is lost, or the notification can go out for a change that
//! rolled back. This crate removes the second write. Producers append events
//! to an outbox table inside the same transaction as the business change,
//! and a background [`Processor`] relays them afterwards:
//!
//! ```text
//! producer transaction                processor, every poll_interval
//!
//! business writes                     claim pending batch under a lease
//! writer.append(draft)        ...     route each message to its handler
//! writer.commit()                     record delivered / retry / parked
//! ```
//!
//! Delivery is at-least-once: a message is marked processed only after its
//! handler succeeds, so a crash in between redelivers it once the claim
//! lease expires. Handlers deduplicate on the stable
//! [`DeliveryContext::event_id`]. A message that keeps failing is parked
//! after `max_retry_attempts` and stays in the table for operator
//! inspection via [`Processor::dead_letters`].
//!
//! # Example
//!
//! ```ignore
//! use outpost::{MessageDraft, OutboxStore, OutboxWriter, PgStore, Processor};
//!
//! // Capture, inside the business transaction.
//! let store = PgStore::new(pool);
//! let mut writer = store.begin().await?;
//! sqlx::query("UPDATE workouts SET completed_at = now() WHERE id = $1")
//!     .bind(workout_id)
//!     .execute(writer.connection())
//!     .await?;
//! writer
//!     .append(MessageDraft::encode(&WorkoutCompleted { workout_id })?)
//!     .await?;
//! writer.commit().await?;
//!
//! // Relay, one background task per process.
//! let processor = Processor::builder(store)
//!     .register(PushNotifier::new(push_client))
//!     .register(LeaderboardUpdater::new(scores))
//!     .build()?;
//! processor.run(shutdown_signal()).await?;
//! ```
//!
//! # Feature flags
//!
//! - `postgres`: enables `PgStore`, the production backend. Off by default.
//!   [`MemoryStore`] is always available and backs tests and local runs.
//!
//! Design notes and the reasoning behind the claiming protocol live in
//! `DESIGN.md` at the repository root.

mod error;
pub mod event;
mod message;
pub mod processor;
pub mod store;

pub use error::{Error, Result};
pub use event::{DeliveryContext, EventHandler, OutboxEvent};
pub use message::{MessageDraft, MessageId, OutboxMessage};
pub use processor::{
    ConfigError, CycleStats, DeliveryOutcome, Dispatcher, Processor, ProcessorBuilder,
    ProcessorConfig,
};
pub use store::{ClaimStore, DeadLetterQuery, MemoryStore, MemoryWriter, OutboxStore, OutboxWriter};
#[cfg(feature = "postgres")]
pub use store::{PgOutboxWriter, PgStore};
