//! Storage backends for the outbox.
//!
//! The write side is split from the delivery side:
//!
//! - [`OutboxStore`] / [`OutboxWriter`] cover the producer path: appending
//!   messages atomically with the business change that caused them.
//! - [`ClaimStore`] covers the processor path: claiming pending messages
//!   under a lease and recording delivery outcomes.
//!
//! [`MemoryStore`] implements both and backs tests and local runs.
//! `PgStore` (behind the `postgres` feature) is the production backend.

mod claim;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use claim::{ClaimStore, DeadLetterQuery};
pub use memory::{MemoryStore, MemoryWriter};
#[cfg(feature = "postgres")]
pub use postgres::{PgOutboxWriter, PgStore};

use std::future::Future;

use crate::message::{MessageDraft, OutboxMessage};

/// The producer-side entry point: hands out transactional writers.
///
/// Implementations are cheap handles over shared state (a connection pool,
/// an `Arc`), cloned freely into whatever task captures events.
pub trait OutboxStore: Send + Sync + Clone + 'static {
    /// Transactional writer tied to this store.
    type Writer<'a>: OutboxWriter + Send
    where
        Self: 'a;

    /// Begin a transaction for appending messages.
    fn begin(&self) -> impl Future<Output = crate::Result<Self::Writer<'_>>> + Send;
}

/// Appends messages inside one transaction.
///
/// Everything appended becomes visible to the processor atomically on
/// [`commit`](Self::commit); dropping the writer without committing discards
/// all of it. Backends that expose the underlying transaction (see
/// `PgOutboxWriter::connection`) let the producer put its own writes in the
/// same transaction, so the business change and its events land or vanish
/// together.
pub trait OutboxWriter: Send {
    /// Stage one message. Returns the stored form with its assigned id.
    fn append(
        &mut self,
        draft: MessageDraft,
    ) -> impl Future<Output = crate::Result<OutboxMessage>> + Send;

    /// Commit the transaction, making all appended messages visible.
    fn commit(self) -> impl Future<Output = crate::Result<()>> + Send;
}
