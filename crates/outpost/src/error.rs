//! Error types for outpost.

use thiserror::Error;

use crate::processor::ConfigError;

/// A `Result` alias with [`enum@Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in outpost operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to serialize a typed event into a message payload.
    ///
    /// Raised on the producer side by [`MessageDraft::encode`](crate::MessageDraft::encode);
    /// it propagates to the caller and aborts the enclosing unit of work.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Processor configuration rejected at build time.
    ///
    /// Configuration problems are always surfaced from
    /// [`ProcessorBuilder::build`](crate::ProcessorBuilder::build), never
    /// from a running poll loop.
    #[error("invalid processor configuration: {0}")]
    Config(#[from] ConfigError),

    /// An event type was registered more than once.
    #[error("duplicate handler registration for event type: {0}")]
    DuplicateHandler(String),

    /// Backend-agnostic storage failure.
    ///
    /// The bundled stores do not produce this variant; it exists for custom
    /// [`ClaimStore`](crate::ClaimStore) and [`OutboxStore`](crate::OutboxStore)
    /// implementations outside this crate.
    #[error("storage error: {0}")]
    Storage(String),

    /// PostgreSQL storage error.
    ///
    /// Preserves the full `sqlx::Error` for matching on specific database
    /// error conditions (connection timeout, constraint violation, etc.).
    #[cfg(feature = "postgres")]
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),
}
