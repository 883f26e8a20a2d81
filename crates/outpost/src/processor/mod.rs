//! The background processor that relays captured messages to handlers.
//!
//! Each polling cycle claims a batch of pending messages under a lease,
//! routes every message to the handler registered for its event type, and
//! writes one outcome per message back to the store:
//!
//! - delivered messages are marked processed and never claimed again;
//! - transient failures bump `retry_count` and wait for the next cycle;
//! - permanent failures (unroutable type, undecodable payload) and messages
//!   that exhaust their retry budget are parked for operator review.
//!
//! Delivery is at-least-once: a crash after the handler ran but before the
//! outcome was recorded redelivers the message when its lease expires.
//! Handlers deduplicate on [`DeliveryContext::event_id`](crate::DeliveryContext::event_id).

mod config;
mod dispatcher;
mod registry;
mod worker;

pub use config::{ConfigError, ProcessorConfig};
pub use dispatcher::{DeliveryOutcome, Dispatcher};
pub use registry::{Processor, ProcessorBuilder};
pub use worker::CycleStats;
