use std::collections::HashMap;
use std::future::Future;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::event::{DeliveryContext, EventHandler, OutboxEvent};
use crate::message::{MessageId, OutboxMessage};
use crate::processor::config::ProcessorConfig;
use crate::processor::dispatcher::{DeliveryOutcome, Dispatcher};
use crate::processor::worker::{CycleStats, PollWorker};
use crate::store::{ClaimStore, DeadLetterQuery};
use crate::Error;

/// Object-safe adapter over a typed [`EventHandler`].
///
/// Decodes the stored payload into the handler's event type before invoking
/// it, turning decode failures into permanent outcomes since redelivering
/// the same bytes can never succeed.
#[async_trait]
pub(crate) trait HandlerEntry: Send + Sync {
    async fn deliver(&self, payload: Value, ctx: &DeliveryContext) -> DeliveryOutcome;
}

struct TypedHandlerEntry<H> {
    handler: H,
}

#[async_trait]
impl<H: EventHandler> HandlerEntry for TypedHandlerEntry<H> {
    async fn deliver(&self, payload: Value, ctx: &DeliveryContext) -> DeliveryOutcome {
        let event: H::Event = match serde_json::from_value(payload) {
            Ok(event) => event,
            Err(error) => {
                return DeliveryOutcome::PermanentFailure(format!(
                    "payload does not decode as `{}`: {error}",
                    H::Event::EVENT_TYPE
                ));
            }
        };

        match self.handler.handle(&event, ctx).await {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(error) => DeliveryOutcome::TransientFailure(error.to_string()),
        }
    }
}

/// Handler table keyed by event type string.
pub(crate) struct HandlerRegistry {
    entries: HashMap<&'static str, Box<dyn HandlerEntry>>,
}

impl HandlerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Insert a handler under its event's type string. Returns `false` when
    /// that type already has a handler, leaving the existing one in place.
    pub(crate) fn register<H: EventHandler>(&mut self, handler: H) -> bool {
        if self.entries.contains_key(H::Event::EVENT_TYPE) {
            return false;
        }
        self.entries
            .insert(H::Event::EVENT_TYPE, Box::new(TypedHandlerEntry { handler }));
        true
    }

    pub(crate) fn get(&self, event_type: &str) -> Option<&dyn HandlerEntry> {
        self.entries.get(event_type).map(Box::as_ref)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Builds a [`Processor`].
///
/// Registration problems are deferred to [`build`](Self::build) so the
/// builder chain stays fluent.
pub struct ProcessorBuilder<S> {
    store: S,
    registry: HandlerRegistry,
    duplicate_event_type: Option<String>,
    config: ProcessorConfig,
}

impl<S: ClaimStore> ProcessorBuilder<S> {
    fn new(store: S) -> Self {
        Self {
            store,
            registry: HandlerRegistry::new(),
            duplicate_event_type: None,
            config: ProcessorConfig::default(),
        }
    }

    /// Register a handler for its event's type string.
    ///
    /// Each event type takes exactly one handler; registering a second one
    /// makes [`build`](Self::build) fail with [`Error::DuplicateHandler`].
    pub fn register<H: EventHandler>(mut self, handler: H) -> Self {
        if !self.registry.register(handler) && self.duplicate_event_type.is_none() {
            self.duplicate_event_type = Some(H::Event::EVENT_TYPE.to_owned());
        }
        self
    }

    /// Replace the default [`ProcessorConfig`].
    pub fn config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration and registrations and assemble the
    /// processor.
    pub fn build(self) -> crate::Result<Processor<S>> {
        if let Some(event_type) = self.duplicate_event_type {
            return Err(Error::DuplicateHandler(event_type));
        }
        self.config.validate()?;

        let instance_id = self
            .config
            .instance_id
            .clone()
            .unwrap_or_else(|| format!("outbox-{}", Uuid::new_v4()));
        let dispatcher = Dispatcher::new(self.registry);
        let worker = PollWorker::new(
            self.store.clone(),
            dispatcher,
            self.config.clone(),
            instance_id,
        );

        Ok(Processor {
            worker,
            store: self.store,
            config: self.config,
        })
    }
}

/// Polls the store and relays captured events to their handlers.
///
/// One processor instance runs one polling loop. Multiple instances may
/// share a store; leases keep their claims disjoint, so adding instances
/// scales delivery horizontally.
///
/// # Example
///
/// ```ignore
/// use outpost::{PgStore, Processor, ProcessorConfig};
///
/// let processor = Processor::builder(PgStore::new(pool))
///     .register(PushNotifier::new(client))
///     .register(LeaderboardUpdater::new(scores))
///     .build()?;
///
/// processor.run(shutdown_signal()).await?;
/// ```
pub struct Processor<S: ClaimStore> {
    worker: PollWorker<S>,
    store: S,
    config: ProcessorConfig,
}

impl<S: ClaimStore> Processor<S> {
    /// Start building a processor over `store`.
    pub fn builder(store: S) -> ProcessorBuilder<S> {
        ProcessorBuilder::new(store)
    }

    /// The validated configuration this processor runs with.
    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// The claimant name this processor stamps on leases.
    pub fn instance_id(&self) -> &str {
        self.worker.instance_id()
    }

    /// A dispatcher sharing this processor's handler table, for driving
    /// deliveries by hand.
    pub fn dispatcher(&self) -> Dispatcher {
        self.worker.dispatcher().clone()
    }

    /// Run a single claim-deliver-record cycle and report what it did.
    ///
    /// [`run`](Self::run) calls this on every poll tick; tests and cron-style
    /// deployments can call it directly.
    pub async fn run_cycle(&self) -> crate::Result<CycleStats> {
        self.worker.run_cycle().await
    }

    /// Run the polling loop until `shutdown` resolves.
    ///
    /// The first cycle starts immediately; later cycles follow
    /// [`ProcessorConfig::poll_interval`]. An in-flight cycle is allowed to
    /// finish before the loop exits, up to
    /// [`ProcessorConfig::shutdown_timeout`]. Cycle errors are logged and the
    /// loop keeps going; this future only resolves through shutdown.
    pub async fn run<F>(self, shutdown: F) -> crate::Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Self { worker, config, .. } = self;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            instance_id = %worker.instance_id(),
            poll_interval = ?config.poll_interval,
            "outbox processor started"
        );
        let handle = tokio::spawn(worker.run(shutdown_rx));

        shutdown.await;
        info!("shutdown signalled, draining in-flight cycle");
        let _ = shutdown_tx.send(true);

        match tokio::time::timeout(config.shutdown_timeout, handle).await {
            Ok(Ok(())) => info!("outbox processor stopped"),
            Ok(Err(join_error)) => error!(error = %join_error, "outbox processor task panicked"),
            Err(_) => warn!(
                timeout = ?config.shutdown_timeout,
                "outbox processor did not stop within the shutdown timeout"
            ),
        }

        Ok(())
    }

    /// Fetch parked messages for operator inspection.
    pub async fn dead_letters(
        &self,
        query: &DeadLetterQuery,
    ) -> crate::Result<Vec<OutboxMessage>> {
        self.store
            .fetch_dead_letters(query, self.config.max_retry_attempts)
            .await
    }

    /// Count parked messages matching `query`.
    pub async fn count_dead_letters(&self, query: &DeadLetterQuery) -> crate::Result<u64> {
        self.store
            .count_dead_letters(query, self.config.max_retry_attempts)
            .await
    }

    /// Put a parked message back in line for delivery.
    pub async fn retry_dead_letter(&self, id: MessageId) -> crate::Result<bool> {
        self.store.retry_dead_letter(id).await
    }
}
