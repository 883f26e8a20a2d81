use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::message::OutboxMessage;
use crate::processor::config::ProcessorConfig;
use crate::processor::dispatcher::{DeliveryOutcome, Dispatcher};
use crate::store::ClaimStore;

/// What one cycle did, as reported by
/// [`Processor::run_cycle`](crate::Processor::run_cycle).
///
/// `claimed` equals `delivered + retried + quarantined` when the cycle
/// completes; an aborted cycle reports nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Messages claimed at the start of the cycle.
    pub claimed: usize,
    /// Messages delivered and marked processed.
    pub delivered: usize,
    /// Messages that failed but stay eligible for another attempt.
    pub retried: usize,
    /// Messages parked for operator review, either by a permanent failure
    /// or by this failure exhausting the retry budget.
    pub quarantined: usize,
}

enum Applied {
    Delivered,
    Retried,
    Quarantined,
}

impl CycleStats {
    fn record(&mut self, applied: Applied) {
        match applied {
            Applied::Delivered => self.delivered += 1,
            Applied::Retried => self.retried += 1,
            Applied::Quarantined => self.quarantined += 1,
        }
    }
}

/// The polling loop: claim a batch, deliver each message, record outcomes.
pub(crate) struct PollWorker<S> {
    store: S,
    dispatcher: Dispatcher,
    config: ProcessorConfig,
    instance_id: String,
}

impl<S: ClaimStore> PollWorker<S> {
    pub(crate) fn new(
        store: S,
        dispatcher: Dispatcher,
        config: ProcessorConfig,
        instance_id: String,
    ) -> Self {
        Self {
            store,
            dispatcher,
            config,
            instance_id,
        }
    }

    pub(crate) fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub(crate) fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Poll until `shutdown` flips to `true`.
    ///
    /// A cycle in progress when the tick fires again is not stacked: skipped
    /// ticks collapse into the next one. Cycle errors are logged and the
    /// loop continues.
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut poll_interval = tokio::time::interval(self.config.poll_interval);
        poll_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = poll_interval.tick() => {
                    match self.run_cycle().await {
                        Ok(stats) if stats.claimed > 0 => {
                            debug!(
                                claimed = stats.claimed,
                                delivered = stats.delivered,
                                retried = stats.retried,
                                quarantined = stats.quarantined,
                                "outbox cycle complete"
                            );
                        }
                        Ok(_) => {}
                        Err(error) => {
                            error!(error = %error, "outbox cycle aborted");
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(instance_id = %self.instance_id, "outbox poll worker stopping");
                        break;
                    }
                }
            }
        }
    }

    /// One claim-deliver-record pass.
    ///
    /// A storage error ends the cycle early with no further deliveries;
    /// anything already claimed stays leased and becomes claimable again
    /// once the lease expires.
    pub(crate) async fn run_cycle(&self) -> crate::Result<CycleStats> {
        let messages = self
            .store
            .claim_batch(
                &self.instance_id,
                self.config.claim_lease,
                self.config.max_retry_attempts,
                self.config.batch_size,
            )
            .await?;

        let mut stats = CycleStats {
            claimed: messages.len(),
            ..Default::default()
        };
        if messages.is_empty() {
            return Ok(stats);
        }
        debug!(claimed = messages.len(), "claimed outbox batch");

        if self.config.dispatch_concurrency <= 1 {
            for message in &messages {
                let applied = deliver_and_apply(
                    &self.store,
                    &self.dispatcher,
                    self.config.max_retry_attempts,
                    message,
                )
                .await?;
                stats.record(applied);
            }
            return Ok(stats);
        }

        // Deliver a window concurrently, then drain it completely before
        // starting the next, so a storage error never cancels a delivery
        // that is already running.
        for window in messages.chunks(self.config.dispatch_concurrency) {
            let mut deliveries = JoinSet::new();
            for message in window {
                let store = self.store.clone();
                let dispatcher = self.dispatcher.clone();
                let max_retry_attempts = self.config.max_retry_attempts;
                let message = message.clone();
                deliveries.spawn(async move {
                    deliver_and_apply(&store, &dispatcher, max_retry_attempts, &message).await
                });
            }

            let mut first_error = None;
            while let Some(joined) = deliveries.join_next().await {
                match joined {
                    Ok(Ok(applied)) => stats.record(applied),
                    Ok(Err(error)) => {
                        if first_error.is_none() {
                            first_error = Some(error);
                        }
                    }
                    Err(join_error) => {
                        error!(error = %join_error, "outbox delivery task panicked");
                    }
                }
            }
            if let Some(error) = first_error {
                return Err(error);
            }
        }

        Ok(stats)
    }
}

/// Deliver one message and write its outcome back to the store.
async fn deliver_and_apply<S: ClaimStore>(
    store: &S,
    dispatcher: &Dispatcher,
    max_retry_attempts: u32,
    message: &OutboxMessage,
) -> crate::Result<Applied> {
    match dispatcher.deliver(message).await {
        DeliveryOutcome::Delivered => {
            store.mark_processed(message.id).await?;
            debug!(
                id = %message.id,
                event_type = %message.event_type,
                "outbox message delivered"
            );
            Ok(Applied::Delivered)
        }
        DeliveryOutcome::TransientFailure(reason) => {
            store.record_failure(message.id, &reason).await?;
            let attempts = message.retry_count + 1;
            if attempts >= max_retry_attempts {
                warn!(
                    id = %message.id,
                    event_type = %message.event_type,
                    attempts,
                    reason = %reason,
                    "retry budget exhausted, message parked for operator review"
                );
                Ok(Applied::Quarantined)
            } else {
                debug!(
                    id = %message.id,
                    event_type = %message.event_type,
                    attempts,
                    reason = %reason,
                    "delivery failed, will retry next cycle"
                );
                Ok(Applied::Retried)
            }
        }
        DeliveryOutcome::PermanentFailure(reason) => {
            store.quarantine(message.id, &reason, max_retry_attempts).await?;
            warn!(
                id = %message.id,
                event_type = %message.event_type,
                reason = %reason,
                "message cannot be delivered, parked for operator review"
            );
            Ok(Applied::Quarantined)
        }
    }
}
