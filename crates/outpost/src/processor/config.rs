use std::time::Duration;

use thiserror::Error;

/// Tuning knobs for the [`Processor`](crate::Processor).
///
/// The defaults suit a background relay that tolerates up to ten seconds of
/// delivery latency. Validation happens once, in
/// [`ProcessorBuilder::build`](crate::ProcessorBuilder::build); a processor
/// never starts with a zero interval, batch size, or retry ceiling.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Time between polling cycles. Default: 10 seconds.
    pub poll_interval: Duration,
    /// Maximum messages claimed per cycle. Default: 50.
    pub batch_size: u32,
    /// Failed attempts after which a message is parked for operator review.
    /// Default: 3.
    pub max_retry_attempts: u32,
    /// How long a claim stays exclusive if the processor dies before
    /// recording an outcome. Must comfortably exceed the slowest delivery.
    /// Default: 5 minutes.
    pub claim_lease: Duration,
    /// Messages delivered concurrently within one cycle. The default of 1
    /// delivers strictly in creation order; higher values trade ordering
    /// across the window for throughput.
    pub dispatch_concurrency: usize,
    /// How long [`Processor::run`](crate::Processor::run) waits for the
    /// in-flight cycle after shutdown is signalled. Default: 30 seconds.
    pub shutdown_timeout: Duration,
    /// Claimant name recorded on leases. Defaults to a generated
    /// `outbox-{uuid}` so two instances never share a name.
    pub instance_id: Option<String>,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            batch_size: 50,
            max_retry_attempts: 3,
            claim_lease: Duration::from_secs(300),
            dispatch_concurrency: 1,
            shutdown_timeout: Duration::from_secs(30),
            instance_id: None,
        }
    }
}

impl ProcessorConfig {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.max_retry_attempts == 0 {
            return Err(ConfigError::ZeroMaxRetryAttempts);
        }
        if self.claim_lease.is_zero() {
            return Err(ConfigError::ZeroClaimLease);
        }
        if self.dispatch_concurrency == 0 {
            return Err(ConfigError::ZeroDispatchConcurrency);
        }
        Ok(())
    }
}

/// A [`ProcessorConfig`] value that would leave the processor unable to make
/// progress.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("`poll_interval` must be greater than zero")]
    ZeroPollInterval,
    #[error("`batch_size` must be greater than zero")]
    ZeroBatchSize,
    #[error("`max_retry_attempts` must be greater than zero")]
    ZeroMaxRetryAttempts,
    #[error("`claim_lease` must be greater than zero")]
    ZeroClaimLease,
    #[error("`dispatch_concurrency` must be greater than zero")]
    ZeroDispatchConcurrency,
}
