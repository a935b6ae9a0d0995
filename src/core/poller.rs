//! Polling loop for operations that are accepted immediately and resolved later
//!
//! Remote checks, recordset downloads and readiness checks all answer with a
//! "not ready yet, retry after N seconds" signal until the result exists. The
//! [`Poller`] drives any such operation to a terminal [`PollOutcome`].
//!
//! Cancellation: dropping the future returned by [`Poller::run`] (for example
//! through `tokio::time::timeout`) stops the loop; no further attempts are made.

use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::error::{CheckError, ServiceError, Stage};
use crate::metrics::Metrics;
use crate::models::PoolKind;

/// State reported by one poll of a long-running operation
#[derive(Debug, Clone, PartialEq)]
pub enum PollState<T> {
    Pending { retry_after: Option<Duration> },
    Complete(T),
    Failed(String),
}

/// Payload of a completed operation.
///
/// A payload may describe an operation that resolved to an error; such
/// payloads are reported as failures rather than completions.
pub trait OperationPayload {
    fn failure(&self) -> Option<String> {
        None
    }
}

/// Terminal result of a polling loop
#[derive(Debug)]
pub enum PollOutcome<T> {
    Complete(T),
    /// The operation itself resolved to a failure
    Failed(String),
    /// Definitive collaborator error, or transient errors that outlived their retries
    Error(ServiceError),
    /// Still pending when the attempt or time budget ran out
    BudgetExceeded { attempts: u32 },
}

impl<T> PollOutcome<T> {
    pub fn is_complete(&self) -> bool {
        matches!(self, PollOutcome::Complete(_))
    }

    pub fn into_result(self) -> Result<T, PollError> {
        match self {
            PollOutcome::Complete(value) => Ok(value),
            PollOutcome::Failed(reason) => Err(PollError::Failed(reason)),
            PollOutcome::Error(err) => Err(PollError::Service(err)),
            PollOutcome::BudgetExceeded { attempts } => Err(PollError::BudgetExceeded { attempts }),
        }
    }
}

/// Non-successful polling outcome
#[derive(Debug, Error)]
pub enum PollError {
    #[error("operation failed: {0}")]
    Failed(String),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("operation still pending after {attempts} attempts")]
    BudgetExceeded { attempts: u32 },
}

impl PollError {
    /// Attach the pool and stage of the check that was polling
    pub fn in_check(self, pool_kind: PoolKind, stage: Stage) -> CheckError {
        match self {
            PollError::Failed(detail) => CheckError::Rejected {
                pool_kind,
                stage,
                detail,
            },
            PollError::Service(source) => CheckError::Service {
                pool_kind,
                stage,
                source,
            },
            PollError::BudgetExceeded { attempts } => CheckError::BudgetExceeded {
                pool_kind,
                stage,
                attempts,
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub max_attempts: u32,
    /// Delay used when the operation gives no retry hint
    pub default_delay: Duration,
    pub max_elapsed: Option<Duration>,
    /// Retries of a single poll after a transient transport error
    pub transport_retries: usize,
    pub transport_backoff: Duration,
    pub backoff_factor: f32,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            default_delay: Duration::from_secs(1),
            max_elapsed: None,
            transport_retries: 5,
            transport_backoff: Duration::from_secs(2),
            backoff_factor: 1.5,
        }
    }
}

#[derive(Clone)]
pub struct Poller {
    config: PollerConfig,
    metrics: Option<Arc<Metrics>>,
}

impl Poller {
    pub fn new(config: PollerConfig) -> Self {
        Self {
            config,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    fn transport_backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.config.transport_backoff)
            .with_factor(self.config.backoff_factor)
            .with_max_times(self.config.transport_retries)
    }

    /// Poll `poll` until it completes, fails, or the budget is spent
    pub async fn run<T, F, Fut>(&self, operation: &str, mut poll: F) -> PollOutcome<T>
    where
        T: OperationPayload,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<PollState<T>, ServiceError>>,
    {
        let started = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            if let Some(metrics) = &self.metrics {
                metrics.poll_attempts_total.inc();
            }

            let state = (|| poll())
                .retry(self.transport_backoff())
                .sleep(sleep)
                .when(ServiceError::is_transient)
                .notify(|err: &ServiceError, delay: Duration| {
                    warn!(
                        operation = %operation,
                        attempt = attempt,
                        error = %err,
                        delay_ms = delay.as_millis() as u64,
                        "Poller: transient error polling {}, retrying in {:?}",
                        operation,
                        delay
                    );
                })
                .await;

            match state {
                Err(err) => {
                    warn!(operation = %operation, attempt = attempt, error = %err, "Poller: {} failed", operation);
                    return PollOutcome::Error(err);
                }
                Ok(PollState::Failed(reason)) => {
                    debug!(operation = %operation, attempt = attempt, reason = %reason, "Poller: {} rejected", operation);
                    return PollOutcome::Failed(reason);
                }
                Ok(PollState::Complete(payload)) => {
                    if let Some(reason) = payload.failure() {
                        debug!(operation = %operation, reason = %reason, "Poller: {} completed with an error payload", operation);
                        return PollOutcome::Failed(reason);
                    }
                    debug!(operation = %operation, attempts = attempt, "Poller: {} complete", operation);
                    return PollOutcome::Complete(payload);
                }
                Ok(PollState::Pending { retry_after }) => {
                    if attempt == max_attempts {
                        break;
                    }
                    let delay = retry_after.unwrap_or(self.config.default_delay);
                    if let Some(limit) = self.config.max_elapsed {
                        if started.elapsed() + delay > limit {
                            warn!(operation = %operation, attempts = attempt, "Poller: {} exceeded its time budget", operation);
                            return PollOutcome::BudgetExceeded { attempts: attempt };
                        }
                    }
                    debug!(
                        operation = %operation,
                        attempt = attempt,
                        retry_after_ms = delay.as_millis() as u64,
                        "Poller: {} pending, sleeping {:?}",
                        operation,
                        delay
                    );
                    sleep(delay).await;
                }
            }
        }

        warn!(operation = %operation, attempts = max_attempts, "Poller: {} still pending after {} attempts", operation, max_attempts);
        PollOutcome::BudgetExceeded {
            attempts: max_attempts,
        }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(PollerConfig::default())
    }
}
