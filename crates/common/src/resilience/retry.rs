//! Bounded retry with deterministic exponential backoff.
//!
//! A logical operation is attempted once and then retried at most
//! `max_retries` more times. Between attempts the executor sleeps for the
//! delay produced by the configured [`BackoffStrategy`]. There is no jitter:
//! the schedule for attempt `n` (0-indexed) is exactly
//! `initial_delay * base^n`, capped at `max_delay`.
//!
//! The sleep is a `tokio::time::sleep`, so a retrying operation only occupies
//! the task that runs it and never blocks the runtime thread.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Largest exponent applied to the backoff base before saturating.
const MAX_BACKOFF_EXPONENT: u32 = 16;

/// Terminal failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every permitted attempt failed with a retryable error.
    #[error("all {attempts} attempts failed, last error: {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: E },

    /// The operation failed with an error the policy refused to retry.
    #[error("operation failed with non-retryable error: {source}")]
    NonRetryable { attempts: u32, source: E },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::AttemptsExhausted { attempts, .. } | Self::NonRetryable { attempts, .. } => {
                *attempts
            }
        }
    }

    /// Whether the bound was reached (as opposed to a permanent failure).
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::AttemptsExhausted { .. })
    }

    /// Borrow the last error produced by the operation.
    pub fn last_error(&self) -> &E {
        match self {
            Self::AttemptsExhausted { last_error, .. } => last_error,
            Self::NonRetryable { source, .. } => source,
        }
    }

    /// Unwrap into the last error produced by the operation.
    pub fn into_inner(self) -> E {
        match self {
            Self::AttemptsExhausted { last_error, .. } => last_error,
            Self::NonRetryable { source, .. } => source,
        }
    }
}

/// Result type for retried operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Invalid retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryConfigError {
    #[error("backoff base must be at least 1, got {0}")]
    InvalidBase(u32),

    #[error("initial delay ({initial:?}) cannot exceed max delay ({max:?})")]
    DelayOrdering { initial: Duration, max: Duration },
}

/// Outcome of a retry execution including the observed schedule.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: RetryResult<T, E>,
    /// Total attempts made, including the first one.
    pub attempts: u32,
    /// Backoff delays slept between attempts, in order.
    pub delays: Vec<Duration>,
    pub started_at: Instant,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result.
    pub fn into_result(self) -> RetryResult<T, E> {
        self.result
    }

    /// Sum of all backoff delays.
    pub fn total_delay(&self) -> Duration {
        self.delays.iter().sum()
    }

    /// Wall-clock time from the first attempt to completion.
    pub fn total_elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Decides whether a failed attempt should be retried.
pub trait RetryPolicy<E> {
    /// `attempt` is the 0-indexed attempt that just failed.
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision returned by a [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the configured backoff delay
    Retry,
    /// Retry after a caller-chosen delay
    RetryAfter(Duration),
    /// Give up and surface the error
    Stop,
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Same delay before every retry
    Fixed(Duration),
    /// `initial_delay * base^attempt`, capped at `max_delay`
    Exponential { initial_delay: Duration, base: u32, max_delay: Duration },
}

impl BackoffStrategy {
    /// Delay to sleep after the 0-indexed `attempt` failed.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial_delay, base, max_delay } => {
                let multiplier = base.saturating_pow(attempt.min(MAX_BACKOFF_EXPONENT));
                initial_delay.saturating_mul(multiplier).min(*max_delay)
            }
        }
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Retries permitted after the first attempt
    pub max_retries: u32,
    pub backoff: BackoffStrategy,
}

impl Default for RetryConfig {
    /// Four retries (five attempts) at 100ms, 200ms, 400ms and 800ms.
    fn default() -> Self {
        Self {
            max_retries: 4,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(100),
                base: 2,
                max_delay: Duration::from_secs(30),
            },
        }
    }
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// Upper bound on attempts, first one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    pub fn validate(&self) -> Result<(), RetryConfigError> {
        if let BackoffStrategy::Exponential { initial_delay, base, max_delay } = &self.backoff {
            if *base == 0 {
                return Err(RetryConfigError::InvalidBase(*base));
            }
            if initial_delay > max_delay {
                return Err(RetryConfigError::DelayOrdering {
                    initial: *initial_delay,
                    max: *max_delay,
                });
            }
        }
        Ok(())
    }
}

/// Builder for [`RetryConfig`]
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: u32,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base, max_delay };
        self
    }

    pub fn build(self) -> Result<RetryConfig, RetryConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Runs an operation under a [`RetryConfig`] and a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(operation).await.into_result()
    }

    /// Execute an operation and report the attempts and delays observed.
    #[instrument(skip_all, fields(max_retries = self.config.max_retries))]
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started_at = Instant::now();
        let mut delays = Vec::new();
        let mut attempt: u32 = 0;

        loop {
            debug!(attempt = attempt + 1, "executing operation");

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "operation succeeded after retries");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt + 1,
                        delays,
                        started_at,
                    };
                }
                Err(error) => error,
            };

            let delay = match self.policy.should_retry(&error, attempt) {
                RetryDecision::Stop => {
                    debug!(attempt = attempt + 1, %error, "error is not retryable");
                    return RetryOutcome {
                        result: Err(RetryError::NonRetryable { attempts: attempt + 1, source: error }),
                        attempts: attempt + 1,
                        delays,
                        started_at,
                    };
                }
                RetryDecision::Retry => self.config.backoff.calculate_delay(attempt),
                RetryDecision::RetryAfter(delay) => delay,
            };

            if attempt >= self.config.max_retries {
                warn!(attempts = attempt + 1, %error, "retry attempts exhausted");
                return RetryOutcome {
                    result: Err(RetryError::AttemptsExhausted {
                        attempts: attempt + 1,
                        last_error: error,
                    }),
                    attempts: attempt + 1,
                    delays,
                    started_at,
                };
            }

            warn!(attempt = attempt + 1, ?delay, %error, "operation failed, backing off");
            tokio::time::sleep(delay).await;
            delays.push(delay);
            attempt += 1;
        }
    }
}

/// Pre-defined retry policies
pub mod policies {
    use super::{RetryDecision, RetryPolicy};

    /// Retries every error
    #[derive(Debug, Clone, Copy)]
    pub struct AlwaysRetry;

    impl<E> RetryPolicy<E> for AlwaysRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    /// Never retries
    #[derive(Debug, Clone, Copy)]
    pub struct NeverRetry;

    impl<E> RetryPolicy<E> for NeverRetry {
        fn should_retry(&self, _error: &E, _attempt: u32) -> RetryDecision {
            RetryDecision::Stop
        }
    }

    /// Retries while the predicate holds
    #[derive(Debug, Clone)]
    pub struct PredicateRetry<F> {
        predicate: F,
    }

    impl<F> PredicateRetry<F> {
        pub fn new(predicate: F) -> Self {
            Self { predicate }
        }
    }

    impl<F, E> RetryPolicy<E> for PredicateRetry<F>
    where
        F: Fn(&E) -> bool,
    {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if (self.predicate)(error) {
                RetryDecision::Retry
            } else {
                RetryDecision::Stop
            }
        }
    }
}
