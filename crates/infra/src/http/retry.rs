//! Retry wiring for the request executor.
//!
//! Only errors that [`NetworkError::is_retryable`] accepts are retried:
//! transport failures and 5xx statuses. Pin validation, 4xx (429
//! included), malformed bodies and unsupported requests end the task on the
//! first attempt.

use std::sync::Arc;

use async_trait::async_trait;
use pinpost_common::{
    BackoffStrategy, RetryConfig, RetryDecision, RetryError, RetryExecutor, RetryPolicy,
};
use pinpost_core::Task;
use pinpost_domain::{ApiRequest, NetworkError, NetworkResponse, Result, TransportConfig};
use tracing::{debug, warn};

use super::executor::RequestExecutor;

/// Upper bound on a single backoff delay.
const MAX_BACKOFF: std::time::Duration = std::time::Duration::from_secs(30);

/// Retries exactly the errors classified as transient.
#[derive(Debug, Clone, Copy, Default)]
pub struct NetworkRetryPolicy;

impl RetryPolicy<NetworkError> for NetworkRetryPolicy {
    fn should_retry(&self, error: &NetworkError, _attempt: u32) -> RetryDecision {
        if error.is_retryable() {
            RetryDecision::Retry
        } else {
            RetryDecision::Stop
        }
    }
}

/// Exponential backoff (base 2) from the transport settings.
pub fn retry_config(config: &TransportConfig) -> RetryConfig {
    RetryConfig {
        max_retries: config.max_retries,
        backoff: BackoffStrategy::Exponential {
            initial_delay: config.initial_backoff(),
            base: 2,
            max_delay: MAX_BACKOFF.max(config.initial_backoff()),
        },
    }
}

/// Run `request` until it succeeds, fails permanently or exhausts `retry`.
///
/// The error tells exhaustion (`AttemptsExhausted`) apart from a permanent
/// failure (`NonRetryable`) and carries the attempt count.
pub async fn send_with_retry(
    executor: &RequestExecutor,
    retry: &RetryExecutor<NetworkRetryPolicy>,
    request: &ApiRequest,
) -> std::result::Result<NetworkResponse, RetryError<NetworkError>> {
    let outcome = retry.execute_with_outcome(|| executor.execute(request)).await;
    let attempts = outcome.attempts;
    let total_delay = outcome.total_delay();

    match outcome.into_result() {
        Ok(response) => {
            debug!(path = request.path(), attempts, ?total_delay, "request delivered");
            Ok(response)
        }
        Err(error) => {
            warn!(
                path = request.path(),
                attempts,
                exhausted = error.is_exhausted(),
                error = %error.last_error(),
                "request failed"
            );
            Err(error)
        }
    }
}

/// [`send_with_retry`] reduced to the last error observed.
pub async fn execute_with_retry(
    executor: &RequestExecutor,
    retry: &RetryExecutor<NetworkRetryPolicy>,
    request: &ApiRequest,
) -> Result<NetworkResponse> {
    send_with_retry(executor, retry, request).await.map_err(RetryError::into_inner)
}

/// Posts one request with retries. The unit of work the task queue runs.
#[derive(Debug, Clone)]
pub struct PostTask {
    executor: Arc<RequestExecutor>,
    retry: Arc<RetryExecutor<NetworkRetryPolicy>>,
    request: ApiRequest,
}

impl PostTask {
    pub fn new(
        executor: Arc<RequestExecutor>,
        retry: Arc<RetryExecutor<NetworkRetryPolicy>>,
        request: ApiRequest,
    ) -> Self {
        Self { executor, retry, request }
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }
}

#[async_trait]
impl Task for PostTask {
    type Output = NetworkResponse;

    async fn run(self) -> Result<NetworkResponse> {
        execute_with_retry(&self.executor, &self.retry, &self.request).await
    }
}
