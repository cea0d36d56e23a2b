//! Resilience patterns for transient-failure handling.
//!
//! Only bounded retry lives here. The executor is generic over the error type
//! and delegates the "is this worth another attempt" question to a
//! [`RetryPolicy`], so the transport crate can plug its own error taxonomy in
//! without this crate knowing anything about HTTP.

pub mod retry;

pub use retry::{
    policies, BackoffStrategy, RetryConfig, RetryConfigBuilder, RetryConfigError, RetryDecision,
    RetryError, RetryExecutor, RetryOutcome, RetryPolicy, RetryResult,
};
