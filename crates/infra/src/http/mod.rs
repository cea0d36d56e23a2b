//! HTTP transport: single-exchange executor plus the retry wrapper.

pub mod executor;
pub mod retry;

pub use executor::RequestExecutor;
pub use retry::{execute_with_retry, retry_config, send_with_retry, NetworkRetryPolicy, PostTask};
