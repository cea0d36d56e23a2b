//! Task and callback ports.
//!
//! A [`Task`] is one logical operation (typically "post this request, with
//! retries"). Whoever runs it reports the terminal outcome to a [`Listener`]
//! exactly once: either `on_complete` or `on_error`, never both.
//!
//! # Example
//!
//! ```no_run
//! use pinpost_core::Listener;
//! use pinpost_domain::{NetworkError, NetworkResponse};
//!
//! struct LogListener;
//!
//! impl Listener<NetworkResponse> for LogListener {
//!     fn on_complete(&self, response: NetworkResponse) {
//!         tracing::info!(status = response.status_code, "delivered");
//!     }
//!
//!     fn on_error(&self, error: NetworkError) {
//!         tracing::warn!(%error, "delivery failed");
//!     }
//! }
//! ```

use async_trait::async_trait;
use pinpost_domain::{NetworkError, Result};

/// A unit of work producing a typed result or a terminal [`NetworkError`].
#[async_trait]
pub trait Task: Send + 'static {
    type Output: Send + 'static;

    /// Run the task to completion. Retries, if any, happen inside.
    async fn run(self) -> Result<Self::Output>;
}

/// Receives the terminal outcome of a submitted task.
pub trait Listener<T>: Send + Sync {
    fn on_complete(&self, value: T);

    fn on_error(&self, error: NetworkError);
}

/// Notified when the stored attribution (source) token changes value.
pub trait AttributionListener: Send + Sync {
    fn on_attribution_changed(&self, source_token: &str);
}
