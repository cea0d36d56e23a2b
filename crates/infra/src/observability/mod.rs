//! Tracing subscriber setup
//!
//! The library only emits `tracing` events; installing a subscriber is the
//! host application's call. These helpers cover the two common shapes:
//! human-readable output for development and JSON lines for log shipping.
//!
//! The filter comes from `PINPOST_LOG` (standard `EnvFilter` directives) and
//! falls back to the supplied default. Request bodies are only emitted at
//! `debug`, so keep `pinpost_infra=info` or higher in production.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Environment variable holding the filter directives.
pub const LOG_ENV_VAR: &str = "PINPOST_LOG";

fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install a compact fmt subscriber.
///
/// Returns `false` if a global subscriber was already set, in which case
/// nothing changes.
pub fn init_tracing(default_filter: &str) -> bool {
    Registry::default()
        .with(env_filter(default_filter))
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok()
}

/// Install a JSON-lines subscriber. Same contract as [`init_tracing`].
pub fn init_json_tracing(default_filter: &str) -> bool {
    Registry::default()
        .with(env_filter(default_filter))
        .with(fmt::layer().json().with_target(true).with_current_span(true))
        .try_init()
        .is_ok()
}
