//! Transport configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{
    default_user_agent, DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT_MS,
    DEFAULT_INITIAL_BACKOFF_MS, DEFAULT_MAX_RETRIES, DEFAULT_READ_TIMEOUT_MS,
    DEFAULT_WORKER_COUNT,
};
use crate::errors::ConfigError;

/// Settings for the pinned HTTP transport.
///
/// Every field has a default, so a config file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Initial base URL; request paths are appended to it.
    pub base_url: String,
    pub user_agent: String,
    pub connect_timeout_ms: u64,
    /// Bound on each socket read while waiting for and receiving the response.
    pub read_timeout_ms: u64,
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub worker_count: usize,
    /// Permit `http://` base URLs. Pinning cannot apply to them, so this is
    /// for local testing only.
    pub allow_plaintext: bool,
    pub application_id: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: default_user_agent(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            worker_count: DEFAULT_WORKER_COUNT,
            allow_plaintext: false,
            application_id: None,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// Check the values a transport cannot run with.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| ConfigError::invalid("base_url", e.to_string()))?;
        match url.scheme() {
            "https" => {}
            "http" if self.allow_plaintext => {}
            other => {
                return Err(ConfigError::invalid(
                    "base_url",
                    format!("scheme '{other}' is not allowed"),
                ))
            }
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::invalid("connect_timeout_ms", "must be greater than zero"));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::invalid("read_timeout_ms", "must be greater than zero"));
        }
        if self.worker_count == 0 {
            return Err(ConfigError::invalid("worker_count", "must be greater than zero"));
        }
        if self.user_agent.trim().is_empty() {
            return Err(ConfigError::invalid("user_agent", "must not be empty"));
        }
        Ok(())
    }
}
