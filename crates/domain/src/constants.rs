//! Wire and persistence constants
//!
//! Centralized location for the header values, envelope keys and storage keys
//! that both sides of the transport agree on.

// Transport defaults
pub const DEFAULT_BASE_URL: &str = "https://api.usebutton.com";
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_MAX_RETRIES: u32 = 4;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 100;
pub const DEFAULT_WORKER_COUNT: usize = 1;

// Headers
pub const CONTENT_TYPE_JSON: &str = "application/json";

// Request body keys merged by the executor
pub const KEY_APPLICATION_ID: &str = "application_id";
pub const KEY_SESSION_ID: &str = "session_id";
pub const KEY_SOURCE_TOKEN: &str = "source_token";

// Response envelope
pub const KEY_META: &str = "meta";

// Persisted session state, namespaced under a fixed prefix
pub const STORAGE_PREFIX: &str = "pinpost_";
pub const STORAGE_SESSION_ID: &str = "pinpost_session_id";
pub const STORAGE_SOURCE_TOKEN: &str = "pinpost_source_token";
pub const STORAGE_CHECKED_DEFERRED_DEEP_LINK: &str = "pinpost_checked_deferred_deep_link";

/// Accepted application id format.
pub const APPLICATION_ID_PATTERN: &str = "^app-[0-9a-zA-Z]+$";

/// Default `User-Agent` descriptor.
pub fn default_user_agent() -> String {
    format!("pinpost/{}", env!("CARGO_PKG_VERSION"))
}
