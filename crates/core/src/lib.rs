//! # Pinpost Core
//!
//! Ports and transport-independent rules - no I/O.
//!
//! This crate contains:
//! - Port interfaces (traits) for session persistence and task callbacks
//! - The shared application configuration cell
//! - Session continuity rules: what is merged into outgoing bodies and how
//!   response `meta` directives update stored state
//!
//! ## Architecture Principles
//! - Only depends on `pinpost-domain`
//! - No network, TLS or filesystem code
//! - All external dependencies via traits

pub mod app_config;
pub mod session;

// Infrastructure ports
pub mod task_ports;

// Re-export specific items to avoid ambiguity
pub use app_config::AppConfig;
pub use session::continuity::{apply_response_meta, merge_session_fields, MetaUpdate, SessionChange};
pub use session::key_value::{InMemoryKeyValueStore, KeyValueSessionStore};
pub use session::ports::{KeyValueStore, SessionStore};
pub use task_ports::{AttributionListener, Listener, Task};
