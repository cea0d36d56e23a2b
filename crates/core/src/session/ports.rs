//! Port interfaces for session persistence

use serde_json::Value;

/// Simple key-value persistence surface.
///
/// Values are JSON scalars. Implementations must be safe to share between
/// workers; writes are last-writer-wins.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn set(&self, key: &str, value: Value);

    /// Remove several keys as one write.
    fn remove_all(&self, keys: &[&str]);

    fn get_string(&self, key: &str) -> Option<String> {
        match self.get(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.as_bool())
    }
}

/// Persisted session state read before and updated after each request.
pub trait SessionStore: Send + Sync {
    fn session_id(&self) -> Option<String>;

    fn set_session_id(&self, session_id: &str);

    fn source_token(&self) -> Option<String>;

    fn set_source_token(&self, source_token: &str);

    fn checked_deferred_deep_link(&self) -> bool;

    fn set_checked_deferred_deep_link(&self, checked: bool);

    /// Forget session id, source token and the deferred-link flag.
    fn clear_all_data(&self);
}
