//! Session store backed by any [`KeyValueStore`]

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use pinpost_domain::constants::{
    STORAGE_CHECKED_DEFERRED_DEEP_LINK, STORAGE_SESSION_ID, STORAGE_SOURCE_TOKEN,
};
use serde_json::Value;

use super::ports::{KeyValueStore, SessionStore};

/// Process-local store; contents are lost on exit.
#[derive(Debug, Default)]
pub struct InMemoryKeyValueStore {
    values: RwLock<HashMap<String, Value>>,
}

impl InMemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl KeyValueStore for InMemoryKeyValueStore {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.read().get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        self.values.write().insert(key.to_string(), value);
    }

    fn remove_all(&self, keys: &[&str]) {
        let mut values = self.values.write();
        for key in keys {
            values.remove(*key);
        }
    }
}

/// [`SessionStore`] laid out as `pinpost_`-prefixed keys in a
/// [`KeyValueStore`].
#[derive(Clone)]
pub struct KeyValueSessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl KeyValueSessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Session store over a fresh [`InMemoryKeyValueStore`].
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryKeyValueStore::new()))
    }
}

impl std::fmt::Debug for KeyValueSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueSessionStore").finish_non_exhaustive()
    }
}

impl SessionStore for KeyValueSessionStore {
    fn session_id(&self) -> Option<String> {
        self.store.get_string(STORAGE_SESSION_ID)
    }

    fn set_session_id(&self, session_id: &str) {
        self.store.set(STORAGE_SESSION_ID, Value::String(session_id.to_string()));
    }

    fn source_token(&self) -> Option<String> {
        self.store.get_string(STORAGE_SOURCE_TOKEN)
    }

    fn set_source_token(&self, source_token: &str) {
        self.store.set(STORAGE_SOURCE_TOKEN, Value::String(source_token.to_string()));
    }

    fn checked_deferred_deep_link(&self) -> bool {
        self.store.get_bool(STORAGE_CHECKED_DEFERRED_DEEP_LINK).unwrap_or(false)
    }

    fn set_checked_deferred_deep_link(&self, checked: bool) {
        self.store.set(STORAGE_CHECKED_DEFERRED_DEEP_LINK, Value::Bool(checked));
    }

    fn clear_all_data(&self) {
        self.store.remove_all(&[
            STORAGE_SESSION_ID,
            STORAGE_SOURCE_TOKEN,
            STORAGE_CHECKED_DEFERRED_DEEP_LINK,
        ]);
    }
}
