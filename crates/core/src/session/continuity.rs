//! Session continuity rules.
//!
//! Outgoing bodies gain `application_id`, `session_id` and `source_token`
//! unless the caller already set them. Incoming `meta` objects may refresh
//! the session id, clear all session data (`session_id: null` or `""`) or
//! refresh the source token. A missing key never clears anything.

use pinpost_domain::constants::{KEY_APPLICATION_ID, KEY_SESSION_ID, KEY_SOURCE_TOKEN};
use pinpost_domain::types::JsonObject;
use pinpost_domain::ApplicationId;
use serde_json::Value;
use tracing::{debug, warn};

use super::ports::SessionStore;

/// What a response did to the stored session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionChange {
    /// No `session_id` directive (or an unusable one).
    #[default]
    Unchanged,
    Refreshed,
    /// The server invalidated the session; all session data was cleared.
    Cleared,
}

/// Effect of one response `meta` object on the session store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetaUpdate {
    pub session: SessionChange,
    pub source_token_updated: bool,
}

/// Copy `body` and add the continuity fields it does not already carry.
///
/// Absent values are sent as JSON `null` so the server always sees the keys.
pub fn merge_session_fields(
    body: &JsonObject,
    application_id: Option<&ApplicationId>,
    session: &dyn SessionStore,
) -> JsonObject {
    let mut merged = body.clone();

    if !merged.contains_key(KEY_APPLICATION_ID) {
        merged.insert(
            KEY_APPLICATION_ID.to_string(),
            application_id.map_or(Value::Null, |id| Value::String(id.to_string())),
        );
    }
    if !merged.contains_key(KEY_SESSION_ID) {
        merged.insert(KEY_SESSION_ID.to_string(), optional_string(session.session_id()));
    }
    if !merged.contains_key(KEY_SOURCE_TOKEN) {
        merged.insert(KEY_SOURCE_TOKEN.to_string(), optional_string(session.source_token()));
    }

    merged
}

/// Apply the directives of a response `meta` object to `session`.
pub fn apply_response_meta(meta: Option<&JsonObject>, session: &dyn SessionStore) -> MetaUpdate {
    let Some(meta) = meta else {
        return MetaUpdate::default();
    };

    let session_change = match meta.get(KEY_SESSION_ID) {
        None => SessionChange::Unchanged,
        Some(Value::String(id)) if !id.is_empty() => {
            session.set_session_id(id);
            SessionChange::Refreshed
        }
        Some(Value::Null) | Some(Value::String(_)) => {
            debug!("server invalidated session, clearing session data");
            session.clear_all_data();
            SessionChange::Cleared
        }
        Some(other) => {
            warn!(kind = json_kind(other), "ignoring non-string session_id in response meta");
            SessionChange::Unchanged
        }
    };

    let source_token_updated = match meta.get(KEY_SOURCE_TOKEN) {
        Some(Value::String(token)) if !token.is_empty() => {
            session.set_source_token(token);
            true
        }
        _ => false,
    };

    MetaUpdate { session: session_change, source_token_updated }
}

fn optional_string(value: Option<String>) -> Value {
    value.map_or(Value::Null, Value::String)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
