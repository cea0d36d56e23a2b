//! Parsed response envelope

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::JsonObject;
use crate::constants::KEY_META;

/// A successful (status < 400) response with its parsed JSON object body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkResponse {
    pub status_code: u16,
    pub body: JsonObject,
}

impl NetworkResponse {
    pub fn new(status_code: u16, body: JsonObject) -> Self {
        Self { status_code, body }
    }

    /// The top-level `meta` object, when the server sent one.
    pub fn meta(&self) -> Option<&JsonObject> {
        self.body.get(KEY_META).and_then(Value::as_object)
    }

    pub fn into_body(self) -> JsonObject {
        self.body
    }
}
