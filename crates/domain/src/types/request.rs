//! Outgoing request envelope

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::JsonObject;
use crate::impl_wire_name_conversions;

/// HTTP method of an [`ApiRequest`]. Only `POST` is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Post,
}

impl_wire_name_conversions!(HttpMethod {
    Post => "POST",
});

/// A structured API call: a path relative to the base URL, extra headers and
/// a JSON object body.
///
/// Immutable once built; the executor works on a copy of the body when it
/// merges session fields in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiRequest {
    method: HttpMethod,
    path: String,
    headers: HashMap<String, String>,
    body: JsonObject,
}

impl ApiRequest {
    /// Start building a `POST` to `path`.
    pub fn post(path: impl Into<String>) -> ApiRequestBuilder {
        ApiRequestBuilder::new(HttpMethod::Post, path)
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    pub fn body(&self) -> &JsonObject {
        &self.body
    }
}

/// Builder for [`ApiRequest`]
#[derive(Debug, Clone)]
pub struct ApiRequestBuilder {
    method: HttpMethod,
    path: String,
    headers: HashMap<String, String>,
    body: JsonObject,
}

impl ApiRequestBuilder {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), headers: HashMap::new(), body: JsonObject::new() }
    }

    /// Add a header; a later call with the same name replaces the value.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Replace the whole body.
    pub fn body(mut self, body: JsonObject) -> Self {
        self.body = body;
        self
    }

    /// Set a single top-level body field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> ApiRequest {
        ApiRequest { method: self.method, path: self.path, headers: self.headers, body: self.body }
    }
}
