//! Domain types and models
//!
//! The request/response envelope carried by the transport and the validated
//! application identifier that gates it.

pub mod application_id;
pub mod request;
pub mod response;

pub use application_id::ApplicationId;
pub use request::{ApiRequest, ApiRequestBuilder, HttpMethod};
pub use response::NetworkResponse;

/// JSON object used for request and response bodies.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;
