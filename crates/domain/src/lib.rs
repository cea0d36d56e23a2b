//! # Pinpost Domain
//!
//! Data types shared by every Pinpost crate.
//!
//! This crate contains:
//! - The request/response envelope (`ApiRequest`, `NetworkResponse`)
//! - The validated `ApplicationId`
//! - The `NetworkError` taxonomy and its retry classification
//! - Transport configuration structures and wire constants
//!
//! ## Architecture
//! - No dependencies on other Pinpost crates
//! - No I/O
//! - Pure data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::TransportConfig;
pub use errors::{ConfigError, NetworkError, Result};
pub use types::{ApiRequest, ApiRequestBuilder, ApplicationId, HttpMethod, NetworkResponse};
