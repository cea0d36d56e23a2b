//! # Pinpost Infrastructure
//!
//! Adapters that give the core ports a real transport.
//!
//! This crate contains:
//! - Certificate providers, the cached trust context and the pin-enforcing
//!   rustls verifier
//! - The reqwest request executor and its retry wiring
//! - The configuration-gated task queue
//! - Configuration loading, file-backed session storage and tracing setup
//! - [`ApiClient`], which wires all of the above together
//!
//! ## Architecture
//! - Implements traits defined in `pinpost-core`
//! - Depends on `pinpost-common`, `pinpost-domain` and `pinpost-core`
//! - Contains all "impure" code (network, TLS, filesystem)

pub mod client;
pub mod config;
pub mod errors;
pub mod http;
pub mod observability;
pub mod queue;
pub mod storage;
pub mod tls;

// Re-export commonly used items
pub use client::{ApiClient, ApiClientBuilder};
pub use errors::{find_pin_failure, IntoNetworkError};
pub use http::{execute_with_retry, send_with_retry, NetworkRetryPolicy, PostTask, RequestExecutor};
pub use queue::TaskQueue;
pub use storage::{FileKeyValueStore, StorageError};
pub use tls::{
    AmazonRootsProvider, CertificateProvider, PemCertificateProvider, PinValidationFailure,
    PinValidator, TrustContext, TrustContextBuilder, TrustSecret,
};
